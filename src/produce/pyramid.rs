//! Tile pyramid geometry.
//!
//! Tiles form a quad-tree over a grid anchored at (-90, -180). Level `L`
//! tiles are `d0 / 2^L` degrees on each axis; row `r` spans latitudes
//! `[-90 + r * dlat, -90 + (r + 1) * dlat]` and column `c` longitudes
//! `[-180 + c * dlon, -180 + (c + 1) * dlon]`.
//!
//! The level-zero delta is derived from the finest source so that the last
//! level never needs to upsample it. Pixel size here treats pixels as points,
//! `delta / (n - 1)`, which differs from the area convention used when
//! compositing.

use serde::{Deserialize, Serialize};

use crate::error::ProduceError;
use crate::raster::Sector;

use super::params::MAX_LEVEL_ZERO_DELTA;

/// Latitude and longitude extent of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileDelta {
    pub lat: f64,
    pub lon: f64,
}

/// A tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub level: u32,
    pub row: u32,
    pub col: u32,
}

/// Size and sector of one source, for pyramid sizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceExtent {
    pub sector: Sector,
    pub width: u32,
    pub height: u32,
}

impl SourceExtent {
    /// Pixel size with the point convention. A single pixel spans the delta.
    pub fn point_pixel_size(&self) -> TileDelta {
        TileDelta {
            lat: self.sector.lat_delta() / (self.height.max(2) - 1) as f64,
            lon: self.sector.lon_delta() / (self.width.max(2) - 1) as f64,
        }
    }
}

/// Levels, deltas and extent of a pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct Pyramid {
    pub extent: Sector,
    pub level_zero_delta: TileDelta,
    pub level_count: u32,
    pub tile_dimension: u32,
}

impl Pyramid {
    /// Size a pyramid for `sources`.
    ///
    /// `level_zero_override` replaces the desired level-zero delta, which
    /// otherwise is the larger extent span capped at 36 degrees.
    pub fn compute(
        sources: &[SourceExtent],
        tile_dimension: u32,
        level_zero_override: Option<f64>,
    ) -> Result<Self, ProduceError> {
        let extent = Sector::union_all(sources.iter().map(|s| &s.sector))
            .ok_or(ProduceError::NoSources)?;

        let mut smallest = TileDelta {
            lat: f64::INFINITY,
            lon: f64::INFINITY,
        };
        for source in sources {
            let size = source.point_pixel_size();
            smallest.lat = smallest.lat.min(size.lat);
            smallest.lon = smallest.lon.min(size.lon);
        }
        if !(smallest.lat > 0.0 && smallest.lon > 0.0 && smallest.lat.is_finite()) {
            return Err(ProduceError::InvalidParameter(format!(
                "sources have a zero pixel size over {}",
                extent
            )));
        }

        let span = (tile_dimension.max(2) - 1) as f64;
        let finest = TileDelta {
            lat: span * smallest.lat,
            lon: span * smallest.lon,
        };
        let desired = level_zero_override
            .unwrap_or_else(|| extent.lat_delta().max(extent.lon_delta()).min(MAX_LEVEL_ZERO_DELTA));

        let steps = |finest: f64| (desired / finest).log2().ceil().max(0.0);
        let n = steps(finest.lat).max(steps(finest.lon)) as u32;
        let scale = 2f64.powi(n as i32);

        Ok(Self {
            extent,
            level_zero_delta: TileDelta {
                lat: finest.lat * scale,
                lon: finest.lon * scale,
            },
            level_count: n + 1,
            tile_dimension,
        })
    }

    pub fn level_delta(&self, level: u32) -> TileDelta {
        let scale = 2f64.powi(level as i32);
        TileDelta {
            lat: self.level_zero_delta.lat / scale,
            lon: self.level_zero_delta.lon / scale,
        }
    }

    pub fn tile_sector(&self, key: TileKey) -> Sector {
        let d = self.level_delta(key.level);
        let min_lat = -90.0 + key.row as f64 * d.lat;
        let min_lon = -180.0 + key.col as f64 * d.lon;
        Sector::new(min_lat, min_lat + d.lat, min_lon, min_lon + d.lon)
    }

    /// Tiles of `level` whose sectors overlap `sector` with positive area.
    pub fn tiles_intersecting(&self, level: u32, sector: &Sector) -> Vec<TileKey> {
        let d = self.level_delta(level);
        let first_row = ((sector.min_lat + 90.0) / d.lat).floor().max(0.0) as u32;
        let last_row = ((sector.max_lat + 90.0) / d.lat).ceil() as i64 - 1;
        let first_col = ((sector.min_lon + 180.0) / d.lon).floor().max(0.0) as u32;
        let last_col = ((sector.max_lon + 180.0) / d.lon).ceil() as i64 - 1;

        let mut tiles = Vec::new();
        for row in first_row as i64..=last_row {
            for col in first_col as i64..=last_col {
                let key = TileKey {
                    level,
                    row: row as u32,
                    col: col as u32,
                };
                if self.tile_sector(key).intersects_interior(sector) {
                    tiles.push(key);
                }
            }
        }
        tiles
    }
}
