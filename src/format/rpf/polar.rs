//! Polar zone frames.
//!
//! Polar frames are cut from an azimuthal-equidistant grid centred on the
//! pole, with the same pixel density along meridians as the banded zones.
//! The grid holds a square of frames wide enough to cover 10 degrees of
//! latitude on each side of the pole. In grid pixels, with `rho` the distance
//! from the pole:
//!
//! ```text
//! north: x = rho * sin(lon), y = -rho * cos(lon)
//! south: x = rho * sin(lon), y =  rho * cos(lon)
//! ```
//!
//! The antimeridian runs along `x = 0` on the `y > 0` side in the north and
//! the `y < 0` side in the south. A frame straddling it is de-projected into
//! two rasters, one per side.

use image::{Rgba, RgbaImage};

use crate::raster::Sector;

use super::zones::{Hemisphere, FRAME_PIXELS, POLAR_BOUNDARY};

/// A frame on a polar grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarFrame {
    pub hemisphere: Hemisphere,
    /// Grid pixels per degree of latitude
    pub pixels_per_degree: f64,
    pub frames_per_side: u32,
    pub row: u32,
    pub col: u32,
}

/// A pixel-space rectangle on the polar grid.
#[derive(Debug, Clone, Copy)]
struct GridRect {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl PolarFrame {
    /// Locate `frame_number` on the grid for `ns_pixels` pixels per meridian
    /// circle. `None` if the number is past the last frame.
    pub fn new(hemisphere: Hemisphere, ns_pixels: f64, frame_number: u32) -> Option<Self> {
        let pixels_per_degree = ns_pixels / 360.0;
        let radius = (90.0 - POLAR_BOUNDARY) * pixels_per_degree;
        let frames_per_side = (2.0 * radius / FRAME_PIXELS as f64).ceil() as u32;
        if frame_number >= frames_per_side * frames_per_side {
            return None;
        }
        Some(Self {
            hemisphere,
            pixels_per_degree,
            frames_per_side,
            row: frame_number / frames_per_side,
            col: frame_number % frames_per_side,
        })
    }

    fn rect(&self) -> GridRect {
        let half = self.frames_per_side as f64 * FRAME_PIXELS as f64 / 2.0;
        let x0 = -half + self.col as f64 * FRAME_PIXELS as f64;
        let y0 = -half + self.row as f64 * FRAME_PIXELS as f64;
        GridRect {
            x0,
            y0,
            x1: x0 + FRAME_PIXELS as f64,
            y1: y0 + FRAME_PIXELS as f64,
        }
    }

    /// Grid position of a geographic point.
    pub fn to_grid(&self, lat: f64, lon: f64) -> (f64, f64) {
        let rho = (90.0 - lat.abs()) * self.pixels_per_degree;
        let (sin, cos) = lon.to_radians().sin_cos();
        match self.hemisphere {
            Hemisphere::North => (rho * sin, -rho * cos),
            Hemisphere::South => (rho * sin, rho * cos),
        }
    }

    /// Geographic position of a grid point, as (lat, lon).
    pub fn to_geo(&self, x: f64, y: f64) -> (f64, f64) {
        let rho = x.hypot(y);
        let colat = rho / self.pixels_per_degree;
        match self.hemisphere {
            Hemisphere::North => (90.0 - colat, x.atan2(-y).to_degrees()),
            Hemisphere::South => (colat - 90.0, x.atan2(y).to_degrees()),
        }
    }

    fn on_dateline_side(&self, y: f64) -> bool {
        match self.hemisphere {
            Hemisphere::North => y > 0.0,
            Hemisphere::South => y < 0.0,
        }
    }

    pub fn contains_pole(&self) -> bool {
        let r = self.rect();
        r.x0 <= 0.0 && 0.0 <= r.x1 && r.y0 <= 0.0 && 0.0 <= r.y1
    }

    pub fn crosses_dateline(&self) -> bool {
        let r = self.rect();
        !self.contains_pole()
            && r.x0 < 0.0
            && r.x1 > 0.0
            && (self.on_dateline_side(r.y0) || self.on_dateline_side(r.y1))
    }

    fn latitude_range(&self, r: &GridRect) -> (f64, f64) {
        let far = [(r.x0, r.y0), (r.x0, r.y1), (r.x1, r.y0), (r.x1, r.y1)]
            .iter()
            .map(|(x, y)| x.hypot(*y))
            .fold(0.0, f64::max);
        let near = (0.0f64.clamp(r.x0, r.x1)).hypot(0.0f64.clamp(r.y0, r.y1));
        let lat_far = 90.0 - far / self.pixels_per_degree;
        let lat_near = 90.0 - near / self.pixels_per_degree;
        match self.hemisphere {
            Hemisphere::North => (lat_far, lat_near),
            Hemisphere::South => (-lat_near, -lat_far),
        }
    }

    /// Longitude range of a rectangle that does not contain the pole or
    /// straddle the antimeridian. Points on the antimeridian count as -180
    /// for western rectangles.
    fn longitude_range(&self, r: &GridRect, western: bool) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for (x, y) in [(r.x0, r.y0), (r.x0, r.y1), (r.x1, r.y0), (r.x1, r.y1)] {
            let lon = if x == 0.0 && self.on_dateline_side(y) {
                if western {
                    -180.0
                } else {
                    180.0
                }
            } else {
                self.to_geo(x, y).1
            };
            min = min.min(lon);
            max = max.max(lon);
        }
        (min, max)
    }

    fn sector_of(&self, r: &GridRect, western: bool) -> Sector {
        let (min_lat, max_lat) = self.latitude_range(r);
        let (min_lon, max_lon) = self.longitude_range(r, western);
        Sector::new(min_lat, max_lat, min_lon, max_lon)
    }

    /// Sectors of the rasters this frame de-projects into.
    pub fn sectors(&self) -> Vec<Sector> {
        let r = self.rect();
        if self.contains_pole() {
            let (min_lat, max_lat) = self.latitude_range(&r);
            return vec![Sector::new(min_lat, max_lat, -180.0, 180.0)];
        }
        if self.crosses_dateline() {
            let east = GridRect { x0: 0.0, ..r };
            let west = GridRect { x1: 0.0, ..r };
            return vec![self.sector_of(&east, false), self.sector_of(&west, true)];
        }
        vec![self.sector_of(&r, r.x1 <= 0.0)]
    }

    /// Resample the frame image into `size x size` rasters over
    /// [`sectors`](Self::sectors). Points outside the frame are transparent.
    pub fn deproject(&self, image: &RgbaImage, size: u32) -> Vec<(Sector, RgbaImage)> {
        let r = self.rect();
        let sx = image.width() as f64 / FRAME_PIXELS as f64;
        let sy = image.height() as f64 / FRAME_PIXELS as f64;

        self.sectors()
            .into_iter()
            .map(|sector| {
                let dlon = sector.lon_delta() / size as f64;
                let dlat = sector.lat_delta() / size as f64;
                let out = RgbaImage::from_fn(size, size, |i, j| {
                    let lon = sector.min_lon + (i as f64 + 0.5) * dlon;
                    let lat = sector.max_lat - (j as f64 + 0.5) * dlat;
                    let (x, y) = self.to_grid(lat, lon);
                    let px = ((x - r.x0) * sx).floor();
                    let py = ((y - r.y0) * sy).floor();
                    if px < 0.0 || py < 0.0 || px >= image.width() as f64 || py >= image.height() as f64
                    {
                        Rgba([0, 0, 0, 0])
                    } else {
                        *image.get_pixel(px as u32, py as u32)
                    }
                });
                (sector, out)
            })
            .collect()
    }
}
