use std::fmt;

use serde::{Deserialize, Serialize};

/// A latitude/longitude rectangle in decimal degrees.
///
/// `min_lat <= max_lat` and `min_lon <= max_lon` always hold for sectors
/// built through [`Sector::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Sector {
    /// The whole globe.
    pub const FULL_SPHERE: Sector = Sector {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };

    /// Create a sector, ordering each pair of bounds.
    ///
    /// Because longitudes are ordered, an area crossing the antimeridian
    /// cannot be built here; describe it as two sectors, one on each side.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat: min_lat.min(max_lat),
            max_lat: min_lat.max(max_lat),
            min_lon: min_lon.min(max_lon),
            max_lon: min_lon.max(max_lon),
        }
    }

    #[inline]
    pub fn lat_delta(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    #[inline]
    pub fn lon_delta(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Whether the bounds wrap across the antimeridian (`min_lon > max_lon`).
    ///
    /// Such sectors can only come from the public fields; they are rejected
    /// when sources are validated for production.
    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon > self.max_lon
    }

    /// Whether the sector has no area.
    pub fn is_empty(&self) -> bool {
        !(self.lat_delta() > 0.0 && self.lon_delta() > 0.0)
    }

    /// Whether all bounds are finite and within geographic range.
    pub fn is_geographic(&self) -> bool {
        [self.min_lat, self.max_lat, self.min_lon, self.max_lon]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lat >= -90.0
            && self.max_lat <= 90.0
            && self.min_lon >= -180.0
            && self.max_lon <= 180.0
    }

    /// Closed intersection test: sectors sharing only an edge intersect.
    pub fn intersects(&self, other: &Sector) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
    }

    /// Intersection with positive area.
    pub fn intersects_interior(&self, other: &Sector) -> bool {
        self.min_lat < other.max_lat
            && other.min_lat < self.max_lat
            && self.min_lon < other.max_lon
            && other.min_lon < self.max_lon
    }

    /// The overlapping sector, `None` when the closed sectors are disjoint.
    pub fn intersection(&self, other: &Sector) -> Option<Sector> {
        if !self.intersects(other) {
            return None;
        }
        Some(Sector {
            min_lat: self.min_lat.max(other.min_lat),
            max_lat: self.max_lat.min(other.max_lat),
            min_lon: self.min_lon.max(other.min_lon),
            max_lon: self.max_lon.min(other.max_lon),
        })
    }

    /// Smallest sector containing both.
    pub fn union(&self, other: &Sector) -> Sector {
        Sector {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
        }
    }

    /// Union of all sectors, `None` for an empty iterator.
    pub fn union_all<'a>(sectors: impl IntoIterator<Item = &'a Sector>) -> Option<Sector> {
        sectors
            .into_iter()
            .fold(None, |acc: Option<Sector>, s| match acc {
                Some(u) => Some(u.union(s)),
                None => Some(*s),
            })
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    pub fn contains_sector(&self, other: &Sector) -> bool {
        other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
            && other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
    }

    /// Centre point as (lat, lon).
    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[lat {}..{}, lon {}..{}]",
            self.min_lat, self.max_lat, self.min_lon, self.max_lon
        )
    }
}
