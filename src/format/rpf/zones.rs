//! ARC zone system frame geometry.
//!
//! The globe is divided into latitude bands ("zones") per hemisphere. Within
//! a non-polar zone frames are 1536x1536 pixels laid out in rows counted north
//! from the zone's southern boundary and columns counted east from -180.
//! Pixel counts around a parallel depend on the zone and the map scale:
//!
//! ```text
//! pixels = ceil(constant * 1e6 / scale / 512) * 512
//! ```
//!
//! The ninth zone of each hemisphere covers the pole and uses an
//! azimuthal-equidistant grid (see [`super::polar`]).

use crate::raster::Sector;

use super::filename::{DataSeries, RpfFilename};
use super::polar::PolarFrame;

/// Frame edge in pixels.
pub const FRAME_PIXELS: u32 = 1536;

/// North-south pixel constant, identical for every zone.
pub const NS_PIXEL_CONSTANT: f64 = 369_664.0;

/// East-west pixel constants of the non-polar zones 1 to 8.
pub const EW_PIXEL_CONSTANTS: [f64; 8] = [
    369_664.0, 302_592.0, 245_760.0, 199_168.0, 163_328.0, 137_216.0, 110_080.0, 82_432.0,
];

/// Latitude band of the non-polar zones 1 to 8, as distance from the equator.
pub const ZONE_BANDS: [(f64, f64); 8] = [
    (0.0, 32.0),
    (32.0, 48.0),
    (48.0, 56.0),
    (56.0, 64.0),
    (64.0, 68.0),
    (68.0, 72.0),
    (72.0, 76.0),
    (76.0, 80.0),
];

/// First latitude of the polar zones.
pub const POLAR_BOUNDARY: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
}

/// An ARC zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    pub hemisphere: Hemisphere,
    /// 1 to 8 for banded zones, 9 for the polar zone
    pub number: u8,
}

impl Zone {
    /// Zone from its file name character: `1`-`9` north, `a`-`h` and `j` south.
    pub fn from_code(code: char) -> Option<Zone> {
        let code = code.to_ascii_lowercase();
        let (hemisphere, number) = match code {
            '1'..='9' => (Hemisphere::North, code as u8 - b'0'),
            'a'..='h' => (Hemisphere::South, code as u8 - b'a' + 1),
            'j' => (Hemisphere::South, 9),
            _ => return None,
        };
        Some(Zone { hemisphere, number })
    }

    pub fn is_polar(&self) -> bool {
        self.number == 9
    }

    /// Southern and northern latitude of a banded zone.
    pub fn latitude_range(&self) -> (f64, f64) {
        let (near, far) = if self.is_polar() {
            (POLAR_BOUNDARY, 90.0)
        } else {
            ZONE_BANDS[self.number as usize - 1]
        };
        match self.hemisphere {
            Hemisphere::North => (near, far),
            Hemisphere::South => (-far, -near),
        }
    }
}

/// Round a pixel count up to a multiple of 512.
fn scaled_pixels(constant: f64, scale: f64) -> f64 {
    (constant * 1_000_000.0 / scale / 512.0).ceil() * 512.0
}

/// Pixels around a meridian circle at `scale`.
pub fn ns_pixels(scale: f64) -> f64 {
    scaled_pixels(NS_PIXEL_CONSTANT, scale)
}

/// Pixels around a parallel of a banded zone at `scale`.
pub fn ew_pixels(zone: &Zone, scale: f64) -> f64 {
    scaled_pixels(EW_PIXEL_CONSTANTS[zone.number as usize - 1], scale)
}

/// Where a frame lies.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameGeometry {
    /// Non-polar frame covering a lat/lon rectangle
    Rectangular(Sector),
    /// Polar frame on an azimuthal-equidistant grid
    Polar(PolarFrame),
}

impl FrameGeometry {
    /// Sector covered by the frame (the union of its parts for polar frames).
    pub fn sector(&self) -> Sector {
        match self {
            FrameGeometry::Rectangular(sector) => *sector,
            FrameGeometry::Polar(frame) => {
                Sector::union_all(frame.sectors().iter()).unwrap_or(Sector::FULL_SPHERE)
            }
        }
    }
}

/// Geometry of a banded-zone frame.
pub fn banded_frame(zone: &Zone, scale: f64, frame_number: u32) -> Option<Sector> {
    let ns = ns_pixels(scale);
    let ew = ew_pixels(zone, scale);
    let frame_h = FRAME_PIXELS as f64 * 360.0 / ns;
    let frame_w = FRAME_PIXELS as f64 * 360.0 / ew;
    let frames_per_row = (ew / FRAME_PIXELS as f64).ceil() as u32;

    let (south, north) = zone.latitude_range();
    let rows = ((north - south) / frame_h).ceil() as u32;

    let row = frame_number / frames_per_row;
    let col = frame_number % frames_per_row;
    if row >= rows {
        return None;
    }

    let min_lat = south + row as f64 * frame_h;
    let min_lon = -180.0 + col as f64 * frame_w;
    Some(Sector::new(
        min_lat,
        min_lat + frame_h,
        min_lon,
        min_lon + frame_w,
    ))
}

/// Frame geometry from a parsed file name.
///
/// `None` for unknown data series or zones and out-of-range frame numbers.
pub fn frame_geometry(name: &RpfFilename) -> Option<FrameGeometry> {
    let series = DataSeries::from_code(&name.data_series)?;
    let zone = Zone::from_code(name.zone)?;
    let scale = series.scale();
    if zone.is_polar() {
        PolarFrame::new(zone.hemisphere, ns_pixels(scale), name.frame_number)
            .map(FrameGeometry::Polar)
    } else {
        banded_frame(&zone, scale, name.frame_number).map(FrameGeometry::Rectangular)
    }
}

/// Sector of a frame file from its name alone.
pub fn sector_from_filename(file_name: &str) -> Option<Sector> {
    let name = RpfFilename::parse(file_name)?;
    frame_geometry(&name).map(|g| g.sector())
}
