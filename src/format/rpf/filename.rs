//! RPF frame file names.
//!
//! A frame file is named `FFFFFVVP.DDZ`:
//!
//! ```text
//! FFFFF  frame number, 5 base-34 digits
//! VV     version, 2 base-34 digits
//! P      producer code
//! DD     data series code (map scale or image resolution)
//! Z      ARC zone
//! ```
//!
//! The base-34 alphabet is `0-9a-z` without `i` and `o`.

use std::fmt;

const BASE34_ALPHABET: &[u8] = b"0123456789abcdefghjklmnpqrstuvwxyz";

/// Value of one base-34 digit.
pub fn base34_digit(c: char) -> Option<u32> {
    let c = c.to_ascii_lowercase();
    BASE34_ALPHABET
        .iter()
        .position(|&d| d as char == c)
        .map(|p| p as u32)
}

/// Value of a base-34 number.
pub fn base34_value(digits: &str) -> Option<u32> {
    digits
        .chars()
        .try_fold(0u32, |acc, c| Some(acc.checked_mul(34)? + base34_digit(c)?))
}

/// What a data series measures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesKind {
    /// Scanned charts (CADRG) at a 1:scale map scale
    Chart { scale: f64 },
    /// Controlled imagery (CIB) at a ground resolution in metres
    Imagery { resolution_m: f64 },
}

/// A known data series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataSeries {
    pub code: &'static str,
    pub kind: SeriesKind,
}

const DATA_SERIES: &[DataSeries] = &[
    DataSeries { code: "gn", kind: SeriesKind::Chart { scale: 5_000_000.0 } },
    DataSeries { code: "jn", kind: SeriesKind::Chart { scale: 2_000_000.0 } },
    DataSeries { code: "on", kind: SeriesKind::Chart { scale: 1_000_000.0 } },
    DataSeries { code: "tp", kind: SeriesKind::Chart { scale: 500_000.0 } },
    DataSeries { code: "lf", kind: SeriesKind::Chart { scale: 500_000.0 } },
    DataSeries { code: "jg", kind: SeriesKind::Chart { scale: 250_000.0 } },
    DataSeries { code: "ja", kind: SeriesKind::Chart { scale: 250_000.0 } },
    DataSeries { code: "jr", kind: SeriesKind::Chart { scale: 250_000.0 } },
    DataSeries { code: "tf", kind: SeriesKind::Chart { scale: 250_000.0 } },
    DataSeries { code: "tl", kind: SeriesKind::Chart { scale: 50_000.0 } },
    DataSeries { code: "i1", kind: SeriesKind::Imagery { resolution_m: 10.0 } },
    DataSeries { code: "i2", kind: SeriesKind::Imagery { resolution_m: 5.0 } },
    DataSeries { code: "i3", kind: SeriesKind::Imagery { resolution_m: 2.0 } },
    DataSeries { code: "i4", kind: SeriesKind::Imagery { resolution_m: 1.0 } },
    DataSeries { code: "i5", kind: SeriesKind::Imagery { resolution_m: 0.5 } },
];

/// Equatorial circumference in metres.
const EARTH_CIRCUMFERENCE_M: f64 = 40_075_016.686;

/// Pixels around the equator at 1:1,000,000.
const PIXELS_AROUND_EQUATOR: f64 = 369_664.0;

impl DataSeries {
    pub fn from_code(code: &str) -> Option<DataSeries> {
        let code = code.to_ascii_lowercase();
        DATA_SERIES.iter().find(|s| s.code == code).copied()
    }

    /// Map scale denominator; imagery gets the scale of equal pixel size.
    pub fn scale(&self) -> f64 {
        match self.kind {
            SeriesKind::Chart { scale } => scale,
            SeriesKind::Imagery { resolution_m } => {
                resolution_m * 1_000_000.0 / (EARTH_CIRCUMFERENCE_M / PIXELS_AROUND_EQUATOR)
            }
        }
    }
}

/// A parsed `FFFFFVVP.DDZ` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpfFilename {
    pub frame_number: u32,
    pub version: u32,
    pub producer: char,
    /// Two-character data series code, lowercase
    pub data_series: String,
    /// Zone character, lowercase
    pub zone: char,
}

impl RpfFilename {
    /// Parse a file name (without directories).
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        let chars: Vec<char> = name.chars().collect();
        if chars.len() != 12 || chars[8] != '.' {
            return None;
        }
        let frame: String = chars[0..5].iter().collect();
        let version: String = chars[5..7].iter().collect();
        Some(Self {
            frame_number: base34_value(&frame)?,
            version: base34_value(&version)?,
            producer: chars[7],
            data_series: chars[9..11].iter().collect(),
            zone: chars[11],
        })
    }

    pub fn series(&self) -> Option<DataSeries> {
        DataSeries::from_code(&self.data_series)
    }
}

impl fmt::Display for RpfFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} v{} {}.{}{}",
            self.frame_number, self.version, self.producer, self.data_series, self.zone
        )
    }
}

/// Encode a number as `width` base-34 digits.
pub fn base34_encode(mut value: u32, width: usize) -> String {
    let mut digits = vec![b'0'; width];
    for slot in digits.iter_mut().rev() {
        *slot = BASE34_ALPHABET[(value % 34) as usize];
        value /= 34;
    }
    String::from_utf8_lossy(&digits).into_owned()
}
