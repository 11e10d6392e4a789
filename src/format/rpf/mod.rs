//! Raster Product Format (CADRG / CIB) frame files.
//!
//! Frames are located from their file names alone (zone, data series and
//! frame number) and decoded from their vector-quantized spatial data.

mod filename;
mod frame;
mod polar;
mod zones;

pub use filename::{base34_digit, base34_encode, base34_value, DataSeries, RpfFilename, SeriesKind};
pub use frame::{decode_frame, read_coverage, unpack_codes, RpfFrame};
pub use frame::{
    CODES_PER_SUBFRAME_SIDE, HEADER_SIZE, KERNEL, LOOKUP_RECORDS, NOT_PRESENT,
    SECTION_COLORMAP, SECTION_COLOR_GRAY, SECTION_COMPRESSION, SECTION_COVERAGE,
    SECTION_IMAGE_DESCRIPTION, SECTION_LOOKUP_TABLES, SECTION_MASK, SECTION_SPATIAL_DATA,
    SUBFRAMES_PER_SIDE, SUBFRAME_BYTES, SUBFRAME_PIXELS,
};
pub use polar::PolarFrame;
pub use zones::{
    banded_frame, ew_pixels, frame_geometry, ns_pixels, sector_from_filename, FrameGeometry,
    Hemisphere, Zone, FRAME_PIXELS,
};
