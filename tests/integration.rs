//! Integration tests for raster-tiler.
//!
//! These tests verify end-to-end functionality including:
//! - TIFF and RPF decoding of fixtures written by the crate's encoders
//! - Reader selection and geo-referencing from file names, world files and sidecars
//! - Shared loads and eviction in the raster cache
//! - Tile production, rollback and progress reporting

mod integration {
    pub mod test_utils;

    pub mod cache_tests;
    pub mod format_tests;
    pub mod producer_tests;
    pub mod reader_tests;
}
