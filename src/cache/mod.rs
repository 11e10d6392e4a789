//! Caching of decoded rasters.

mod raster_cache;

pub use raster_cache::{
    CacheLookup, RasterCache, RasterSet, RemovalCause, RemovalListener,
    DEFAULT_RASTER_CACHE_CAPACITY,
};
