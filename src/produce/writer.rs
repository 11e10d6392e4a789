//! Tile encoding and the bounded writer pool.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::ImageFormat;
use tokio::sync::{watch, OnceCell, Semaphore, SetError};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::ProduceError;
use crate::format::tiff::GeoTiffWriter;
use crate::io::ByteOrder;
use crate::raster::DataRaster;

use super::params::TileFormat;

/// Serializes finished tiles.
#[derive(Debug, Clone, Copy)]
pub struct TileEncoder {
    pub format: TileFormat,
    pub byte_order: ByteOrder,
}

impl TileEncoder {
    pub fn new(format: TileFormat, byte_order: ByteOrder) -> Self {
        Self { format, byte_order }
    }

    pub fn encode(&self, tile: &DataRaster) -> Result<Vec<u8>, String> {
        match (self.format, tile) {
            (TileFormat::Bil, DataRaster::Buffer(raster)) => {
                Ok(raster.buffer.to_bytes(self.byte_order))
            }
            (TileFormat::Png, DataRaster::Image(raster)) => {
                let mut out = Cursor::new(Vec::new());
                raster
                    .image
                    .write_to(&mut out, ImageFormat::Png)
                    .map_err(|e| e.to_string())?;
                Ok(out.into_inner())
            }
            (TileFormat::Tif, DataRaster::Image(raster)) => GeoTiffWriter::new(self.byte_order)
                .encode_rgba(&raster.image, Some(&raster.sector))
                .map_err(|e| e.to_string()),
            (TileFormat::Tif, DataRaster::Buffer(raster)) => {
                let buffer = &raster.buffer;
                let data = match buffer.data() {
                    Some(data) => data.clone(),
                    None => return Err("tile buffers are never memory-mapped".to_string()),
                };
                GeoTiffWriter::new(self.byte_order)
                    .encode(
                        buffer.width(),
                        buffer.height(),
                        buffer.bands(),
                        &data,
                        Some(&raster.sector),
                        buffer.missing_data(),
                    )
                    .map_err(|e| e.to_string())
            }
            (format, tile) => Err(format!(
                "{} tiles cannot hold {} rasters",
                format,
                tile.pixel_format().name()
            )),
        }
    }
}

/// Monotonic fraction of installed files.
pub struct Progress {
    sender: watch::Sender<f64>,
    installed: AtomicUsize,
    expected: AtomicUsize,
}

impl Progress {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0.0);
        Self {
            sender,
            installed: AtomicUsize::new(0),
            expected: AtomicUsize::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> f64 {
        *self.sender.borrow()
    }

    pub fn set_expected(&self, files: usize) {
        self.expected.store(files, Ordering::SeqCst);
    }

    pub fn installed(&self) -> usize {
        self.installed.load(Ordering::SeqCst)
    }

    /// Count one more installed file and publish the new fraction.
    pub fn record_installed(&self) {
        let installed = self.installed.fetch_add(1, Ordering::SeqCst) + 1;
        let expected = self.expected.load(Ordering::SeqCst).max(1);
        self.advance((installed as f64 / expected as f64).min(1.0));
    }

    /// Publish `fraction` if it is larger than the current value.
    pub fn advance(&self, fraction: f64) {
        self.sender.send_if_modified(|current| {
            if fraction > *current {
                *current = fraction;
                true
            } else {
                false
            }
        });
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `tile` and write it to `path`, creating parent directories.
async fn install(tile: DataRaster, path: &Path, encoder: TileEncoder) -> Result<(), ProduceError> {
    let failure = |message: String| ProduceError::WriteFailure {
        path: path.display().to_string(),
        message,
    };
    let bytes = encoder.encode(&tile).map_err(failure)?;
    drop(tile);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| failure(e.to_string()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| failure(e.to_string()))
}

/// Keep `error` if it is the first one. Returns whether it was kept.
fn record_failure(failure: &OnceCell<ProduceError>, error: ProduceError) -> bool {
    match failure.set(error) {
        Ok(()) => true,
        Err(rejected) => {
            let later = match rejected {
                SetError::AlreadyInitializedError(e) | SetError::InitializingError(e) => e,
            };
            debug!(error = %later, "writer failed after an earlier failure");
            false
        }
    }
}

/// Tile writers running on at most `size` tasks at once.
///
/// The first failure is kept; the producer checks it between submissions.
pub struct WriterPool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    failure: Arc<OnceCell<ProduceError>>,
    progress: Arc<Progress>,
    encoder: TileEncoder,
}

impl WriterPool {
    pub fn new(size: usize, encoder: TileEncoder, progress: Arc<Progress>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
            tasks: JoinSet::new(),
            failure: Arc::new(OnceCell::new()),
            progress,
            encoder,
        }
    }

    /// First writer error, if any.
    pub fn failure(&self) -> Option<ProduceError> {
        self.failure.get().cloned()
    }

    /// Queue a tile, waiting for a free writer.
    pub async fn submit(&mut self, tile: DataRaster, path: PathBuf) -> Result<(), ProduceError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProduceError::Io("writer pool closed".to_string()))?;

        let failure = self.failure.clone();
        let progress = self.progress.clone();
        let encoder = self.encoder;
        self.tasks.spawn(async move {
            let _permit = permit;
            match install(tile, &path, encoder).await {
                Ok(()) => progress.record_installed(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "tile write failed");
                    record_failure(&failure, e);
                }
            }
        });

        // Reap finished writers so the set does not grow with the run
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                if e.is_panic() {
                    record_failure(&self.failure, ProduceError::Io(format!("writer panicked: {}", e)));
                }
            }
        }
        Ok(())
    }

    /// Wait for every queued writer.
    pub async fn drain(&mut self) -> Result<(), ProduceError> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    record_failure(&self.failure, ProduceError::Io(format!("writer panicked: {}", e)));
                }
            }
        }
        match self.failure() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop queued writers and wait for the running ones to wind down.
    pub async fn abort(&mut self) {
        self.tasks.abort_all();
        let mut stopped = 0usize;
        while let Some(joined) = self.tasks.join_next().await {
            if joined.is_err() {
                stopped += 1;
            }
        }
        debug!(stopped, "writer pool aborted");
    }
}
