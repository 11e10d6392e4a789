//! The tile producer.
//!
//! A producer runs once: it validates every source, sizes the pyramid,
//! composites each tile from the sources overlapping it and hands finished
//! tiles to a bounded writer pool. A writer failure or cancellation stops the
//! pool and deletes the directories the run created before the error is
//! returned.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cache::{RasterCache, RasterSet};
use crate::error::{ProduceError, ReadError};
use crate::raster::{DataRaster, ElementType, PixelFormat, Sector};
use crate::reader::{
    DataRasterReader, PartialMetadata, RasterMetadata, RasterReader, RasterSource, ReaderSet,
};

use super::descriptor::DatasetDescriptor;
use super::params::{ProductionParams, ResolvedParams};
use super::pyramid::{Pyramid, SourceExtent, TileKey};
use super::writer::{Progress, TileEncoder, WriterPool};

/// Lifecycle of a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Idle,
    Validating,
    Producing,
    Completed,
    Failed,
}

/// Stops a running production between tile submissions.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionSummary {
    pub dataset_dir: PathBuf,
    pub descriptor_path: PathBuf,
    pub level_count: u32,
    pub tiles_written: usize,
}

/// A source that passed validation.
struct ValidSource<'a> {
    source: RasterSource,
    reader: &'a RasterReader,
    metadata: RasterMetadata,
}

/// Output directories a run created, removed again if the run fails.
///
/// When the dataset directory already exists it is kept, and only the level
/// directories this run added to it are listed.
#[derive(Debug, Default)]
struct CreatedDirs {
    dirs: Vec<PathBuf>,
}

impl CreatedDirs {
    async fn create(&mut self, dataset_dir: &Path, level_count: u32) -> std::io::Result<()> {
        if tokio::fs::try_exists(dataset_dir).await? {
            for level in 0..level_count {
                let dir = dataset_dir.join(level.to_string());
                if !tokio::fs::try_exists(&dir).await? {
                    self.dirs.push(dir);
                }
            }
            info!(dataset = %dataset_dir.display(), "writing into existing dataset directory");
        } else {
            self.dirs.push(dataset_dir.to_path_buf());
        }
        tokio::fs::create_dir_all(dataset_dir).await
    }

    async fn remove(&self) {
        for dir in &self.dirs {
            if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %dir.display(), error = %e, "could not remove partial output");
                }
            }
        }
    }
}

/// Decoded sources for the level being produced.
///
/// Sets the cache will not admit are held until the last tile of the level
/// that overlaps them, so a large source is decoded once per level rather
/// than once per tile.
struct LevelRasters {
    held: HashMap<usize, RasterSet>,
    last_use: HashMap<usize, TileKey>,
}

impl LevelRasters {
    fn new(last_use: HashMap<usize, TileKey>) -> Self {
        Self {
            held: HashMap::new(),
            last_use,
        }
    }

    /// Last tile of `tiles` overlapping each source.
    fn plan(tiles: &[TileKey], pyramid: &Pyramid, sources: &[ValidSource<'_>]) -> Self {
        let mut last_use = HashMap::new();
        for &key in tiles {
            let sector = pyramid.tile_sector(key);
            for (index, valid) in sources.iter().enumerate() {
                if valid.metadata.sector.intersects_interior(&sector) {
                    last_use.insert(index, key);
                }
            }
        }
        Self::new(last_use)
    }

    async fn get<F, Fut>(
        &mut self,
        cache: &RasterCache,
        index: usize,
        source: &RasterSource,
        loader: F,
    ) -> Result<RasterSet, ReadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<DataRaster>, ReadError>>,
    {
        if let Some(rasters) = self.held.get(&index) {
            return Ok(rasters.clone());
        }
        let rasters = cache.get_or_load(source, loader).await?;
        let size: usize = rasters.iter().map(DataRaster::size_in_bytes).sum();
        if !cache.admits(size) && self.last_use.contains_key(&index) {
            debug!(source = %source.name(), size, "holding rasters too large for the cache");
            self.held.insert(index, rasters.clone());
        }
        Ok(rasters)
    }

    /// Release sets whose last tile was `key`.
    fn finish_tile(&mut self, key: TileKey) {
        let last_use = &self.last_use;
        self.held.retain(|index, _| last_use.get(index) != Some(&key));
    }
}

pub struct TileProducer {
    params: ProductionParams,
    readers: Arc<ReaderSet>,
    cache: Arc<RasterCache>,
    state: watch::Sender<ProducerState>,
    progress: Arc<Progress>,
    cancel: CancelHandle,
}

impl TileProducer {
    pub fn new(params: ProductionParams, readers: Arc<ReaderSet>, cache: Arc<RasterCache>) -> Self {
        let (state, _) = watch::channel(ProducerState::Idle);
        Self {
            params,
            readers,
            cache,
            state,
            progress: Arc::new(Progress::new()),
            cancel: CancelHandle::default(),
        }
    }

    pub fn state(&self) -> ProducerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProducerState> {
        self.state.subscribe()
    }

    /// Fraction of expected files installed so far.
    pub fn progress(&self) -> f64 {
        self.progress.current()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn set_state(&self, state: ProducerState) {
        debug!(?state, "producer state");
        self.state.send_replace(state);
    }

    /// Run production over `sources`. A producer runs at most once.
    pub async fn produce(&self, sources: Vec<RasterSource>) -> Result<ProductionSummary, ProduceError> {
        let started = self.state.send_if_modified(|state| {
            if *state == ProducerState::Idle {
                *state = ProducerState::Validating;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ProduceError::AlreadyStarted);
        }

        let params = match self.params.resolve() {
            Ok(params) => params,
            Err(e) => {
                self.set_state(ProducerState::Failed);
                return Err(e);
            }
        };

        let valid = match self.validate(sources, &params).await {
            Ok(valid) => valid,
            Err(e) => {
                error!(error = %e, "validation failed");
                self.set_state(ProducerState::Failed);
                return Err(e);
            }
        };

        self.set_state(ProducerState::Producing);
        let mut created = CreatedDirs::default();
        match self.run(&params, &valid, &mut created).await {
            Ok(summary) => {
                self.progress.advance(1.0);
                self.set_state(ProducerState::Completed);
                info!(
                    dataset = %summary.dataset_dir.display(),
                    levels = summary.level_count,
                    tiles = summary.tiles_written,
                    "production completed"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "production failed, removing partial output");
                created.remove().await;
                self.set_state(ProducerState::Failed);
                Err(e)
            }
        }
    }

    /// Every source must have a reader, complete metadata and the producer's kind.
    async fn validate(
        &self,
        sources: Vec<RasterSource>,
        params: &ResolvedParams,
    ) -> Result<Vec<ValidSource<'_>>, ProduceError> {
        if sources.is_empty() {
            return Err(ProduceError::NoSources);
        }

        let mut valid = Vec::with_capacity(sources.len());
        for source in sources {
            let invalid = |reason: String| ProduceError::InvalidSource {
                source_name: source.name(),
                reason,
            };
            let reader = self
                .readers
                .find_reader(&source)
                .await
                .ok_or_else(|| invalid("no reader accepts the source".to_string()))?;
            let metadata = reader
                .read_metadata(&source, PartialMetadata::default())
                .await
                .map_err(|e| invalid(e.to_string()))?;
            let sector = metadata.sector;
            if sector.crosses_antimeridian() {
                return Err(invalid(format!(
                    "sector {} crosses the antimeridian; offer each side as its own source",
                    sector
                )));
            }
            if !sector.is_geographic() || sector.is_empty() {
                return Err(invalid(format!("sector {} is not a geographic area", sector)));
            }
            if metadata.pixel_format != params.kind {
                return Err(invalid(format!(
                    "{} source offered to a {} producer",
                    metadata.pixel_format.name(),
                    params.kind.name()
                )));
            }
            debug!(
                source = %source.name(),
                reader = reader.name(),
                sector = %metadata.sector,
                width = metadata.width,
                height = metadata.height,
                "source validated"
            );
            valid.push(ValidSource {
                source,
                reader,
                metadata,
            });
        }
        Ok(valid)
    }

    fn new_tile(&self, params: &ResolvedParams, sector: Sector) -> DataRaster {
        let dim = params.tile_dimension;
        match params.kind {
            PixelFormat::Image => DataRaster::new_image(dim, dim, sector),
            PixelFormat::Elevation => DataRaster::new_buffer(
                dim,
                dim,
                sector,
                params.pixel_type.unwrap_or(ElementType::I16),
                params.missing_data,
            ),
        }
    }

    async fn run(
        &self,
        params: &ResolvedParams,
        sources: &[ValidSource<'_>],
        created: &mut CreatedDirs,
    ) -> Result<ProductionSummary, ProduceError> {
        let extents: Vec<SourceExtent> = sources
            .iter()
            .map(|s| SourceExtent {
                sector: s.metadata.sector,
                width: s.metadata.width,
                height: s.metadata.height,
            })
            .collect();
        let pyramid = Pyramid::compute(&extents, params.tile_dimension, params.level_zero_delta)?;

        let levels: Vec<Vec<TileKey>> = (0..pyramid.level_count)
            .map(|level| {
                let tiles: BTreeSet<TileKey> = extents
                    .iter()
                    .flat_map(|e| pyramid.tiles_intersecting(level, &e.sector))
                    .collect();
                tiles.into_iter().collect()
            })
            .collect();
        let tile_count: usize = levels.iter().map(Vec::len).sum();
        self.progress.set_expected(tile_count + 1);

        info!(
            extent = %pyramid.extent,
            levels = pyramid.level_count,
            tiles = tile_count,
            delta_lat = pyramid.level_zero_delta.lat,
            delta_lon = pyramid.level_zero_delta.lon,
            "producing pyramid"
        );

        let dataset_dir = params.dataset_dir();
        created.create(&dataset_dir, pyramid.level_count).await?;

        let encoder = TileEncoder::new(params.format, params.byte_order);
        let mut pool = WriterPool::new(params.writer_count, encoder, self.progress.clone());

        for (level, tiles) in levels.iter().enumerate() {
            let mut decoded = LevelRasters::plan(tiles, &pyramid, sources);
            for &key in tiles {
                if self.cancel.is_cancelled() {
                    pool.abort().await;
                    return Err(ProduceError::Cancelled);
                }
                if let Some(e) = pool.failure() {
                    pool.abort().await;
                    return Err(e);
                }

                let sector = pyramid.tile_sector(key);
                let mut tile = self.new_tile(params, sector);
                for (index, valid) in sources.iter().enumerate() {
                    if !valid.metadata.sector.intersects_interior(&sector) {
                        continue;
                    }
                    let rasters = match decoded
                        .get(&self.cache, index, &valid.source, || {
                            valid.reader.read(&valid.source)
                        })
                        .await
                    {
                        Ok(rasters) => rasters,
                        Err(e) => {
                            debug!(source = %valid.source.name(), error = %e, "skipping unreadable source");
                            continue;
                        }
                    };
                    for raster in rasters.iter() {
                        raster.draw_on_canvas(&mut tile, None);
                    }
                }
                decoded.finish_tile(key);

                let path = dataset_dir
                    .join(key.level.to_string())
                    .join(key.row.to_string())
                    .join(format!("{}.{}", key.col, params.format.suffix()));
                if let Err(e) = pool.submit(tile, path).await {
                    pool.abort().await;
                    return Err(e);
                }
            }
            debug!(level, tiles = tiles.len(), "level submitted");
        }

        pool.drain().await?;
        if self.cancel.is_cancelled() {
            return Err(ProduceError::Cancelled);
        }

        let descriptor = DatasetDescriptor::new(params, &pyramid, tile_count);
        let descriptor_path = descriptor.write(&dataset_dir).await?;
        self.progress.record_installed();

        Ok(ProductionSummary {
            dataset_dir,
            descriptor_path,
            level_count: pyramid.level_count,
            tiles_written: self.progress.installed().saturating_sub(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producer(params: ProductionParams) -> TileProducer {
        TileProducer::new(
            params,
            Arc::new(ReaderSet::default()),
            Arc::new(RasterCache::new()),
        )
    }

    #[tokio::test]
    async fn test_no_sources_fails() {
        let dir = tempfile::tempdir().unwrap();
        let producer = producer(ProductionParams::elevation(dir.path()));
        assert_eq!(producer.state(), ProducerState::Idle);
        assert!(matches!(
            producer.produce(Vec::new()).await,
            Err(ProduceError::NoSources)
        ));
        assert_eq!(producer.state(), ProducerState::Failed);
    }

    #[tokio::test]
    async fn test_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let producer = producer(ProductionParams::elevation(dir.path()));
        let _ = producer.produce(Vec::new()).await;
        assert!(matches!(
            producer.produce(Vec::new()).await,
            Err(ProduceError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_invalid_params_fail_before_sources() {
        let producer = producer(ProductionParams::elevation("").with_tile_dimension(0));
        let source = RasterSource::from_bytes("a.bil", vec![0u8; 4]);
        assert!(matches!(
            producer.produce(vec![source]).await,
            Err(ProduceError::InvalidParameter(_))
        ));
        assert_eq!(producer.state(), ProducerState::Failed);
    }

    #[tokio::test]
    async fn test_unreadable_source_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let producer = producer(ProductionParams::elevation(dir.path()));
        let source = RasterSource::from_bytes("notes.txt", b"hello".to_vec());
        assert!(matches!(
            producer.produce(vec![source]).await,
            Err(ProduceError::InvalidSource { .. })
        ));
        assert!(!dir.path().join("dataset").exists());
    }

    #[tokio::test]
    async fn test_oversized_rasters_held_until_last_tile() {
        use std::sync::atomic::AtomicUsize;

        // An 8x8 RGBA image is 256 bytes, more than the cache takes
        let cache = RasterCache::with_capacity(64);
        let source = RasterSource::from_path("/big.tif");
        let loads = AtomicUsize::new(0);
        let counter = &loads;
        let load = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![DataRaster::new_image(8, 8, Sector::new(0.0, 1.0, 0.0, 1.0))])
        };

        let tiles: Vec<TileKey> = (0..3).map(|col| TileKey { level: 2, row: 5, col }).collect();
        let mut decoded = LevelRasters::new(HashMap::from([(0, tiles[2])]));
        for &key in &tiles {
            let rasters = decoded.get(&cache, 0, &source, load).await.unwrap();
            assert_eq!(rasters.len(), 1);
            decoded.finish_tile(key);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(decoded.held.is_empty());
        assert!(cache.is_empty().await);

        // Released after its last tile, so the next level decodes again
        decoded.get(&cache, 0, &source, load).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_rasters_not_held() {
        let cache = RasterCache::with_capacity(1024);
        let source = RasterSource::from_path("/small.tif");
        let key = TileKey { level: 0, row: 0, col: 0 };
        let mut decoded = LevelRasters::new(HashMap::from([(0, key)]));
        decoded
            .get(&cache, 0, &source, || async {
                Ok(vec![DataRaster::new_image(2, 2, Sector::new(0.0, 1.0, 0.0, 1.0))])
            })
            .await
            .unwrap();
        assert!(decoded.held.is_empty());
        assert!(cache.contains(&source).await);
    }

    #[tokio::test]
    async fn test_created_dirs_for_new_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("dem");
        let mut created = CreatedDirs::default();
        created.create(&dataset, 3).await.unwrap();
        assert_eq!(created.dirs, vec![dataset.clone()]);

        created.remove().await;
        assert!(!dataset.exists());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_created_dirs_keep_existing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("dem");
        std::fs::create_dir_all(dataset.join("1")).unwrap();
        std::fs::write(dataset.join("dem.json"), b"{}").unwrap();

        let mut created = CreatedDirs::default();
        created.create(&dataset, 3).await.unwrap();
        assert_eq!(created.dirs, vec![dataset.join("0"), dataset.join("2")]);

        std::fs::create_dir_all(dataset.join("0/4")).unwrap();
        created.remove().await;
        assert!(!dataset.join("0").exists());
        assert!(dataset.join("1").exists());
        assert!(dataset.join("dem.json").exists());
    }

    #[tokio::test]
    async fn test_antimeridian_sector_is_invalid() {
        use crate::format::tiff::GeoTiffWriter;
        use crate::io::ByteOrder;
        use crate::raster::ElementData;

        let dir = tempfile::tempdir().unwrap();
        let bytes = GeoTiffWriter::new(ByteOrder::LittleEndian)
            .encode(2, 2, 3, &ElementData::U8(vec![9; 12]), None, None)
            .unwrap();
        let wrapped = Sector {
            min_lat: 0.0,
            max_lat: 1.0,
            min_lon: 179.0,
            max_lon: -179.0,
        };
        let source = RasterSource::from_bytes("scan.tif", bytes)
            .with_hints(PartialMetadata::new().with_sector(wrapped));

        let producer = producer(ProductionParams::imagery(dir.path()));
        match producer.produce(vec![source]).await {
            Err(ProduceError::InvalidSource { reason, .. }) => {
                assert!(reason.contains("antimeridian"), "{}", reason)
            }
            other => panic!("expected InvalidSource, got {:?}", other),
        }
        assert!(!dir.path().join("dataset").exists());
    }

    #[test]
    fn test_cancel_handle() {
        let producer = producer(ProductionParams::elevation("/out"));
        let handle = producer.cancel_handle();
        assert!(!producer.cancel.is_cancelled());
        handle.cancel();
        assert!(producer.cancel.is_cancelled());
    }
}
