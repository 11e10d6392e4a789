//! raster-tiler - builds tile pyramids from geo-referenced rasters.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use raster_tiler::{
    config::{Cli, Command, InfoConfig, ProduceConfig},
    DataRasterReader, PartialMetadata, RasterCache, RasterSource, ReaderSet, TileProducer,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Produce(config) => run_produce(config).await,
        Command::Info(config) => run_info(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "raster_tiler=debug"
    } else {
        "raster_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Inputs are file:// URLs or plain paths.
fn parse_sources(inputs: &[String]) -> Result<Vec<RasterSource>, String> {
    inputs
        .iter()
        .map(|input| RasterSource::from_url(input).map_err(|e| format!("{}: {}", input, e)))
        .collect()
}

// =============================================================================
// Produce Command
// =============================================================================

async fn run_produce(config: ProduceConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let sources = match parse_sources(&config.inputs) {
        Ok(sources) => sources,
        Err(e) => {
            error!("Invalid input: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Output: {}", config.output.display());
    info!("  Dataset: {}", config.dataset);
    info!("  Kind: {:?}", config.kind);
    info!("  Tile size: {}", config.tile_size);
    info!(
        "  Cache: {} MiB, mmap above {} MiB, {} writer(s)",
        config.cache_mb, config.mmap_threshold_mb, config.writers
    );
    info!("  Inputs: {}", sources.len());

    let readers = Arc::new(ReaderSet::with_mmap_threshold(config.mmap_threshold_bytes()));
    let cache = Arc::new(RasterCache::with_capacity(config.cache_bytes()));
    let producer = TileProducer::new(config.to_params(), readers, cache);

    let mut progress = producer.subscribe_progress();
    let reporter = tokio::spawn(async move {
        let mut reported = 0u32;
        while progress.changed().await.is_ok() {
            let percent = (*progress.borrow_and_update() * 100.0) as u32;
            if percent >= reported + 10 || percent == 100 {
                reported = percent;
                info!("  {}% complete", percent);
            }
        }
    });

    let cancel = producer.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling production");
            cancel.cancel();
        }
    });

    let result = producer.produce(sources).await;
    interrupt.abort();
    drop(producer);
    let _ = reporter.await;

    match result {
        Ok(summary) => {
            info!("Production complete:");
            info!("  Dataset: {}", summary.dataset_dir.display());
            info!("  Descriptor: {}", summary.descriptor_path.display());
            info!("  Levels: {}", summary.level_count);
            info!("  Tiles: {}", summary.tiles_written);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Production failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let sources = match parse_sources(&config.inputs) {
        Ok(sources) => sources,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let readers = ReaderSet::default();
    let mut failed = false;
    for source in &sources {
        println!("{}", source.name());
        let Some(reader) = readers.find_reader(source).await else {
            println!("  ✗ no reader accepts this source");
            failed = true;
            continue;
        };
        println!("  Reader: {}", reader.name());
        match reader.read_metadata(source, PartialMetadata::default()).await {
            Ok(metadata) => match serde_json::to_string_pretty(&metadata) {
                Ok(json) => {
                    for line in json.lines() {
                        println!("  {}", line);
                    }
                }
                Err(e) => {
                    println!("  ✗ {}", e);
                    failed = true;
                }
            },
            Err(e) => {
                println!("  ✗ {}", e);
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
