//! Dataset descriptor written next to the tile tree.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProduceError;
use crate::io::ByteOrder;
use crate::raster::{ElementType, PixelFormat, Sector};

use super::params::{ResolvedParams, TileFormat};
use super::pyramid::{Pyramid, TileDelta};

pub const DESCRIPTOR_FORMAT_VERSION: u32 = 1;

/// Everything a consumer needs to address and decode the tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub format_version: u32,
    pub dataset: String,
    pub sector: Sector,
    pub level_zero_tile_delta: TileDelta,
    pub tile_dimension: u32,
    pub level_count: u32,
    pub format_suffix: TileFormat,
    pub kind: PixelFormat,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pixel_type: Option<ElementType>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub byte_order: Option<ByteOrder>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub missing_data: Option<f64>,
    pub tile_count: usize,
}

impl DatasetDescriptor {
    pub fn new(params: &ResolvedParams, pyramid: &Pyramid, tile_count: usize) -> Self {
        let elevation = params.kind == PixelFormat::Elevation;
        Self {
            format_version: DESCRIPTOR_FORMAT_VERSION,
            dataset: params.dataset_name.clone(),
            sector: pyramid.extent,
            level_zero_tile_delta: pyramid.level_zero_delta,
            tile_dimension: pyramid.tile_dimension,
            level_count: pyramid.level_count,
            format_suffix: params.format,
            kind: params.kind,
            pixel_type: params.pixel_type,
            byte_order: (elevation || params.format == TileFormat::Tif).then_some(params.byte_order),
            missing_data: params.missing_data,
            tile_count,
        }
    }

    /// `<dataset_dir>/<dataset>.json`
    pub fn path(&self, dataset_dir: &Path) -> PathBuf {
        dataset_dir.join(format!("{}.json", self.dataset))
    }

    pub async fn write(&self, dataset_dir: &Path) -> Result<PathBuf, ProduceError> {
        let path = self.path(dataset_dir);
        let json = serde_json::to_vec_pretty(self).map_err(|e| ProduceError::WriteFailure {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| ProduceError::WriteFailure {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(path)
    }

    pub async fn read(path: &Path) -> Result<Self, ProduceError> {
        let bytes = tokio::fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| ProduceError::Io(e.to_string()))
    }
}
