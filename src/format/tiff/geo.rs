//! GeoTIFF geo-referencing.
//!
//! A GeoTIFF carries a pixel-to-model affine either as a pixel scale plus
//! tie point or as a full 4x4 model transformation, and a GeoKey directory
//! describing the model coordinate system. Only geographic (lat/lon) models
//! are handled; projected systems are reported as unsupported.

use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;
use crate::raster::Sector;

use super::parser::Ifd;
use super::tags::TiffTag;
use super::values::ValueReader;

// =============================================================================
// GeoKeys
// =============================================================================

/// GTModelTypeGeoKey
pub const GT_MODEL_TYPE: u16 = 1024;
/// GTRasterTypeGeoKey
pub const GT_RASTER_TYPE: u16 = 1025;
/// GeographicTypeGeoKey
pub const GEOGRAPHIC_TYPE: u16 = 2048;
/// ProjectedCSTypeGeoKey
pub const PROJECTED_CS_TYPE: u16 = 3072;

pub const MODEL_TYPE_PROJECTED: u16 = 1;
pub const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
pub const MODEL_TYPE_GEOCENTRIC: u16 = 3;

pub const RASTER_PIXEL_IS_AREA: u16 = 1;
pub const RASTER_PIXEL_IS_POINT: u16 = 2;

pub const USER_DEFINED: u16 = 32767;

/// EPSG code for WGS 84 geographic coordinates.
pub const EPSG_WGS84: u16 = 4326;

/// Short-valued keys from a GeoKeyDirectory.
///
/// Keys stored in the double or ASCII parameter tags are not needed to
/// classify the model and are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoKeyDirectory {
    keys: Vec<(u16, u16)>,
}

impl GeoKeyDirectory {
    /// Parse the directory from the GeoKeyDirectory SHORT array.
    ///
    /// The array starts with a 4-value header (version, revision, minor
    /// revision, key count) followed by 4 values per key: id, location,
    /// count, value.
    pub fn parse(values: &[u16]) -> Result<Self, TiffError> {
        if values.len() < 4 {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::GeoKeyDirectory.name(),
                message: format!("header needs 4 values, got {}", values.len()),
            });
        }
        let count = values[3] as usize;
        let mut keys = Vec::with_capacity(count);
        for key in values[4..].chunks_exact(4).take(count) {
            // Location 0 means the value is stored in place
            if key[1] == 0 {
                keys.push((key[0], key[3]));
            }
        }
        Ok(Self { keys })
    }

    pub fn get(&self, key: u16) -> Option<u16> {
        self.keys.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn model_type(&self) -> Option<u16> {
        self.get(GT_MODEL_TYPE)
    }

    pub fn raster_type(&self) -> Option<u16> {
        self.get(GT_RASTER_TYPE)
    }

    /// Reject model coordinate systems other than geographic.
    pub fn check_geographic(&self) -> Result<(), TiffError> {
        match self.model_type() {
            Some(MODEL_TYPE_PROJECTED) => Err(TiffError::ProjectionUnsupported(format!(
                "projected model (CS {})",
                self.get(PROJECTED_CS_TYPE).unwrap_or(USER_DEFINED)
            ))),
            Some(MODEL_TYPE_GEOCENTRIC) => Err(TiffError::ProjectionUnsupported(
                "geocentric model".to_string(),
            )),
            Some(_) => Ok(()),
            None => match self.get(PROJECTED_CS_TYPE) {
                Some(cs) if cs != USER_DEFINED => Err(TiffError::ProjectionUnsupported(
                    format!("projected CS {}", cs),
                )),
                _ => Ok(()),
            },
        }
    }
}

// =============================================================================
// GeoReference
// =============================================================================

/// Geo-referencing parameters of one TIFF image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoReference {
    pub pixel_scale: Option<Vec<f64>>,
    pub tie_points: Option<Vec<f64>>,
    pub transformation: Option<Vec<f64>>,
    pub keys: GeoKeyDirectory,
}

/// Pixel-to-geographic affine without rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoAffine {
    /// Longitude of the western edge of column 0
    pub origin_lon: f64,
    /// Latitude of the northern edge of row 0
    pub origin_lat: f64,
    /// Degrees of longitude per column
    pub lon_per_pixel: f64,
    /// Degrees of latitude per row (positive, rows run south)
    pub lat_per_pixel: f64,
}

impl GeoAffine {
    pub fn sector(&self, width: u32, height: u32) -> Sector {
        Sector::new(
            self.origin_lat - height as f64 * self.lat_per_pixel,
            self.origin_lat,
            self.origin_lon,
            self.origin_lon + width as f64 * self.lon_per_pixel,
        )
    }
}

impl GeoReference {
    /// Read geo tags from an IFD. Returns `None` when the image carries none.
    pub async fn read<R: RangeReader + ?Sized>(
        values: &ValueReader<'_, R>,
        ifd: &Ifd,
    ) -> Result<Option<Self>, TiffError> {
        if !has_geo_tags(ifd) {
            return Ok(None);
        }

        let mut geo = GeoReference::default();
        if let Some(entry) = ifd.get_entry_by_tag(TiffTag::ModelPixelScale) {
            geo.pixel_scale = Some(values.read_f64_array(entry).await?);
        }
        if let Some(entry) = ifd.get_entry_by_tag(TiffTag::ModelTiePoint) {
            geo.tie_points = Some(values.read_f64_array(entry).await?);
        }
        if let Some(entry) = ifd.get_entry_by_tag(TiffTag::ModelTransformation) {
            geo.transformation = Some(values.read_f64_array(entry).await?);
        }
        if let Some(entry) = ifd.get_entry_by_tag(TiffTag::GeoKeyDirectory) {
            let raw = values.read_u16_array(entry).await?;
            geo.keys = GeoKeyDirectory::parse(&raw)?;
        }
        Ok(Some(geo))
    }

    /// Pixel-to-geographic affine for area pixels.
    ///
    /// PixelIsPoint rasters tie the model to pixel centres, so the origin is
    /// moved half a pixel north-west to cover whole pixel areas.
    pub fn affine(&self) -> Result<GeoAffine, TiffError> {
        self.keys.check_geographic()?;

        let mut affine = match (&self.pixel_scale, &self.tie_points, &self.transformation) {
            (Some(scale), Some(tie), _) if scale.len() >= 2 && tie.len() >= 6 => GeoAffine {
                origin_lon: tie[3] - tie[0] * scale[0],
                origin_lat: tie[4] + tie[1] * scale[1],
                lon_per_pixel: scale[0],
                lat_per_pixel: scale[1],
            },
            (_, _, Some(m)) if m.len() >= 16 => {
                if m[1] != 0.0 || m[4] != 0.0 {
                    return Err(TiffError::ProjectionUnsupported(
                        "model transformation has rotation terms".to_string(),
                    ));
                }
                GeoAffine {
                    origin_lon: m[3],
                    origin_lat: m[7],
                    lon_per_pixel: m[0],
                    lat_per_pixel: -m[5],
                }
            }
            _ => {
                return Err(TiffError::MissingTag(
                    "ModelPixelScale and ModelTiePoint, or ModelTransformation",
                ))
            }
        };

        if self.keys.raster_type() == Some(RASTER_PIXEL_IS_POINT) {
            debug!("PixelIsPoint raster, shifting origin by half a pixel");
            affine.origin_lon -= affine.lon_per_pixel / 2.0;
            affine.origin_lat += affine.lat_per_pixel / 2.0;
        }
        Ok(affine)
    }

    /// Sector covered by a `width x height` image.
    ///
    /// Coordinates outside geographic range mean the model is projected.
    pub fn sector(&self, width: u32, height: u32) -> Result<Sector, TiffError> {
        let sector = self.affine()?.sector(width, height);
        if !sector.is_geographic() {
            return Err(TiffError::ProjectionUnsupported(format!(
                "model coordinates {} are outside geographic range",
                sector
            )));
        }
        Ok(sector)
    }
}

/// Whether any GeoTIFF tag is present.
pub fn has_geo_tags(ifd: &Ifd) -> bool {
    [
        TiffTag::ModelPixelScale,
        TiffTag::ModelTiePoint,
        TiffTag::ModelTransformation,
        TiffTag::GeoKeyDirectory,
    ]
    .iter()
    .any(|&tag| ifd.has_tag(tag))
}

/// Parse a GDAL_NODATA string.
pub fn parse_nodata(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

/// GeoKeyDirectory for a WGS 84 geographic, PixelIsArea raster.
pub fn wgs84_key_directory() -> Vec<u16> {
    vec![
        1, 1, 0, 3, //
        GT_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC, //
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA, //
        GEOGRAPHIC_TYPE, 0, 1, EPSG_WGS84,
    ]
}
