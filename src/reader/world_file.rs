//! World files: six-line affine sidecars next to image and grid files.
//!
//! Lines are A (x pixel size), D (rotation), B (rotation), E (y pixel size,
//! negative for north-up), C and F (centre of the upper-left pixel).

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{IoError, ReadError};
use crate::raster::Sector;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldFile {
    pub a: f64,
    pub d: f64,
    pub b: f64,
    pub e: f64,
    pub c: f64,
    pub f: f64,
}

impl WorldFile {
    pub fn parse(text: &str) -> Result<Self, String> {
        let values = text
            .split_whitespace()
            .take(6)
            .map(|t| t.parse::<f64>().map_err(|_| format!("not a number: '{}'", t)))
            .collect::<Result<Vec<_>, _>>()?;
        match values[..] {
            [a, d, b, e, c, f] => Ok(Self { a, d, b, e, c, f }),
            _ => Err(format!("expected 6 values, found {}", values.len())),
        }
    }

    /// Sector covered by a `width x height` raster.
    ///
    /// Rotated or out-of-range world files describe projected rasters.
    pub fn sector(&self, width: u32, height: u32) -> Result<Sector, ReadError> {
        if self.b != 0.0 || self.d != 0.0 {
            return Err(ReadError::ProjectionUnsupported(
                "world file has rotation terms".to_string(),
            ));
        }
        let lon0 = self.c - self.a / 2.0;
        let lat0 = self.f - self.e / 2.0;
        let lon1 = lon0 + self.a * width as f64;
        let lat1 = lat0 + self.e * height as f64;
        let sector = Sector::new(lat0.min(lat1), lat0.max(lat1), lon0.min(lon1), lon0.max(lon1));
        if !sector.is_geographic() {
            return Err(ReadError::ProjectionUnsupported(format!(
                "world file coordinates {} are outside geographic range",
                sector
            )));
        }
        Ok(sector)
    }
}

/// Sidecar names for `path`, in lookup order: `<stem>.<e0><elast>w`,
/// `<stem>.<ext>w`, `<stem>.wld`.
pub fn candidate_names(path: &Path) -> Vec<String> {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return Vec::new();
    };
    let mut names = Vec::new();
    if let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()) {
        let mut chars = ext.chars();
        if let (Some(first), Some(last)) = (chars.next(), ext.chars().last()) {
            names.push(format!("{}.{}{}w", stem, first, last));
        }
        names.push(format!("{}.{}w", stem, ext));
    }
    names.push(format!("{}.wld", stem));
    names.dedup();
    names
}

/// Find the world file next to `path`, matching names case-insensitively.
pub async fn find_world_file(path: &Path) -> Result<Option<PathBuf>, IoError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let candidates: Vec<String> = candidate_names(path)
        .into_iter()
        .map(|n| n.to_lowercase())
        .collect();
    if candidates.is_empty() {
        return Ok(None);
    }

    let mut found: Vec<(usize, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if let Some(rank) = candidates.iter().position(|c| *c == name) {
            found.push((rank, entry.path()));
        }
    }
    found.sort_by_key(|(rank, _)| *rank);
    Ok(found.into_iter().next().map(|(_, p)| p))
}

/// Sector from the world file next to `path`, if there is one.
pub async fn sector_from_world_file(
    path: &Path,
    width: u32,
    height: u32,
) -> Result<Option<Sector>, ReadError> {
    let Some(world) = find_world_file(path).await? else {
        return Ok(None);
    };
    debug!(world_file = %world.display(), "reading world file");
    let text = tokio::fs::read_to_string(&world)
        .await
        .map_err(IoError::from)?;
    let parsed = WorldFile::parse(&text).map_err(|message| ReadError::InvalidMetadata {
        source_name: world.display().to_string(),
        message,
    })?;
    parsed.sector(width, height).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_candidate_names() {
        assert_eq!(
            candidate_names(Path::new("/maps/scan.png")),
            vec!["scan.pgw", "scan.pngw", "scan.wld"]
        );
        assert_eq!(
            candidate_names(Path::new("dem.BIL")),
            vec!["dem.blw", "dem.bilw", "dem.wld"]
        );
    }

    #[test]
    fn test_sector_from_pixel_centres() {
        let world = WorldFile::parse("0.5\n0\n0\n-0.5\n10.25\n49.75\n").unwrap();
        let sector = world.sector(4, 2).unwrap();
        assert_relative_eq!(sector.min_lon, 10.0);
        assert_relative_eq!(sector.max_lon, 12.0);
        assert_relative_eq!(sector.max_lat, 50.0);
        assert_relative_eq!(sector.min_lat, 49.0);
    }

    #[test]
    fn test_rotation_and_projected_coordinates() {
        let rotated = WorldFile::parse("1 0.1 0 -1 0 0").unwrap();
        assert!(matches!(
            rotated.sector(2, 2),
            Err(ReadError::ProjectionUnsupported(_))
        ));

        let utm = WorldFile::parse("30 0 0 -30 500000 5000000").unwrap();
        assert!(matches!(
            utm.sector(100, 100),
            Err(ReadError::ProjectionUnsupported(_))
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(WorldFile::parse("1 0 0").is_err());
        assert!(WorldFile::parse("1 0 0 x 0 0").is_err());
    }

    #[tokio::test]
    async fn test_find_world_file_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("scan.png");
        std::fs::write(&image, b"").unwrap();
        assert_eq!(find_world_file(&image).await.unwrap(), None);

        std::fs::write(dir.path().join("SCAN.WLD"), "1 0 0 -1 0.5 0.5").unwrap();
        std::fs::write(dir.path().join("scan.PGW"), "1 0 0 -1 10.5 10.5").unwrap();
        let found = find_world_file(&image).await.unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "scan.PGW");

        let sector = sector_from_world_file(&image, 2, 2).await.unwrap().unwrap();
        assert_eq!(sector, Sector::new(9.0, 11.0, 10.0, 12.0));
    }
}
