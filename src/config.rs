//! Run configuration loaded from a YAML file, plus API credentials and
//! the area of interest read from GeoJSON.
//!
//! The YAML keys mirror the established config layout of earlier mosaic
//! runs, so existing config files keep working unchanged:
//!
//! ```yaml
//! OUTPUT_FOLDER: /data/mosaics
//! min_coverage: 0.95
//! DATE:
//!   min_date: "20200101"
//!   max_date: "20200301"
//!   ts_interval: 30
//! OAH_CREDS: /secrets/creds.json
//! FOOTPRINT: aoi.geojson
//! S2:
//!   mincloudcover: 0
//!   maxcloudcover: 20
//!   processinglevel: Level-2A
//! S1:
//!   producttype: GRD
//! ```

use crate::io::catalog::SourceFilters;
use crate::types::{Footprint, MosaicError, MosaicResult};
use chrono::{DateTime, NaiveDate, Utc};
use geo_types::MultiPolygon;
use geojson::GeoJson;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(rename = "OUTPUT_FOLDER")]
    pub output_folder: PathBuf,
    pub min_coverage: f64,
    #[serde(rename = "DATE")]
    pub date: DateConfig,
    #[serde(rename = "OAH_CREDS")]
    pub credentials_file: PathBuf,
    #[serde(rename = "FOOTPRINT")]
    pub footprint_file: PathBuf,
    #[serde(rename = "S2")]
    pub s2: S2Config,
    #[serde(rename = "S1")]
    pub s1: S1Config,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateConfig {
    /// Inclusive range start, `%Y%m%d`
    pub min_date: String,
    /// Exclusive range end, `%Y%m%d`
    pub max_date: String,
    /// Window width in days
    pub ts_interval: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S2Config {
    pub mincloudcover: f64,
    pub maxcloudcover: f64,
    pub processinglevel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S1Config {
    pub producttype: String,
}

impl RunConfig {
    /// Load and validate a config file. Validation failures are fatal:
    /// a run never starts from a broken config.
    pub fn from_file(path: &Path) -> MosaicResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MosaicError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: RunConfig = serde_yaml::from_str(&text)
            .map_err(|e| MosaicError::Config(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> MosaicResult<()> {
        if !(self.min_coverage > 0.0 && self.min_coverage <= 1.0) {
            return Err(MosaicError::Config(format!(
                "min_coverage must be in (0, 1], got {}",
                self.min_coverage
            )));
        }
        if self.date.ts_interval <= 0 {
            return Err(MosaicError::Config(format!(
                "ts_interval must be positive, got {}",
                self.date.ts_interval
            )));
        }
        parse_date(&self.date.min_date)?;
        parse_date(&self.date.max_date)?;
        let (min, max) = self.date_range()?;
        if max <= min {
            return Err(MosaicError::Config(format!(
                "max_date {} must be after min_date {}",
                self.date.max_date, self.date.min_date
            )));
        }
        if !(self.s2.mincloudcover <= self.s2.maxcloudcover) {
            return Err(MosaicError::Config(format!(
                "cloud cover range [{}, {}] is inverted",
                self.s2.mincloudcover, self.s2.maxcloudcover
            )));
        }
        Ok(())
    }

    pub fn date_range(&self) -> MosaicResult<(DateTime<Utc>, DateTime<Utc>)> {
        Ok((parse_date(&self.date.min_date)?, parse_date(&self.date.max_date)?))
    }

    /// Read the area of interest from the configured GeoJSON file. All
    /// polygonal geometries in the file are collected into one footprint.
    pub fn load_aoi(&self) -> MosaicResult<Footprint> {
        let text = std::fs::read_to_string(&self.footprint_file).map_err(|e| {
            MosaicError::Config(format!(
                "cannot read AOI {}: {}",
                self.footprint_file.display(),
                e
            ))
        })?;
        let geojson: GeoJson = text.parse().map_err(|e| {
            MosaicError::Geometry(format!(
                "invalid GeoJSON in {}: {}",
                self.footprint_file.display(),
                e
            ))
        })?;
        let collection: geo_types::GeometryCollection<f64> = geojson::quick_collection(&geojson)
            .map_err(|e| MosaicError::Geometry(format!("unsupported GeoJSON geometry: {}", e)))?;

        let mut polygons = Vec::new();
        for geometry in collection {
            match geometry {
                geo_types::Geometry::Polygon(p) => polygons.push(p),
                geo_types::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
                _ => {}
            }
        }
        if polygons.is_empty() {
            return Err(MosaicError::Geometry(format!(
                "{} contains no polygonal geometry",
                self.footprint_file.display()
            )));
        }
        Ok(Footprint::from_multi_polygon(MultiPolygon(polygons)))
    }

    pub fn s2_filters(&self) -> SourceFilters {
        SourceFilters {
            platform: "SENTINEL-2".to_string(),
            product_type: None,
            processing_level: Some(self.s2.processinglevel.clone()),
            cloud_cover: Some((self.s2.mincloudcover, self.s2.maxcloudcover)),
        }
    }

    pub fn s1_filters(&self) -> SourceFilters {
        SourceFilters {
            platform: "SENTINEL-1".to_string(),
            product_type: Some(self.s1.producttype.clone()),
            processing_level: None,
            cloud_cover: None,
        }
    }
}

fn parse_date(text: &str) -> MosaicResult<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(text, "%Y%m%d")
        .map_err(|e| MosaicError::Config(format!("invalid date '{}': {}", text, e)))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| MosaicError::Config(format!("invalid date '{}'", text)))?;
    Ok(midnight.and_utc())
}

/// Data space API credentials, kept out of the main config file
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    credentials: Credentials,
}

impl Credentials {
    pub fn from_json_file(path: &Path) -> MosaicResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MosaicError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let file: CredentialsFile = serde_json::from_str(&text).map_err(|e| {
            MosaicError::Config(format!("invalid credentials {}: {}", path.display(), e))
        })?;
        Ok(file.credentials)
    }
}
