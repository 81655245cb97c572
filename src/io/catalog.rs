//! Product catalog collaborator: query and download.
//!
//! The engine only depends on the `ProductCatalog` trait; the bundled
//! implementation talks to the Copernicus Data Space OData API. All
//! network operations run through a bounded retry with backoff so a
//! transient failure for one product never aborts other intervals.

use crate::types::{Footprint, MosaicError, MosaicResult, Product};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://catalogue.dataspace.copernicus.eu/odata/v1";
const TOKEN_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
const MAX_ATTEMPTS: u32 = 3;

/// Source-specific catalog filter parameters
#[derive(Debug, Clone, Default)]
pub struct SourceFilters {
    /// Platform name, e.g. "SENTINEL-2"
    pub platform: String,
    /// Product type filter, e.g. "GRD"
    pub product_type: Option<String>,
    /// Processing level filter, e.g. "S2MSI2A"
    pub processing_level: Option<String>,
    /// (min, max) cloud cover percentage, optical sources only
    pub cloud_cover: Option<(f64, f64)>,
}

/// Remote product catalog. Queries return immutable `Product` records;
/// downloads place the raw archive in the given directory.
pub trait ProductCatalog: Send + Sync {
    fn query(
        &self,
        aoi: &Footprint,
        range: (DateTime<Utc>, DateTime<Utc>),
        filters: &SourceFilters,
    ) -> MosaicResult<Vec<Product>>;

    fn download(&self, product: &Product, dest_dir: &Path) -> MosaicResult<PathBuf>;
}

/// Run `op` up to `attempts` times with a growing pause between tries.
/// Fatal errors are never retried.
pub fn with_retry<T>(
    what: &str,
    attempts: u32,
    mut op: impl FnMut() -> MosaicResult<T>,
) -> MosaicResult<T> {
    let mut last_error = None;
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("{} attempt {} of {} failed: {}", what, attempt, attempts, e);
                last_error = Some(e);
                if attempt < attempts {
                    std::thread::sleep(Duration::from_secs(2 * attempt as u64));
                }
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| MosaicError::Catalog(format!("{} failed without attempts", what))))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ODataResponse {
    value: Vec<ODataProduct>,
}

#[derive(Debug, Deserialize)]
struct ODataProduct {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Footprint")]
    footprint: Option<String>,
    #[serde(rename = "ContentLength", default)]
    content_length: u64,
    #[serde(rename = "ContentDate")]
    content_date: ContentDate,
    #[serde(rename = "Attributes", default)]
    attributes: Vec<ODataAttribute>,
}

#[derive(Debug, Deserialize)]
struct ContentDate {
    #[serde(rename = "Start")]
    start: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ODataAttribute {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value")]
    value: serde_json::Value,
}

/// OData geography literals look like `geography'SRID=4326;POLYGON((...))'`
fn parse_odata_footprint(literal: &str) -> Option<&str> {
    let rest = literal.strip_prefix("geography'")?;
    let rest = rest.strip_suffix('\'')?;
    match rest.split_once(';') {
        Some((_srid, wkt)) => Some(wkt),
        None => Some(rest),
    }
}

impl ODataProduct {
    fn cloud_cover(&self) -> Option<f64> {
        self.attributes
            .iter()
            .find(|a| a.name == "cloudCover")
            .and_then(|a| a.value.as_f64())
    }

    fn into_product(self) -> MosaicResult<Product> {
        let literal = self.footprint.as_deref().ok_or_else(|| {
            MosaicError::Catalog(format!("product {} has no footprint", self.name))
        })?;
        let wkt = parse_odata_footprint(literal).ok_or_else(|| {
            MosaicError::Catalog(format!(
                "product {} has a malformed footprint literal",
                self.name
            ))
        })?;
        let cloud_cover = self.cloud_cover();
        Ok(Product {
            footprint: Footprint::from_wkt(wkt)?,
            acquired: self.content_date.start,
            cloud_cover,
            size_bytes: self.content_length,
            id: self.id,
            title: self.name,
        })
    }
}

/// Copernicus Data Space OData catalog client
pub struct CopernicusCatalog {
    client: reqwest::blocking::Client,
    token: String,
    base_url: String,
}

impl CopernicusCatalog {
    /// Authenticate against the identity service and build a client
    pub fn authenticate(username: &str, password: &str) -> MosaicResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent("sen12mosaic/0.2.0")
            .build()
            .map_err(|e| MosaicError::Catalog(format!("failed to create HTTP client: {}", e)))?;

        let params = [
            ("grant_type", "password"),
            ("client_id", "cdse-public"),
            ("username", username),
            ("password", password),
        ];
        let response = client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .map_err(|e| MosaicError::Catalog(format!("token request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(MosaicError::Catalog(format!(
                "authentication failed with HTTP {}",
                response.status().as_u16()
            )));
        }
        let token: TokenResponse = response
            .json()
            .map_err(|e| MosaicError::Catalog(format!("malformed token response: {}", e)))?;

        log::info!("Authenticated against Copernicus Data Space");
        Ok(CopernicusCatalog {
            client,
            token: token.access_token,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    fn build_filter(
        aoi_wkt: &str,
        range: (DateTime<Utc>, DateTime<Utc>),
        filters: &SourceFilters,
    ) -> String {
        let mut parts = vec![
            format!("Collection/Name eq '{}'", filters.platform),
            format!(
                "OData.CSC.Intersects(area=geography'SRID=4326;{}')",
                aoi_wkt
            ),
            format!(
                "ContentDate/Start ge {}",
                range.0.format("%Y-%m-%dT%H:%M:%S%.3fZ")
            ),
            format!(
                "ContentDate/Start le {}",
                range.1.format("%Y-%m-%dT%H:%M:%S%.3fZ")
            ),
        ];
        if let Some(product_type) = &filters.product_type {
            parts.push(format!(
                "Attributes/OData.CSC.StringAttribute/any(att:att/Name eq 'productType' and att/OData.CSC.StringAttribute/Value eq '{}')",
                product_type
            ));
        }
        if let Some(level) = &filters.processing_level {
            parts.push(format!(
                "Attributes/OData.CSC.StringAttribute/any(att:att/Name eq 'processingLevel' and att/OData.CSC.StringAttribute/Value eq '{}')",
                level
            ));
        }
        if let Some((min_cloud, max_cloud)) = filters.cloud_cover {
            parts.push(format!(
                "Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq 'cloudCover' and att/OData.CSC.DoubleAttribute/Value ge {:.2})",
                min_cloud
            ));
            parts.push(format!(
                "Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq 'cloudCover' and att/OData.CSC.DoubleAttribute/Value le {:.2})",
                max_cloud
            ));
        }
        parts.join(" and ")
    }
}

impl ProductCatalog for CopernicusCatalog {
    fn query(
        &self,
        aoi: &Footprint,
        range: (DateTime<Utc>, DateTime<Utc>),
        filters: &SourceFilters,
    ) -> MosaicResult<Vec<Product>> {
        let filter = Self::build_filter(&aoi.to_wkt(), range, filters);
        let url = format!("{}/Products", self.base_url);

        let response: ODataResponse = with_retry("catalog query", MAX_ATTEMPTS, || {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[
                    ("$filter", filter.as_str()),
                    ("$expand", "Attributes"),
                    ("$orderby", "ContentDate/Start asc"),
                    ("$top", "1000"),
                ])
                .send()
                .map_err(|e| MosaicError::Catalog(format!("query failed: {}", e)))?;
            if !response.status().is_success() {
                return Err(MosaicError::Catalog(format!(
                    "catalog returned HTTP {}",
                    response.status().as_u16()
                )));
            }
            response
                .json()
                .map_err(|e| MosaicError::Catalog(format!("malformed catalog response: {}", e)))
        })?;

        let mut products = Vec::new();
        for entry in response.value {
            let name = entry.name.clone();
            match entry.into_product() {
                Ok(p) => products.push(p),
                // A malformed record is a per-product soft failure
                Err(e) => log::warn!("skipping product {}: {}", name, e),
            }
        }
        log::info!(
            "Catalog query for {} returned {} products",
            filters.platform,
            products.len()
        );
        Ok(products)
    }

    fn download(&self, product: &Product, dest_dir: &Path) -> MosaicResult<PathBuf> {
        std::fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(format!("{}.zip", product.title));
        if dest.exists() {
            log::info!("{} already downloaded, skipping", product.title);
            return Ok(dest);
        }

        let url = format!("{}/Products({})/$value", self.base_url, product.id);
        with_retry(&format!("download of {}", product.title), MAX_ATTEMPTS, || {
            let mut response = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .map_err(|e| MosaicError::Catalog(format!("download failed: {}", e)))?;
            if !response.status().is_success() {
                return Err(MosaicError::Catalog(format!(
                    "download returned HTTP {}",
                    response.status().as_u16()
                )));
            }
            // Write to a temporary name first so an aborted transfer never
            // looks like a finished archive
            let partial = dest.with_extension("zip.part");
            let mut file = std::fs::File::create(&partial)?;
            response
                .copy_to(&mut file)
                .map_err(|e| MosaicError::Catalog(format!("download stream failed: {}", e)))?;
            file.flush()?;
            std::fs::rename(&partial, &dest)?;
            Ok(dest.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_odata_footprint_literal_parsing() {
        let literal = "geography'SRID=4326;POLYGON((0 0,1 0,1 1,0 1,0 0))'";
        assert_eq!(
            parse_odata_footprint(literal),
            Some("POLYGON((0 0,1 0,1 1,0 1,0 0))")
        );
        assert!(parse_odata_footprint("POLYGON((0 0,1 1,0 1,0 0))").is_none());
    }

    #[test]
    fn test_query_filter_includes_all_bounds() {
        let filters = SourceFilters {
            platform: "SENTINEL-2".to_string(),
            product_type: None,
            processing_level: Some("S2MSI2A".to_string()),
            cloud_cover: Some((0.0, 30.0)),
        };
        let range = (
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap(),
        );
        let filter = CopernicusCatalog::build_filter("POLYGON((0 0,1 0,1 1,0 1,0 0))", range, &filters);
        assert!(filter.contains("Collection/Name eq 'SENTINEL-2'"));
        assert!(filter.contains("SRID=4326;POLYGON"));
        assert!(filter.contains("ContentDate/Start ge 2020-01-01T00:00:00.000Z"));
        assert!(filter.contains("cloudCover"));
        assert!(filter.contains("S2MSI2A"));
    }

    #[test]
    fn test_odata_record_parses_into_product() {
        let payload = r#"{
            "value": [{
                "Id": "abc-123",
                "Name": "S2A_MSIL2A_20200103T101421",
                "Footprint": "geography'SRID=4326;POLYGON((0 0,10 0,10 10,0 10,0 0))'",
                "ContentLength": 123456,
                "ContentDate": {"Start": "2020-01-03T10:14:21.024Z"},
                "Attributes": [
                    {"Name": "cloudCover", "Value": 12.5},
                    {"Name": "productType", "Value": "S2MSI2A"}
                ]
            }]
        }"#;
        let parsed: ODataResponse = serde_json::from_str(payload).unwrap();
        let product = parsed.value.into_iter().next().unwrap().into_product().unwrap();
        assert_eq!(product.id, "abc-123");
        assert_eq!(product.cloud_cover, Some(12.5));
        assert_eq!(product.size_bytes, 123456);
        assert_eq!(product.acquired.format("%Y%m%d").to_string(), "20200103");
    }

    #[test]
    fn test_retry_gives_up_after_bounded_attempts() {
        let mut calls = 0;
        let result: MosaicResult<()> = with_retry("op", 2, || {
            calls += 1;
            Err(MosaicError::Catalog("transient".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_retry_does_not_repeat_fatal_errors() {
        let mut calls = 0;
        let result: MosaicResult<()> = with_retry("op", 3, || {
            calls += 1;
            Err(MosaicError::Config("bad".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
