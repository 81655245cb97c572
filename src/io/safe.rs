//! SAFE product archive handling: extraction, name stamps and band
//! discovery from `manifest.safe`.

use crate::types::{MosaicError, MosaicResult, Polarization};
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Extract a downloaded product archive next to itself and return the
/// `.SAFE` directory. Extraction is skipped when the directory already
/// exists, so reruns of an interval are cheap.
pub fn extract_archive(zip_path: &Path) -> MosaicResult<PathBuf> {
    let dest_dir = zip_path
        .parent()
        .ok_or_else(|| MosaicError::Processing(format!("{} has no parent", zip_path.display())))?;
    let stem = zip_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            MosaicError::Processing(format!("{} has no usable file stem", zip_path.display()))
        })?;
    let safe_dir = dest_dir.join(format!("{}.SAFE", stem));
    if safe_dir.is_dir() {
        log::debug!("{} already extracted", safe_dir.display());
        return Ok(safe_dir);
    }

    log::info!("Extracting {}", zip_path.display());
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    archive.extract(dest_dir)?;

    if safe_dir.is_dir() {
        Ok(safe_dir)
    } else {
        Err(MosaicError::Processing(format!(
            "archive {} did not contain {}.SAFE",
            zip_path.display(),
            stem
        )))
    }
}

/// Polarization channels encoded in a Sentinel-1 product name, e.g.
/// `S1A_IW_GRDH_1SDV_...` carries the `DV` stamp meaning VH+VV.
pub fn polarizations_from_name(name: &str) -> MosaicResult<Vec<Polarization>> {
    let stamp_token = name.split('_').nth(3).ok_or_else(|| {
        MosaicError::Processing(format!("{} is not a Sentinel-1 product name", name))
    })?;
    let stamp = stamp_token.get(2..4).unwrap_or("");
    match stamp {
        "DV" => Ok(vec![Polarization::VH, Polarization::VV]),
        "DH" => Ok(vec![Polarization::HH, Polarization::HV]),
        "SH" | "HH" => Ok(vec![Polarization::HH]),
        "SV" => Ok(vec![Polarization::VV]),
        other => Err(MosaicError::Processing(format!(
            "unknown polarization stamp '{}' in {}",
            other, name
        ))),
    }
}

/// Acquisition start timestamp embedded in a SAFE product name
pub fn acquisition_from_name(name: &str) -> Option<DateTime<Utc>> {
    let re = regex::Regex::new(r"(\d{8}T\d{6})").ok()?;
    let stamp = re.captures(name)?.get(1)?.as_str();
    NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

// The manifest is a large XFDU document; only the data object hrefs are
// needed to locate band rasters.
#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "dataObjectSection")]
    data_object_section: DataObjectSection,
}

#[derive(Debug, Deserialize)]
struct DataObjectSection {
    #[serde(rename = "dataObject")]
    data_objects: Vec<DataObject>,
}

#[derive(Debug, Deserialize)]
struct DataObject {
    #[serde(rename = "byteStream")]
    byte_stream: ByteStream,
}

#[derive(Debug, Deserialize)]
struct ByteStream {
    #[serde(rename = "fileLocation")]
    file_location: FileLocation,
}

#[derive(Debug, Deserialize)]
struct FileLocation {
    #[serde(rename = "@href")]
    href: String,
}

/// 10 m band rasters of one Sentinel-2 granule
#[derive(Debug, Default, Clone)]
pub struct BandLocations {
    pub red: Option<PathBuf>,
    pub green: Option<PathBuf>,
    pub blue: Option<PathBuf>,
    pub nir: Option<PathBuf>,
    pub tci: Option<PathBuf>,
}

impl BandLocations {
    /// Present bands in a fixed, documented order
    pub fn named(&self) -> Vec<(&'static str, &Path)> {
        [
            ("red", &self.red),
            ("green", &self.green),
            ("blue", &self.blue),
            ("nir", &self.nir),
            ("tci", &self.tci),
        ]
        .into_iter()
        .filter_map(|(name, path)| path.as_deref().map(|p| (name, p)))
        .collect()
    }
}

fn band_key(href: &str) -> Option<&'static str> {
    if href.contains("B02.jp2") || href.contains("B02_10m.jp2") {
        Some("blue")
    } else if href.contains("B03.jp2") || href.contains("B03_10m.jp2") {
        Some("green")
    } else if href.contains("B04.jp2") || href.contains("B04_10m.jp2") {
        Some("red")
    } else if href.contains("B08.jp2") || href.contains("B08_10m.jp2") {
        Some("nir")
    } else if href.contains("TCI.jp2") || href.contains("TCI_10m.jp2") {
        Some("tci")
    } else {
        None
    }
}

/// Locate the 10 m band rasters of an extracted Sentinel-2 SAFE product
/// by walking the fileLocation hrefs of its manifest.
pub fn discover_bands(safe_dir: &Path) -> MosaicResult<BandLocations> {
    let manifest_path = safe_dir.join("manifest.safe");
    let text = std::fs::read_to_string(&manifest_path)?;
    let manifest: Manifest = from_str(&text)
        .map_err(|e| MosaicError::Processing(format!("failed to parse manifest: {}", e)))?;

    let mut bands = BandLocations::default();
    for obj in &manifest.data_object_section.data_objects {
        let href = &obj.byte_stream.file_location.href;
        let slot = match band_key(href) {
            Some("blue") => &mut bands.blue,
            Some("green") => &mut bands.green,
            Some("red") => &mut bands.red,
            Some("nir") => &mut bands.nir,
            Some("tci") => &mut bands.tci,
            _ => continue,
        };
        *slot = Some(safe_dir.join(href.trim_start_matches("./")));
    }

    log::debug!(
        "Discovered {} band rasters in {}",
        bands.named().len(),
        safe_dir.display()
    );
    Ok(bands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dual_pol_vv_vh_stamp() {
        let pols =
            polarizations_from_name("S1A_IW_GRDH_1SDV_20200103T170815_20200103T170842_030639")
                .unwrap();
        assert_eq!(pols, vec![Polarization::VH, Polarization::VV]);
    }

    #[test]
    fn test_single_pol_and_unknown_stamps() {
        let pols = polarizations_from_name("S1B_IW_GRDH_1SSV_20200103T170815").unwrap();
        assert_eq!(pols, vec![Polarization::VV]);
        assert!(polarizations_from_name("S1B_IW_GRDH_1SXX_20200103T170815").is_err());
        assert!(polarizations_from_name("junk").is_err());
    }

    #[test]
    fn test_acquisition_timestamp_from_name() {
        let t = acquisition_from_name("S2A_MSIL2A_20200103T101421_N0213_R022").unwrap();
        assert_eq!(t.format("%Y-%m-%d %H:%M:%S").to_string(), "2020-01-03 10:14:21");
        assert!(acquisition_from_name("no timestamp here").is_none());
    }

    #[test]
    fn test_manifest_band_discovery() {
        let manifest = r#"<?xml version="1.0" encoding="UTF-8"?>
<xfdu:XFDU xmlns:xfdu="urn:ccsds:schema:xfdu:1">
  <informationPackageMap/>
  <dataObjectSection>
    <dataObject ID="IMG_DATA_Band_10m_1_Tile1_Data">
      <byteStream mimeType="application/octet-stream" size="1">
        <fileLocation locatorType="URL" href="./GRANULE/L2A_T32UNU/IMG_DATA/R10m/T32UNU_B02_10m.jp2"/>
      </byteStream>
    </dataObject>
    <dataObject ID="IMG_DATA_Band_10m_2_Tile1_Data">
      <byteStream mimeType="application/octet-stream" size="1">
        <fileLocation locatorType="URL" href="./GRANULE/L2A_T32UNU/IMG_DATA/R10m/T32UNU_B04_10m.jp2"/>
      </byteStream>
    </dataObject>
    <dataObject ID="Aux_Data">
      <byteStream mimeType="application/octet-stream" size="1">
        <fileLocation locatorType="URL" href="./AUX_DATA/AUX_CAMSFO"/>
      </byteStream>
    </dataObject>
  </dataObjectSection>
</xfdu:XFDU>"#;

        let dir = tempfile::tempdir().unwrap();
        let safe_dir = dir.path().join("S2A_MSIL2A_test.SAFE");
        std::fs::create_dir_all(&safe_dir).unwrap();
        std::fs::write(safe_dir.join("manifest.safe"), manifest).unwrap();

        let bands = discover_bands(&safe_dir).unwrap();
        assert!(bands.blue.is_some());
        assert!(bands.red.is_some());
        assert!(bands.green.is_none());
        assert!(bands.tci.is_none());
        assert_eq!(bands.named().len(), 2);
        assert!(bands.red.unwrap().ends_with("GRANULE/L2A_T32UNU/IMG_DATA/R10m/T32UNU_B04_10m.jp2"));
    }

    #[test]
    fn test_extract_archive_returns_safe_dir() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("S1A_IW_GRDH_1SDV_test.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        writer
            .start_file("S1A_IW_GRDH_1SDV_test.SAFE/manifest.safe", options)
            .unwrap();
        writer.write_all(b"<manifest/>").unwrap();
        writer.finish().unwrap();

        let safe = extract_archive(&zip_path).unwrap();
        assert!(safe.ends_with("S1A_IW_GRDH_1SDV_test.SAFE"));
        assert!(safe.join("manifest.safe").is_file());
        // Second call is a no-op on the existing directory
        assert_eq!(extract_archive(&zip_path).unwrap(), safe);
    }
}
