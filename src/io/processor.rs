//! Scene processors turn a downloaded product archive into analysis-ready
//! band rasters.
//!
//! Sentinel-1 GRD scenes are routed through ESA SNAP's `gpt` command line
//! (orbit correction, thermal noise removal, sigma0 calibration and range
//! Doppler terrain correction) and then converted to dB. Sentinel-2 L2A
//! products only need their 10 m JP2 bands located inside the SAFE layout.

use crate::io::raster;
use crate::io::safe;
use crate::types::{BandDtype, MosaicError, MosaicResult, Polarization};
use std::path::{Path, PathBuf};
use std::process::Command;

/// One analysis-ready raster produced from a scene
#[derive(Debug, Clone)]
pub struct BandRaster {
    /// Band label used in output file names, e.g. `VV` or `red`
    pub band: String,
    pub path: PathBuf,
    pub dtype: BandDtype,
}

/// Converts one downloaded archive into band rasters under `work_dir`
pub trait SceneProcessor: Send + Sync {
    fn process(&self, archive: &Path, work_dir: &Path) -> MosaicResult<Vec<BandRaster>>;
}

/// Sentinel-1 GRD backscatter processing through SNAP's `gpt` executable
pub struct SnapGptProcessor {
    gpt_path: PathBuf,
    dem_name: String,
    pixel_spacing_m: f64,
}

impl SnapGptProcessor {
    pub fn new(gpt_path: impl Into<PathBuf>) -> Self {
        SnapGptProcessor {
            gpt_path: gpt_path.into(),
            dem_name: "SRTM 3Sec".to_string(),
            pixel_spacing_m: 10.0,
        }
    }

    pub fn with_dem(mut self, dem_name: impl Into<String>) -> Self {
        self.dem_name = dem_name.into();
        self
    }

    fn run_gpt(&self, operator: &str, args: &[(&str, String)], src: &Path, dst: &Path) -> MosaicResult<()> {
        let mut cmd = Command::new(&self.gpt_path);
        cmd.arg(operator);
        for (key, value) in args {
            cmd.arg(format!("-P{}={}", key, value));
        }
        cmd.arg("-t").arg(dst).arg(src);

        log::debug!("Running gpt {} on {}", operator, src.display());
        let output = cmd.output().map_err(|e| {
            MosaicError::Processing(format!("failed to launch {}: {}", self.gpt_path.display(), e))
        })?;
        if !output.status.success() {
            return Err(MosaicError::Processing(format!(
                "gpt {} failed on {}: {}",
                operator,
                src.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Convert linear sigma0 to dB in place, keeping nodata pixels nodata
    fn to_decibels(src: &Path, dst: &Path) -> MosaicResult<()> {
        let mut tile = raster::read_tile(src, BandDtype::Float32)?;
        let nodata = tile.nodata;
        tile.data.mapv_inplace(|v| {
            if v.is_nan() || (nodata.is_finite() && v == nodata) || v <= 0.0 {
                nodata
            } else {
                10.0 * v.log10()
            }
        });
        raster::write_tile(&tile, dst)
    }
}

impl SceneProcessor for SnapGptProcessor {
    fn process(&self, archive: &Path, work_dir: &Path) -> MosaicResult<Vec<BandRaster>> {
        let name = archive
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                MosaicError::Processing(format!("{} has no usable file stem", archive.display()))
            })?;
        let polarizations = safe::polarizations_from_name(name)?;
        let pol_list = polarizations
            .iter()
            .map(Polarization::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let orbit = work_dir.join(format!("{}_orb.dim", name));
        let denoised = work_dir.join(format!("{}_tnr.dim", name));
        let calibrated = work_dir.join(format!("{}_cal.dim", name));
        let terrain = work_dir.join(format!("{}_tc.dim", name));

        self.run_gpt("Apply-Orbit-File", &[], archive, &orbit)?;
        self.run_gpt("ThermalNoiseRemoval", &[], &orbit, &denoised)?;
        self.run_gpt(
            "Calibration",
            &[
                ("outputSigmaBand", "true".to_string()),
                ("selectedPolarisations", pol_list),
            ],
            &denoised,
            &calibrated,
        )?;
        self.run_gpt(
            "Terrain-Correction",
            &[
                ("demName", self.dem_name.clone()),
                ("imgResamplingMethod", "BILINEAR_INTERPOLATION".to_string()),
                ("pixelSpacingInMeter", format!("{}", self.pixel_spacing_m)),
                ("sourceBands", {
                    polarizations
                        .iter()
                        .map(|p| format!("Sigma0_{}", p.as_str()))
                        .collect::<Vec<_>>()
                        .join(",")
                }),
            ],
            &calibrated,
            &terrain,
        )?;

        // BEAM-DIMAP keeps one ENVI raster per band under <name>.data/
        let data_dir = work_dir.join(format!("{}_tc.data", name));
        let mut rasters = Vec::with_capacity(polarizations.len());
        for pol in &polarizations {
            let linear = data_dir.join(format!("Sigma0_{}.img", pol.as_str()));
            if !linear.is_file() {
                return Err(MosaicError::Processing(format!(
                    "terrain correction did not produce {}",
                    linear.display()
                )));
            }
            let db = work_dir.join(format!("{}_{}_db.tif", name, pol.as_str()));
            Self::to_decibels(&linear, &db)?;
            rasters.push(BandRaster {
                band: pol.as_str().to_string(),
                path: db,
                dtype: BandDtype::Float32,
            });
        }
        Ok(rasters)
    }
}

/// Sentinel-2 L2A band extraction. The archive is unpacked next to itself
/// and the 10 m JP2 rasters are located through the SAFE manifest.
pub struct S2BandReader;

impl SceneProcessor for S2BandReader {
    fn process(&self, archive: &Path, _work_dir: &Path) -> MosaicResult<Vec<BandRaster>> {
        let safe_dir = safe::extract_archive(archive)?;
        let bands = safe::discover_bands(&safe_dir)?;
        let rasters: Vec<BandRaster> = bands
            .named()
            .into_iter()
            .map(|(name, path)| BandRaster {
                band: name.to_string(),
                path: path.to_path_buf(),
                dtype: BandDtype::UInt16,
            })
            .collect();
        if rasters.is_empty() {
            return Err(MosaicError::Processing(format!(
                "no 10 m bands found in {}",
                safe_dir.display()
            )));
        }
        Ok(rasters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_raster_labels_follow_polarizations() {
        let pols = safe::polarizations_from_name("S1A_IW_GRDH_1SDV_20200103T170815").unwrap();
        let labels: Vec<String> = pols.iter().map(|p| p.as_str().to_string()).collect();
        assert_eq!(labels, vec!["VH", "VV"]);
    }

    #[test]
    fn test_gpt_failure_is_soft_processing_error() {
        let proc = SnapGptProcessor::new("/nonexistent/gpt");
        let dir = tempfile::tempdir().unwrap();
        let err = proc
            .process(&dir.path().join("S1A_IW_GRDH_1SDV_20200103T170815.zip"), dir.path())
            .unwrap_err();
        assert!(matches!(err, MosaicError::Processing(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_s2_reader_rejects_archive_without_bands() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("S2A_MSIL2A_20200103T101421.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        writer
            .start_file("S2A_MSIL2A_20200103T101421.SAFE/manifest.safe", options)
            .unwrap();
        writer
            .write_all(
                b"<xfdu:XFDU xmlns:xfdu=\"urn:ccsds:schema:xfdu:1\">\
                  <dataObjectSection>\
                  <dataObject><byteStream size=\"1\">\
                  <fileLocation href=\"./AUX_DATA/AUX_CAMSFO\"/>\
                  </byteStream></dataObject>\
                  </dataObjectSection></xfdu:XFDU>",
            )
            .unwrap();
        writer.finish().unwrap();

        let err = S2BandReader.process(&zip_path, dir.path()).unwrap_err();
        assert!(matches!(err, MosaicError::Processing(_)));
    }
}
