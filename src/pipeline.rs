//! End-to-end mosaic pipeline: interval planning, catalog queries,
//! coverage selection, scene processing and per-band mosaic output.
//!
//! A run writes one directory per accepted interval:
//!
//! ```text
//! <OUTPUT_FOLDER>/<start>_<end>/
//!     S2/                      downloaded + intermediate Sentinel-2 data
//!     S1/                      downloaded + intermediate Sentinel-1 data
//!     Mosaic_red_<label>.tif   final per-band mosaics, pairwise aligned
//!     Mosaic_VV_<label>.tif
//!     ...
//! ```
//!
//! Scene-level failures are soft: a product that cannot be downloaded or
//! processed is reported and skipped, and the interval's mosaics are built
//! from the remaining scenes. Only configuration and date-range errors
//! abort the run.

use crate::config::RunConfig;
use crate::core::{merge, plan_intervals, reconcile, RasterClipper, SeriesPlanner};
use crate::events::{Event, EventKind, EventSink};
use crate::io::catalog::ProductCatalog;
use crate::io::processor::SceneProcessor;
use crate::io::raster;
use crate::types::{CoverageResult, Footprint, MosaicResult, Product, RasterTile, SeriesPair};
use std::collections::BTreeMap;
use std::path::Path;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// What a finished run did, for operators and tests
#[derive(Debug, Default)]
pub struct RunSummary {
    pub planned_intervals: usize,
    pub accepted_intervals: usize,
    pub skipped_intervals: usize,
    pub mosaics_written: usize,
    pub failed_products: Vec<String>,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} intervals accepted ({} skipped), {} mosaics written, {} product failures",
            self.accepted_intervals,
            self.planned_intervals,
            self.skipped_intervals,
            self.mosaics_written,
            self.failed_products.len()
        )
    }
}

#[derive(Debug, Default)]
struct IntervalOutcome {
    mosaics_written: usize,
    failed_products: Vec<String>,
}

/// Drives one configured run from catalog query to mosaic files
pub struct MosaicPipeline<'a> {
    config: &'a RunConfig,
    catalog: &'a dyn ProductCatalog,
    s2_processor: &'a dyn SceneProcessor,
    s1_processor: &'a dyn SceneProcessor,
    sink: &'a dyn EventSink,
}

impl<'a> MosaicPipeline<'a> {
    pub fn new(
        config: &'a RunConfig,
        catalog: &'a dyn ProductCatalog,
        s2_processor: &'a dyn SceneProcessor,
        s1_processor: &'a dyn SceneProcessor,
        sink: &'a dyn EventSink,
    ) -> Self {
        MosaicPipeline {
            config,
            catalog,
            s2_processor,
            s1_processor,
            sink,
        }
    }

    pub fn run(&self) -> MosaicResult<RunSummary> {
        let aoi = self.config.load_aoi()?;
        let (min_date, max_date) = self.config.date_range()?;
        let intervals = plan_intervals(min_date, max_date, self.config.date.ts_interval)?;
        log::info!(
            "Planning a time series of {} intervals between {} and {}",
            intervals.len(),
            min_date.format("%Y-%m-%d"),
            max_date.format("%Y-%m-%d")
        );

        let s2_catalog =
            self.catalog
                .query(&aoi, (min_date, max_date), &self.config.s2_filters())?;
        let s1_catalog =
            self.catalog
                .query(&aoi, (min_date, max_date), &self.config.s1_filters())?;
        log::info!(
            "Catalog returned {} S2 and {} S1 products",
            s2_catalog.len(),
            s1_catalog.len()
        );

        let planner = SeriesPlanner::new(&aoi, self.config.min_coverage, self.sink);
        let pairs = planner.plan(&intervals, &s2_catalog, &s1_catalog);

        #[cfg(feature = "parallel")]
        let outcomes: Vec<IntervalOutcome> = pairs
            .par_iter()
            .map(|pair| self.process_interval(&aoi, pair))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<IntervalOutcome> = pairs
            .iter()
            .map(|pair| self.process_interval(&aoi, pair))
            .collect();

        let mut summary = RunSummary {
            planned_intervals: intervals.len(),
            accepted_intervals: pairs.len(),
            skipped_intervals: intervals.len() - pairs.len(),
            ..RunSummary::default()
        };
        for outcome in outcomes {
            summary.mosaics_written += outcome.mosaics_written;
            summary.failed_products.extend(outcome.failed_products);
        }
        log::info!("{}", summary);
        Ok(summary)
    }

    /// Processes one accepted interval end to end. Never fails the run:
    /// every error inside the interval is reported and absorbed.
    fn process_interval(&self, aoi: &Footprint, pair: &SeriesPair) -> IntervalOutcome {
        let label = pair.interval.label();
        let interval_dir = self.config.output_folder.join(&label);
        let mut outcome = IntervalOutcome::default();

        let clipper = RasterClipper::new(aoi.clone());
        let s2_tiles = self.collect_band_tiles(
            &pair.s2,
            &interval_dir.join("S2"),
            self.s2_processor,
            &clipper,
            &label,
            &mut outcome,
        );
        let s1_tiles = self.collect_band_tiles(
            &pair.s1,
            &interval_dir.join("S1"),
            self.s1_processor,
            &clipper,
            &label,
            &mut outcome,
        );

        let s2_merged = self.merge_bands(s2_tiles, &label, &mut outcome);
        let s1_merged = self.merge_bands(s1_tiles, &label, &mut outcome);

        // Pairwise extent reconciliation: every written band shares the
        // grid of the common S2/S1 intersection.
        let s2_ref = s2_merged.values().next().cloned();
        let s1_ref = s1_merged.values().next().cloned();

        for (band, tile) in &s2_merged {
            let aligned = match &s1_ref {
                Some(other) => reconcile(tile, other).map(|(a, _)| a),
                None => Ok(tile.clone()),
            };
            self.write_mosaic(aligned, band, &label, &interval_dir, &mut outcome);
        }
        for (band, tile) in &s1_merged {
            let aligned = match &s2_ref {
                Some(other) => reconcile(other, tile).map(|(_, b)| b),
                None => Ok(tile.clone()),
            };
            self.write_mosaic(aligned, band, &label, &interval_dir, &mut outcome);
        }
        outcome
    }

    /// Downloads and processes every selected product of one source,
    /// returning clipped WGS84 tiles grouped per band in selection order.
    fn collect_band_tiles(
        &self,
        selection: &CoverageResult,
        source_dir: &Path,
        processor: &dyn SceneProcessor,
        clipper: &RasterClipper,
        label: &str,
        outcome: &mut IntervalOutcome,
    ) -> BTreeMap<String, Vec<RasterTile>> {
        let mut tiles: BTreeMap<String, Vec<RasterTile>> = BTreeMap::new();
        if let Err(e) = std::fs::create_dir_all(source_dir) {
            self.sink.emit(
                Event::new(
                    EventKind::ProductFailed,
                    format!("cannot create {}: {}", source_dir.display(), e),
                )
                .with_interval(label),
            );
            return tiles;
        }

        for product in &selection.products {
            match self.process_product(product, source_dir, processor, clipper) {
                Ok(band_tiles) => {
                    for (band, tile) in band_tiles {
                        tiles.entry(band).or_default().push(tile);
                    }
                }
                Err(e) => {
                    outcome.failed_products.push(product.title.clone());
                    self.sink.emit(
                        Event::new(EventKind::ProductFailed, e.to_string())
                            .with_interval(label)
                            .with_product(&product.title),
                    );
                }
            }
        }
        tiles
    }

    fn process_product(
        &self,
        product: &Product,
        source_dir: &Path,
        processor: &dyn SceneProcessor,
        clipper: &RasterClipper,
    ) -> MosaicResult<Vec<(String, RasterTile)>> {
        let archive = self.catalog.download(product, source_dir)?;
        let rasters = processor.process(&archive, source_dir)?;

        let mut out = Vec::with_capacity(rasters.len());
        for band_raster in rasters {
            let warped = source_dir.join(format!("{}_{}_4326.tif", product.title, band_raster.band));
            raster::warp_to_wgs84(&band_raster.path, &warped)?;
            let tile = clipper.clip_file(&warped, band_raster.dtype)?;
            out.push((band_raster.band, tile));
        }
        Ok(out)
    }

    fn merge_bands(
        &self,
        tiles: BTreeMap<String, Vec<RasterTile>>,
        label: &str,
        outcome: &mut IntervalOutcome,
    ) -> BTreeMap<String, RasterTile> {
        let mut merged = BTreeMap::new();
        for (band, band_tiles) in tiles {
            match merge(&band_tiles) {
                Ok(tile) => {
                    merged.insert(band, tile);
                }
                Err(e) => {
                    outcome.failed_products.push(format!("{} band {}", label, band));
                    self.sink.emit(
                        Event::new(EventKind::ProductFailed, format!("band {}: {}", band, e))
                            .with_interval(label),
                    );
                }
            }
        }
        merged
    }

    fn write_mosaic(
        &self,
        tile: MosaicResult<RasterTile>,
        band: &str,
        label: &str,
        interval_dir: &Path,
        outcome: &mut IntervalOutcome,
    ) {
        let path = interval_dir.join(format!("Mosaic_{}_{}.tif", band, label));
        let result = tile.and_then(|t| raster::write_tile(&t, &path));
        match result {
            Ok(()) => {
                outcome.mosaics_written += 1;
                self.sink.emit(
                    Event::new(EventKind::MosaicWritten, path.display().to_string())
                        .with_interval(label),
                );
            }
            Err(e) => {
                outcome.failed_products.push(format!("{} band {}", label, band));
                self.sink.emit(
                    Event::new(EventKind::ProductFailed, format!("band {}: {}", band, e))
                        .with_interval(label),
                );
            }
        }
    }
}
