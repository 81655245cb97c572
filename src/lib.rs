//! sen12mosaic: paired Sentinel-1/Sentinel-2 time-series mosaicking
//!
//! This library builds cloud-aware, analysis-ready mosaic time series over an
//! area of interest: it plans contiguous acquisition windows, selects a minimal
//! covering scene set per window from the Copernicus Data Space catalog, and
//! merges the processed scenes into per-band GeoTIFF mosaics with matching
//! extents across both sensors.

pub mod config;
pub mod core;
pub mod events;
pub mod io;
pub mod pipeline;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BandDtype, CoverageResult, Footprint, GeoTransform, MosaicError, MosaicResult, Polarization,
    Product, RasterTile, SeriesPair, TimeInterval,
};

pub use config::{Credentials, RunConfig};
pub use core::{merge, plan_intervals, reconcile, select_coverage, RasterClipper, SeriesPlanner};
pub use events::{Event, EventKind, EventSink, LogSink};
pub use io::{CopernicusCatalog, ProductCatalog, S2BandReader, SnapGptProcessor};
pub use pipeline::{MosaicPipeline, RunSummary};
