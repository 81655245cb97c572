//! Input/output: catalog access, SAFE archives, raster files and scene
//! processing backends.

pub mod catalog;
pub mod processor;
pub mod raster;
pub mod safe;

pub use catalog::{CopernicusCatalog, ProductCatalog, SourceFilters};
pub use processor::{BandRaster, S2BandReader, SceneProcessor, SnapGptProcessor};
