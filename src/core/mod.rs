//! Coverage selection and mosaic assembly

pub mod clip;
pub mod coverage;
pub mod geometry;
pub mod intervals;
pub mod merge;
pub mod reconcile;
pub mod series;

// Re-export main types
pub use clip::{PixelWindow, RasterClipper, Snap};
pub use coverage::select_coverage;
pub use intervals::plan_intervals;
pub use merge::{merge, resample_bilinear};
pub use reconcile::reconcile;
pub use series::SeriesPlanner;
