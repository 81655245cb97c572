//! Pure polygon set operations on footprints.
//!
//! Areas that feed ranking decisions are rounded to two decimal places in
//! area units so that floating-point noise cannot flip the selection order
//! between otherwise identical candidates.

use crate::types::Footprint;
use geo::{Area, BooleanOps};

/// Round an area to the fixed comparison precision (2 decimal places)
pub fn round_area(area: f64) -> f64 {
    (area * 100.0).round() / 100.0
}

/// Raw (unrounded) area of a footprint
pub fn area(footprint: &Footprint) -> f64 {
    footprint.as_multi_polygon().unsigned_area()
}

/// Intersection of two footprints; empty geometries are valid results
pub fn intersection(a: &Footprint, b: &Footprint) -> Footprint {
    Footprint::from_multi_polygon(a.as_multi_polygon().intersection(b.as_multi_polygon()))
}

/// Rounded area of the intersection of two footprints
pub fn intersection_area(a: &Footprint, b: &Footprint) -> f64 {
    round_area(area(&intersection(a, b)))
}

/// Part of `a` not covered by `b`; empty when `b` covers `a` entirely
pub fn difference(a: &Footprint, b: &Footprint) -> Footprint {
    Footprint::from_multi_polygon(a.as_multi_polygon().difference(b.as_multi_polygon()))
}
