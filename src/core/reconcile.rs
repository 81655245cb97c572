//! Alignment of the two per-interval mosaics onto a common pixel grid.
//!
//! The optical and radar mosaics are produced by independent pipelines
//! whose resampling and terrain correction drift the extents apart by a
//! few pixels. Downstream consumers expect one width/height/transform per
//! interval, so both mosaics are re-clipped to the intersection of their
//! bounding boxes.

use crate::core::clip::{clip_tile, intersect_bounds, window_for_bounds, Snap};
use crate::core::merge::resample_bilinear;
use crate::types::{MosaicError, MosaicResult, RasterTile};

const RESOLUTION_TOLERANCE: f64 = 1e-9;

fn same_resolution(a: &RasterTile, b: &RasterTile) -> bool {
    let (apw, aph) = a.resolution();
    let (bpw, bph) = b.resolution();
    (apw - bpw).abs() <= RESOLUTION_TOLERANCE && (aph - bph).abs() <= RESOLUTION_TOLERANCE
}

/// Clip two mosaics to their common intersecting grid.
///
/// The first mosaic's grid is the reference: when resolutions differ, the
/// second is resampled onto it (bilinear). Fails with `IncompatibleGrid`
/// when the grids cannot be aligned and with `EmptyIntersection` when the
/// extents do not overlap at all.
pub fn reconcile(a: &RasterTile, b: &RasterTile) -> MosaicResult<(RasterTile, RasterTile)> {
    if a.projection != b.projection {
        return Err(MosaicError::IncompatibleGrid(
            "mosaics must share a CRS before extent reconciliation".to_string(),
        ));
    }

    let b_aligned;
    let b = if same_resolution(a, b) {
        b
    } else {
        let (pw, ph) = a.resolution();
        b_aligned = resample_bilinear(b, pw, ph).map_err(|e| {
            MosaicError::IncompatibleGrid(format!(
                "resolutions differ and resampling failed: {}",
                e
            ))
        })?;
        &b_aligned
    };

    let common = intersect_bounds(a.extent(), b.extent()).ok_or_else(|| {
        MosaicError::EmptyIntersection("mosaic extents do not overlap".to_string())
    })?;

    let mut win_a = window_for_bounds(
        &a.transform,
        (a.width(), a.height()),
        common,
        Snap::Inner,
    )?;
    let mut win_b = window_for_bounds(
        &b.transform,
        (b.width(), b.height()),
        common,
        Snap::Inner,
    )?;

    // Grid snapping can leave the two windows one pixel apart; truncate
    // both to the shared size so the outputs are pixel-identical in shape.
    let width = win_a.width.min(win_b.width);
    let height = win_a.height.min(win_b.height);
    win_a.width = width;
    win_a.height = height;
    win_b.width = width;
    win_b.height = height;

    log::debug!(
        "Reconciled mosaics to common {}x{} window",
        width,
        height
    );

    Ok((clip_tile(a, &win_a), clip_tile(b, &win_b)))
}
