//! Clipping of rasters to the area of interest.
//!
//! Rasters entering a mosaic are first normalized to WGS84 (see
//! `io::raster::warp_to_wgs84`), then cut down to the pixel window
//! covering the intersection of the AOI bounding box with the raster
//! extent. Windows use all-touched semantics: any pixel touched by the
//! AOI boundary is kept, over-including rather than cropping tight.

use crate::io::raster;
use crate::types::{BandDtype, Footprint, GeoTransform, MosaicError, MosaicResult, RasterTile};
use ndarray::s;
use std::path::Path;

/// A rectangular pixel window inside a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

/// How geographic bounds are snapped to the pixel grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snap {
    /// Expand outward: every pixel touched by the bounds is included
    AllTouched,
    /// Shrink inward: only pixels fully inside the bounds are included
    Inner,
}

/// Pixel window of `bounds` (min_x, min_y, max_x, max_y) inside a
/// north-up raster of `size` (width, height).
pub fn window_for_bounds(
    transform: &GeoTransform,
    size: (usize, usize),
    bounds: (f64, f64, f64, f64),
    snap: Snap,
) -> MosaicResult<PixelWindow> {
    if !transform.is_north_up() {
        return Err(MosaicError::IncompatibleGrid(
            "rotated rasters are not supported".to_string(),
        ));
    }
    let (minx, miny, maxx, maxy) = bounds;
    let (c0, _) = transform.geo_to_pixel(minx, maxy);
    let (c1, _) = transform.geo_to_pixel(maxx, maxy);
    let (_, r0) = transform.geo_to_pixel(minx, maxy);
    let (_, r1) = transform.geo_to_pixel(minx, miny);

    let (col_start, col_end, row_start, row_end) = match snap {
        Snap::AllTouched => (c0.floor(), c1.ceil(), r0.floor(), r1.ceil()),
        Snap::Inner => (c0.ceil(), c1.floor(), r0.ceil(), r1.floor()),
    };

    let col_start = col_start.max(0.0) as usize;
    let row_start = row_start.max(0.0) as usize;
    let col_end = (col_end.max(0.0) as usize).min(size.0);
    let row_end = (row_end.max(0.0) as usize).min(size.1);

    if col_start >= col_end || row_start >= row_end {
        return Err(MosaicError::EmptyIntersection(format!(
            "bounds ({:.6}, {:.6}, {:.6}, {:.6}) map to an empty pixel window",
            minx, miny, maxx, maxy
        )));
    }

    Ok(PixelWindow {
        col_off: col_start,
        row_off: row_start,
        width: col_end - col_start,
        height: row_end - row_start,
    })
}

/// Intersection of two bounding boxes, or None when they do not overlap
pub fn intersect_bounds(
    a: (f64, f64, f64, f64),
    b: (f64, f64, f64, f64),
) -> Option<(f64, f64, f64, f64)> {
    let minx = a.0.max(b.0);
    let miny = a.1.max(b.1);
    let maxx = a.2.min(b.2);
    let maxy = a.3.min(b.3);
    if minx < maxx && miny < maxy {
        Some((minx, miny, maxx, maxy))
    } else {
        None
    }
}

/// Extract a pixel window from an in-memory tile
pub fn clip_tile(tile: &RasterTile, window: &PixelWindow) -> RasterTile {
    let data = tile
        .data
        .slice(s![
            ..,
            window.row_off..window.row_off + window.height,
            window.col_off..window.col_off + window.width
        ])
        .to_owned();
    RasterTile {
        data,
        transform: tile.transform.for_window(window.col_off, window.row_off),
        projection: tile.projection.clone(),
        nodata: tile.nodata,
        dtype: tile.dtype,
    }
}

/// Clips raster files to a fixed AOI footprint
pub struct RasterClipper {
    aoi: Footprint,
}

impl RasterClipper {
    pub fn new(aoi: Footprint) -> Self {
        RasterClipper { aoi }
    }

    /// Clip a WGS84-normalized raster file to the AOI bounding box.
    ///
    /// Fails with `EmptyIntersection` when the AOI and the raster extent
    /// do not overlap.
    pub fn clip_file(&self, path: &Path, dtype: BandDtype) -> MosaicResult<RasterTile> {
        let (transform, size, _projection) = raster::grid_of(path)?;
        let aoi_bounds = self.aoi.bounds().ok_or_else(|| {
            MosaicError::Geometry("AOI footprint has no bounding box".to_string())
        })?;
        let extent = transform.extent(size.0, size.1);
        let bounds = intersect_bounds(aoi_bounds, extent).ok_or_else(|| {
            MosaicError::EmptyIntersection(format!(
                "AOI does not overlap raster extent of {}",
                path.display()
            ))
        })?;
        let window = window_for_bounds(&transform, size, bounds, Snap::AllTouched)?;
        log::debug!(
            "Clipping {} to window {}x{} at ({}, {})",
            path.display(),
            window.width,
            window.height,
            window.col_off,
            window.row_off
        );
        raster::read_window(path, &window, dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn transform() -> GeoTransform {
        GeoTransform {
            top_left_x: 0.0,
            pixel_width: 1.0,
            rotation_x: 0.0,
            top_left_y: 100.0,
            rotation_y: 0.0,
            pixel_height: -1.0,
        }
    }

    #[test]
    fn test_all_touched_window_expands_outward() {
        // Bounds cut through pixel interiors on every side
        let w = window_for_bounds(
            &transform(),
            (100, 100),
            (10.3, 79.5, 20.7, 90.2),
            Snap::AllTouched,
        )
        .unwrap();
        assert_eq!(w.col_off, 10);
        assert_eq!(w.row_off, 9);
        assert_eq!(w.width, 11);
        assert_eq!(w.height, 12);
    }

    #[test]
    fn test_inner_window_shrinks_inward() {
        let w = window_for_bounds(
            &transform(),
            (100, 100),
            (10.3, 79.5, 20.7, 90.2),
            Snap::Inner,
        )
        .unwrap();
        assert_eq!(w.col_off, 11);
        assert_eq!(w.row_off, 10);
        assert_eq!(w.width, 9);
        assert_eq!(w.height, 10);
    }

    #[test]
    fn test_window_clamped_to_raster_edges() {
        let w = window_for_bounds(
            &transform(),
            (50, 50),
            (-10.0, 40.0, 200.0, 200.0),
            Snap::AllTouched,
        )
        .unwrap();
        assert_eq!(w.col_off, 0);
        assert_eq!(w.row_off, 0);
        assert_eq!(w.width, 50);
        assert_eq!(w.height, 50);
    }

    #[test]
    fn test_disjoint_bounds_yield_empty_intersection_error() {
        let result = window_for_bounds(
            &transform(),
            (50, 50),
            (500.0, 500.0, 510.0, 510.0),
            Snap::AllTouched,
        );
        assert!(matches!(result, Err(MosaicError::EmptyIntersection(_))));
        assert!(intersect_bounds((0.0, 0.0, 1.0, 1.0), (2.0, 2.0, 3.0, 3.0)).is_none());
    }

    #[test]
    fn test_clip_tile_shifts_georeference() {
        let data = Array3::from_shape_fn((1, 10, 10), |(_, r, c)| (r * 10 + c) as f32);
        let tile = RasterTile::new(
            data,
            transform(),
            "WGS84".to_string(),
            f32::NAN,
            BandDtype::Float32,
        );
        let window = PixelWindow {
            col_off: 2,
            row_off: 3,
            width: 4,
            height: 5,
        };
        let clipped = clip_tile(&tile, &window);
        assert_eq!(clipped.width(), 4);
        assert_eq!(clipped.height(), 5);
        assert_eq!(clipped.transform.top_left_x, 2.0);
        assert_eq!(clipped.transform.top_left_y, 97.0);
        assert_eq!(clipped.data[[0, 0, 0]], 32.0);
    }
}
