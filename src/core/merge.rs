//! Merging of clipped, same-source rasters into one mosaic per interval.
//!
//! Tiles arrive in the coverage selector's priority order and that order
//! is the paint order: a pixel keeps the value of the first tile that has
//! valid data there. Later tiles only fill pixels still at no-data.

use crate::types::{GeoTransform, MosaicError, MosaicResult, Pixel, RasterTile};
use ndarray::{Array2, Array3};

const RESOLUTION_TOLERANCE: f64 = 1e-9;

/// Merge an ordered sequence of tiles into a single mosaic.
///
/// All tiles must share the coordinate reference system; tiles with a
/// deviating pixel resolution are resampled (bilinear) onto the first
/// tile's resolution beforehand. The output extent is the union bounding
/// box of the inputs, snapped to the first tile's grid. A single input
/// tile short-circuits to a plain copy.
pub fn merge(tiles: &[RasterTile]) -> MosaicResult<RasterTile> {
    let first = tiles
        .first()
        .ok_or_else(|| MosaicError::Processing("cannot merge zero tiles".to_string()))?;

    if tiles.len() == 1 {
        return Ok(first.clone());
    }

    for tile in &tiles[1..] {
        if tile.projection != first.projection {
            return Err(MosaicError::IncompatibleGrid(
                "tiles entering one mosaic must share a CRS".to_string(),
            ));
        }
        if tile.bands() != first.bands() {
            return Err(MosaicError::IncompatibleGrid(format!(
                "band count mismatch: {} vs {}",
                tile.bands(),
                first.bands()
            )));
        }
    }

    let (pw, ph) = first.resolution();
    let resampled: Vec<RasterTile> = tiles
        .iter()
        .map(|tile| {
            let (tpw, tph) = tile.resolution();
            if (tpw - pw).abs() > RESOLUTION_TOLERANCE || (tph - ph).abs() > RESOLUTION_TOLERANCE
            {
                log::debug!(
                    "Resampling tile from ({:.6}, {:.6}) to ({:.6}, {:.6})",
                    tpw,
                    tph,
                    pw,
                    ph
                );
                resample_bilinear(tile, pw, ph)
            } else {
                Ok(tile.clone())
            }
        })
        .collect::<MosaicResult<_>>()?;

    // Union extent snapped to the first tile's grid
    let mut union = resampled[0].extent();
    for tile in &resampled[1..] {
        let e = tile.extent();
        union = (
            union.0.min(e.0),
            union.1.min(e.1),
            union.2.max(e.2),
            union.3.max(e.3),
        );
    }
    let origin_col = ((union.0 - first.transform.top_left_x) / pw).floor();
    let origin_row = ((union.3 - first.transform.top_left_y) / ph).floor();
    let out_transform = GeoTransform {
        top_left_x: first.transform.top_left_x + origin_col * pw,
        top_left_y: first.transform.top_left_y + origin_row * ph,
        ..first.transform
    };
    let out_width = ((union.2 - out_transform.top_left_x) / pw).ceil() as usize;
    let out_height = ((union.1 - out_transform.top_left_y) / ph).ceil() as usize;

    let nodata = first.nodata;
    let bands = first.bands();
    let mut out: Array3<Pixel> = Array3::from_elem((bands, out_height, out_width), nodata);
    let mut painted: Array2<bool> = Array2::from_elem((out_height, out_width), false);

    for tile in &resampled {
        let col_off =
            ((tile.transform.top_left_x - out_transform.top_left_x) / pw).round() as isize;
        let row_off =
            ((tile.transform.top_left_y - out_transform.top_left_y) / ph).round() as isize;

        for row in 0..tile.height() {
            let out_row = row_off + row as isize;
            if out_row < 0 || out_row as usize >= out_height {
                continue;
            }
            for col in 0..tile.width() {
                let out_col = col_off + col as isize;
                if out_col < 0 || out_col as usize >= out_width {
                    continue;
                }
                let (out_row, out_col) = (out_row as usize, out_col as usize);
                if painted[[out_row, out_col]] {
                    continue;
                }
                // A pixel counts as valid when every band has data
                let valid = (0..bands).all(|b| !tile.is_nodata(tile.data[[b, row, col]]));
                if !valid {
                    continue;
                }
                for b in 0..bands {
                    out[[b, out_row, out_col]] = tile.data[[b, row, col]];
                }
                painted[[out_row, out_col]] = true;
            }
        }
    }

    let coverage = painted.iter().filter(|&&p| p).count() as f64
        / (out_height * out_width).max(1) as f64;
    log::info!(
        "Merged {} tiles into {}x{} mosaic, {:.1}% valid",
        tiles.len(),
        out_width,
        out_height,
        coverage * 100.0
    );

    Ok(RasterTile {
        data: out,
        transform: out_transform,
        projection: first.projection.clone(),
        nodata,
        dtype: first.dtype,
    })
}

/// Resample a tile onto a new pixel resolution with bilinear interpolation,
/// preserving its geographic extent. No-data neighbourhoods fall back to
/// the nearest source pixel so markers do not bleed into valid data.
pub fn resample_bilinear(
    tile: &RasterTile,
    pixel_width: f64,
    pixel_height: f64,
) -> MosaicResult<RasterTile> {
    if pixel_width <= 0.0 || pixel_height >= 0.0 {
        return Err(MosaicError::IncompatibleGrid(format!(
            "invalid target resolution ({}, {})",
            pixel_width, pixel_height
        )));
    }
    let (minx, miny, maxx, maxy) = tile.extent();
    let out_width = ((maxx - minx) / pixel_width).ceil() as usize;
    let out_height = ((miny - maxy) / pixel_height).ceil() as usize;
    if out_width == 0 || out_height == 0 {
        return Err(MosaicError::IncompatibleGrid(
            "target resolution coarser than tile extent".to_string(),
        ));
    }
    let out_transform = GeoTransform {
        top_left_x: minx,
        pixel_width,
        rotation_x: 0.0,
        top_left_y: maxy,
        rotation_y: 0.0,
        pixel_height,
    };

    let bands = tile.bands();
    let (src_h, src_w) = (tile.height(), tile.width());
    let mut out: Array3<Pixel> = Array3::from_elem((bands, out_height, out_width), tile.nodata);

    for row in 0..out_height {
        for col in 0..out_width {
            let (x, y) = out_transform.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5);
            let (src_col, src_row) = tile.transform.geo_to_pixel(x, y);
            let src_col = src_col - 0.5;
            let src_row = src_row - 0.5;
            if src_col < 0.0
                || src_row < 0.0
                || src_col > (src_w - 1) as f64
                || src_row > (src_h - 1) as f64
            {
                continue;
            }
            let c1 = src_col.floor() as usize;
            let r1 = src_row.floor() as usize;
            let c2 = (c1 + 1).min(src_w - 1);
            let r2 = (r1 + 1).min(src_h - 1);
            let dx = (src_col - c1 as f64) as Pixel;
            let dy = (src_row - r1 as f64) as Pixel;

            for b in 0..bands {
                let v11 = tile.data[[b, r1, c1]];
                let v21 = tile.data[[b, r1, c2]];
                let v12 = tile.data[[b, r2, c1]];
                let v22 = tile.data[[b, r2, c2]];
                let any_nodata = [v11, v21, v12, v22]
                    .iter()
                    .any(|&v| tile.is_nodata(v));
                out[[b, row, col]] = if any_nodata {
                    // Nearest neighbour keeps the no-data boundary crisp
                    let nc = if dx < 0.5 { c1 } else { c2 };
                    let nr = if dy < 0.5 { r1 } else { r2 };
                    tile.data[[b, nr, nc]]
                } else {
                    v11 * (1.0 - dx) * (1.0 - dy)
                        + v21 * dx * (1.0 - dy)
                        + v12 * (1.0 - dx) * dy
                        + v22 * dx * dy
                };
            }
        }
    }

    Ok(RasterTile {
        data: out,
        transform: out_transform,
        projection: tile.projection.clone(),
        nodata: tile.nodata,
        dtype: tile.dtype,
    })
}
