//! GeoTIFF reading/writing and WGS84 normalization.
//!
//! Every raster entering a mosaic goes through `warp_to_wgs84` first so
//! that clipping and merging always operate on one shared geographic
//! grid direction.

use crate::core::clip::PixelWindow;
use crate::types::{
    BandDtype, GeoTransform, MosaicError, MosaicResult, Pixel, RasterTile,
};
use gdal::raster::Buffer;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, Array3};
use std::path::Path;

const WGS84_PROJ4: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Georeference, size (width, height) and projection WKT of a raster file
pub fn grid_of(path: &Path) -> MosaicResult<(GeoTransform, (usize, usize), String)> {
    let dataset = Dataset::open(path)?;
    let transform = GeoTransform::from_gdal(&dataset.geo_transform()?);
    let size = dataset.raster_size();
    Ok((transform, size, dataset.projection()))
}

fn band_nodata(dataset: &Dataset, dtype: BandDtype) -> MosaicResult<Pixel> {
    let band = dataset.rasterband(1)?;
    Ok(band
        .no_data_value()
        .map(|v| v as Pixel)
        .unwrap_or_else(|| dtype.default_nodata()))
}

/// Read one pixel window of every band into a tile
pub fn read_window(
    path: &Path,
    window: &PixelWindow,
    dtype: BandDtype,
) -> MosaicResult<RasterTile> {
    let dataset = Dataset::open(path)?;
    let transform = GeoTransform::from_gdal(&dataset.geo_transform()?);
    let bands = dataset.raster_count() as usize;
    let (w, h) = (window.width, window.height);

    let mut data: Array3<Pixel> = Array3::zeros((bands, h, w));
    for b in 0..bands {
        let band = dataset.rasterband(b as isize + 1)?;
        let buffer = band.read_as::<f32>(
            (window.col_off as isize, window.row_off as isize),
            (w, h),
            (w, h),
            None,
        )?;
        let plane = Array2::from_shape_vec((h, w), buffer.data)
            .map_err(|e| MosaicError::Processing(format!("failed to reshape band data: {}", e)))?;
        data.index_axis_mut(ndarray::Axis(0), b).assign(&plane);
    }

    Ok(RasterTile {
        data,
        transform: transform.for_window(window.col_off, window.row_off),
        projection: dataset.projection(),
        nodata: band_nodata(&dataset, dtype)?,
        dtype,
    })
}

/// Read a whole raster file into a tile
pub fn read_tile(path: &Path, dtype: BandDtype) -> MosaicResult<RasterTile> {
    let (_, (width, height), _) = grid_of(path)?;
    read_window(
        path,
        &PixelWindow {
            col_off: 0,
            row_off: 0,
            width,
            height,
        },
        dtype,
    )
}

/// Write a tile as a GeoTIFF, honoring its declared on-disk sample type
pub fn write_tile(tile: &RasterTile, path: &Path) -> MosaicResult<()> {
    log::debug!(
        "Writing {}x{} ({} bands) GeoTIFF: {}",
        tile.width(),
        tile.height(),
        tile.bands(),
        path.display()
    );
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (bands, height, width) = tile.data.dim();

    match tile.dtype {
        BandDtype::Float32 => {
            let mut dataset = driver.create_with_band_type::<f32, _>(
                path,
                width as isize,
                height as isize,
                bands as isize,
            )?;
            dataset.set_geo_transform(&tile.transform.to_gdal())?;
            dataset.set_projection(&tile.projection)?;
            for b in 0..bands {
                let flat: Vec<f32> = tile.data.index_axis(ndarray::Axis(0), b).iter().cloned().collect();
                let buffer = Buffer::new((width, height), flat);
                let mut band = dataset.rasterband(b as isize + 1)?;
                band.write((0, 0), (width, height), &buffer)?;
                band.set_no_data_value(Some(tile.nodata as f64))?;
            }
        }
        BandDtype::UInt16 => {
            let mut dataset = driver.create_with_band_type::<u16, _>(
                path,
                width as isize,
                height as isize,
                bands as isize,
            )?;
            dataset.set_geo_transform(&tile.transform.to_gdal())?;
            dataset.set_projection(&tile.projection)?;
            let nodata = tile.nodata.round().clamp(0.0, u16::MAX as f32);
            for b in 0..bands {
                let flat: Vec<u16> = tile
                    .data
                    .index_axis(ndarray::Axis(0), b)
                    .iter()
                    .map(|&v| {
                        if tile.is_nodata(v) {
                            nodata as u16
                        } else {
                            v.round().clamp(0.0, u16::MAX as f32) as u16
                        }
                    })
                    .collect();
                let buffer = Buffer::new((width, height), flat);
                let mut band = dataset.rasterband(b as isize + 1)?;
                band.write((0, 0), (width, height), &buffer)?;
                band.set_no_data_value(Some(nodata as f64))?;
            }
        }
    }
    Ok(())
}

/// True when the file already carries a geographic WGS84 CRS
fn is_wgs84(dataset: &Dataset) -> bool {
    dataset
        .spatial_ref()
        .and_then(|sr| sr.auth_code())
        .map(|code| code == 4326)
        .unwrap_or(false)
}

/// Reproject a raster file to EPSG:4326 with bilinear resampling.
///
/// The output grid keeps the source pixel count; its resolution is
/// derived from the reprojected corner/edge footprint, matching the
/// conventional default-transform behaviour. Files already in WGS84 are
/// copied through unchanged.
pub fn warp_to_wgs84(src_path: &Path, dst_path: &Path) -> MosaicResult<()> {
    let src = Dataset::open(src_path)?;
    if is_wgs84(&src) {
        std::fs::copy(src_path, dst_path)?;
        return Ok(());
    }

    let src_gt = GeoTransform::from_gdal(&src.geo_transform()?);
    if !src_gt.is_north_up() {
        return Err(MosaicError::IncompatibleGrid(
            "rotated source rasters are not supported".to_string(),
        ));
    }
    let (width, height) = src.raster_size();
    let bands = src.raster_count() as usize;
    let src_sr = src.spatial_ref()?;
    let wgs84 = SpatialRef::from_proj4(WGS84_PROJ4)?;

    // Sample corners and edge midpoints to bound the reprojected extent
    let forward = CoordTransform::new(&src_sr, &wgs84)?;
    let (minx, miny, maxx, maxy) = src_gt.extent(width, height);
    let midx = (minx + maxx) / 2.0;
    let midy = (miny + maxy) / 2.0;
    let mut xs = [minx, midx, maxx, minx, maxx, minx, midx, maxx];
    let mut ys = [maxy, maxy, maxy, midy, midy, miny, miny, miny];
    let mut zs = [0.0; 8];
    forward.transform_coords(&mut xs, &mut ys, &mut zs)?;
    let (lon_min, lon_max) = xs
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let (lat_min, lat_max) = ys
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let out_gt = GeoTransform {
        top_left_x: lon_min,
        pixel_width: (lon_max - lon_min) / width as f64,
        rotation_x: 0.0,
        top_left_y: lat_max,
        rotation_y: 0.0,
        pixel_height: -(lat_max - lat_min) / height as f64,
    };

    log::info!(
        "Reprojecting {} to WGS84 ({}x{} px)",
        src_path.display(),
        width,
        height
    );

    let inverse = CoordTransform::new(&wgs84, &src_sr)?;
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dst = driver.create_with_band_type::<f32, _>(
        dst_path,
        width as isize,
        height as isize,
        bands as isize,
    )?;
    dst.set_geo_transform(&out_gt.to_gdal())?;
    dst.set_projection(&SpatialRef::from_epsg(4326)?.to_wkt()?)?;

    for b in 0..bands {
        let src_band = src.rasterband(b as isize + 1)?;
        let nodata = src_band
            .no_data_value()
            .map(|v| v as Pixel)
            .unwrap_or(f32::NAN);
        let buffer = src_band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
        let source = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| MosaicError::Processing(format!("failed to reshape band data: {}", e)))?;

        let mut out: Array2<Pixel> = Array2::from_elem((height, width), nodata);
        let mut zrow = vec![0.0f64; width];
        for row in 0..height {
            // Batch-transform one output row of pixel centers back to the
            // source CRS, then bilinear-sample the source grid
            let mut lons: Vec<f64> = (0..width)
                .map(|col| out_gt.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5).0)
                .collect();
            let mut lats: Vec<f64> =
                vec![out_gt.pixel_to_geo(0.0, row as f64 + 0.5).1; width];
            inverse.transform_coords(&mut lons, &mut lats, &mut zrow)?;
            for col in 0..width {
                let (sc, sr) = src_gt.geo_to_pixel(lons[col], lats[col]);
                let (sc, sr) = (sc - 0.5, sr - 0.5);
                if sc < 0.0 || sr < 0.0 || sc > (width - 1) as f64 || sr > (height - 1) as f64 {
                    continue;
                }
                let c1 = sc.floor() as usize;
                let r1 = sr.floor() as usize;
                let c2 = (c1 + 1).min(width - 1);
                let r2 = (r1 + 1).min(height - 1);
                let dx = (sc - c1 as f64) as Pixel;
                let dy = (sr - r1 as f64) as Pixel;
                let v11 = source[[r1, c1]];
                let v21 = source[[r1, c2]];
                let v12 = source[[r2, c1]];
                let v22 = source[[r2, c2]];
                let invalid = |v: Pixel| {
                    if nodata.is_nan() {
                        v.is_nan()
                    } else {
                        v == nodata
                    }
                };
                if [v11, v21, v12, v22].iter().any(|&v| invalid(v)) {
                    // Nearest neighbour at the no-data boundary
                    let nc = if dx < 0.5 { c1 } else { c2 };
                    let nr = if dy < 0.5 { r1 } else { r2 };
                    out[[row, col]] = source[[nr, nc]];
                } else {
                    out[[row, col]] = v11 * (1.0 - dx) * (1.0 - dy)
                        + v21 * dx * (1.0 - dy)
                        + v12 * (1.0 - dx) * dy
                        + v22 * dx * dy;
                }
            }
        }

        let flat: Vec<f32> = out.iter().cloned().collect();
        let out_buffer = Buffer::new((width, height), flat);
        let mut dst_band = dst.rasterband(b as isize + 1)?;
        dst_band.write((0, 0), (width, height), &out_buffer)?;
        dst_band.set_no_data_value(Some(nodata as f64))?;
    }

    Ok(())
}
