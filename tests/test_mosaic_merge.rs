use ndarray::Array3;
use sen12mosaic::{merge, reconcile, BandDtype, GeoTransform, MosaicError, RasterTile};

const WGS84: &str = "GEOGCS[\"WGS 84\"]";

fn tile_at(origin_x: f64, origin_y: f64, size: usize, value: f32) -> RasterTile {
    let transform = GeoTransform {
        top_left_x: origin_x,
        pixel_width: 1.0,
        rotation_x: 0.0,
        top_left_y: origin_y,
        rotation_y: 0.0,
        pixel_height: -1.0,
    };
    RasterTile::new(
        Array3::from_elem((1, size, size), value),
        transform,
        WGS84.to_string(),
        f32::NAN,
        BandDtype::Float32,
    )
}

#[test]
fn test_first_tile_wins_in_overlap() {
    let a = tile_at(0.0, 10.0, 4, 1.0);
    let b = tile_at(2.0, 10.0, 4, 2.0);

    let mosaic = merge(&[a, b]).unwrap();
    assert_eq!(mosaic.width(), 6);
    assert_eq!(mosaic.height(), 4);
    assert_eq!(mosaic.extent(), (0.0, 6.0, 6.0, 10.0));

    // Overlap columns 2..4 keep the first tile's values
    assert_eq!(mosaic.data[[0, 0, 3]], 1.0);
    assert_eq!(mosaic.data[[0, 0, 5]], 2.0);
    assert_eq!(mosaic.data[[0, 3, 0]], 1.0);
}

#[test]
fn test_order_reversal_flips_overlap_values() {
    let a = tile_at(0.0, 10.0, 4, 1.0);
    let b = tile_at(2.0, 10.0, 4, 2.0);

    let forward = merge(&[a.clone(), b.clone()]).unwrap();
    let reversed = merge(&[b, a]).unwrap();

    assert_eq!(forward.extent(), reversed.extent());
    assert_eq!(forward.data[[0, 0, 3]], 1.0);
    assert_eq!(reversed.data[[0, 0, 3]], 2.0);
}

#[test]
fn test_later_tiles_fill_nodata_holes() {
    let mut a = tile_at(0.0, 10.0, 4, 1.0);
    a.data[[0, 1, 1]] = f32::NAN;
    let b = tile_at(0.0, 10.0, 4, 2.0);

    let mosaic = merge(&[a, b]).unwrap();
    assert_eq!(mosaic.data[[0, 1, 1]], 2.0);
    assert_eq!(mosaic.data[[0, 0, 0]], 1.0);
}

#[test]
fn test_single_tile_passes_through() {
    let a = tile_at(0.0, 10.0, 4, 7.0);
    let mosaic = merge(&[a.clone()]).unwrap();
    assert_eq!(mosaic.extent(), a.extent());
    assert_eq!(mosaic.data, a.data);
}

#[test]
fn test_incompatible_tiles_are_rejected() {
    assert!(matches!(merge(&[]), Err(MosaicError::Processing(_))));

    let a = tile_at(0.0, 10.0, 4, 1.0);
    let mut b = tile_at(2.0, 10.0, 4, 2.0);
    b.projection = "GEOGCS[\"ETRS89\"]".to_string();
    assert!(matches!(
        merge(&[a, b]),
        Err(MosaicError::IncompatibleGrid(_))
    ));
}

#[test]
fn test_reconcile_truncates_to_shared_extent() {
    let a = tile_at(0.0, 10.0, 4, 1.0);
    let b = tile_at(2.0, 10.0, 4, 2.0);

    let (ac, bc) = reconcile(&a, &b).unwrap();
    assert_eq!((ac.width(), ac.height()), (2, 4));
    assert_eq!((bc.width(), bc.height()), (2, 4));
    assert_eq!(ac.extent(), (2.0, 6.0, 4.0, 10.0));
    assert_eq!(ac.extent(), bc.extent());
    assert_eq!(ac.data[[0, 0, 0]], 1.0);
    assert_eq!(bc.data[[0, 0, 0]], 2.0);
}

#[test]
fn test_reconcile_rejects_disjoint_tiles() {
    let a = tile_at(0.0, 10.0, 4, 1.0);
    let b = tile_at(100.0, 10.0, 4, 2.0);
    assert!(matches!(
        reconcile(&a, &b),
        Err(MosaicError::EmptyIntersection(_))
    ));
}
