use chrono::{DateTime, Utc};
use geo::BoundingRect;
use geo_types::{Geometry, MultiPolygon};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use wkt::{ToWkt, TryFromWkt};

/// Pixel values are carried as f32 in memory regardless of the on-disk type
pub type Pixel = f32;

/// Polygonal ground coverage of a product or of the area of interest,
/// in geographic coordinates (WGS84). Canonical exchange form is WKT.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint(MultiPolygon<f64>);

impl Footprint {
    pub fn from_wkt(text: &str) -> MosaicResult<Self> {
        let geom = Geometry::<f64>::try_from_wkt_str(text)
            .map_err(|e| MosaicError::Geometry(format!("invalid WKT: {}", e)))?;
        Self::from_geometry(geom)
    }

    pub fn from_geometry(geom: Geometry<f64>) -> MosaicResult<Self> {
        match geom {
            Geometry::Polygon(p) => Ok(Footprint(MultiPolygon(vec![p]))),
            Geometry::MultiPolygon(mp) => Ok(Footprint(mp)),
            _ => Err(MosaicError::Geometry(
                "expected POLYGON or MULTIPOLYGON geometry".to_string(),
            )),
        }
    }

    pub(crate) fn from_multi_polygon(mp: MultiPolygon<f64>) -> Self {
        Footprint(mp)
    }

    pub fn to_wkt(&self) -> String {
        self.0.wkt_string()
    }

    pub fn as_multi_polygon(&self) -> &MultiPolygon<f64> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 .0.is_empty()
    }

    /// Geographic bounding box as (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        self.0
            .bounding_rect()
            .map(|r| (r.min().x, r.min().y, r.max().x, r.max().y))
    }
}

/// Polarization channels of a Sentinel-1 acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl Polarization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarization::VV => "VV",
            Polarization::VH => "VH",
            Polarization::HV => "HV",
            Polarization::HH => "HH",
        }
    }
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalog entry. Immutable once fetched.
#[derive(Debug, Clone)]
pub struct Product {
    /// Catalog identifier (UUID for Copernicus products)
    pub id: String,
    /// Product name, e.g. S2A_MSIL2A_20200103T...
    pub title: String,
    /// Ground coverage in WGS84
    pub footprint: Footprint,
    /// Acquisition start timestamp
    pub acquired: DateTime<Utc>,
    /// Cloud cover percentage, present for optical products only.
    /// Acts as the quality proxy during scene ranking.
    pub cloud_cover: Option<f64>,
    /// Download size in bytes
    pub size_bytes: u64,
}

/// Half-open date range [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    /// Membership test for product acquisition timestamps. Inclusive on
    /// both ends: a boundary acquisition may belong to two adjacent
    /// intervals, matching the catalog filter of the reference pipeline.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn width(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Directory-safe label, e.g. "20200101_20200131"
    pub fn label(&self) -> String {
        format!(
            "{}_{}",
            self.start.format("%Y%m%d"),
            self.end.format("%Y%m%d")
        )
    }
}

impl std::fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Ordered scene selection for one interval and one source.
/// When `complete` is true the selected footprints jointly cover at least
/// the configured fraction of the AOI; ordering is selection priority
/// (first scene contributed the most area).
#[derive(Debug, Clone, Default)]
pub struct CoverageResult {
    pub products: Vec<Product>,
    pub complete: bool,
}

impl CoverageResult {
    pub fn incomplete(products: Vec<Product>) -> Self {
        CoverageResult {
            products,
            complete: false,
        }
    }
}

/// One accepted time-series point: both sources achieved coverage.
#[derive(Debug, Clone)]
pub struct SeriesPair {
    pub interval: TimeInterval,
    pub s2: CoverageResult,
    pub s1: CoverageResult,
}

/// On-disk sample type of a raster band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandDtype {
    UInt16,
    Float32,
}

impl BandDtype {
    /// Default no-data marker for rasters of this type
    pub fn default_nodata(self) -> Pixel {
        match self {
            BandDtype::UInt16 => 0.0,
            BandDtype::Float32 => f32::NAN,
        }
    }
}

/// Affine georeferencing of a north-up raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: &[f64; 6]) -> Self {
        GeoTransform {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0 && self.pixel_height < 0.0
    }

    /// Geographic coordinates of a (fractional) pixel position
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.top_left_x + col * self.pixel_width,
            self.top_left_y + row * self.pixel_height,
        )
    }

    /// Fractional pixel position of a geographic coordinate
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.top_left_x) / self.pixel_width,
            (y - self.top_left_y) / self.pixel_height,
        )
    }

    /// Extent of a raster of the given size as (min_x, min_y, max_x, max_y)
    pub fn extent(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (x1, y1) = self.pixel_to_geo(0.0, 0.0);
        let (x2, y2) = self.pixel_to_geo(width as f64, height as f64);
        (x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2))
    }

    /// Transform of a sub-window starting at (col_off, row_off)
    pub fn for_window(&self, col_off: usize, row_off: usize) -> GeoTransform {
        let (x, y) = self.pixel_to_geo(col_off as f64, row_off as f64);
        GeoTransform {
            top_left_x: x,
            top_left_y: y,
            ..*self
        }
    }
}

/// Georeferenced pixel grid. Created by one pipeline stage, written to
/// durable storage and consumed exactly once downstream; never rewritten
/// in place.
#[derive(Debug, Clone)]
pub struct RasterTile {
    /// Band-major pixel data: (bands, rows, cols)
    pub data: Array3<Pixel>,
    pub transform: GeoTransform,
    /// CRS as WKT
    pub projection: String,
    pub nodata: Pixel,
    pub dtype: BandDtype,
}

impl RasterTile {
    pub fn new(
        data: Array3<Pixel>,
        transform: GeoTransform,
        projection: String,
        nodata: Pixel,
        dtype: BandDtype,
    ) -> Self {
        RasterTile {
            data,
            transform,
            projection,
            nodata,
            dtype,
        }
    }

    pub fn bands(&self) -> usize {
        self.data.dim().0
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    /// (pixel_width, pixel_height); pixel_height is negative for north-up
    pub fn resolution(&self) -> (f64, f64) {
        (self.transform.pixel_width, self.transform.pixel_height)
    }

    pub fn extent(&self) -> (f64, f64, f64, f64) {
        self.transform.extent(self.width(), self.height())
    }

    pub fn is_nodata(&self, value: Pixel) -> bool {
        if self.nodata.is_nan() {
            value.is_nan()
        } else {
            value == self.nodata
        }
    }
}

/// Error types for the mosaicking pipeline.
///
/// `InvalidRange` and `Config` are fatal; the remaining kinds are
/// per-product or per-interval soft failures that skip work and let the
/// run continue.
#[derive(Debug, thiserror::Error)]
pub enum MosaicError {
    #[error("invalid date range: {0}")]
    InvalidRange(String),

    #[error("empty intersection: {0}")]
    EmptyIntersection(String),

    #[error("incompatible grids: {0}")]
    IncompatibleGrid(String),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("processing error: {0}")]
    Processing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl MosaicError {
    /// Soft failures skip a product or an interval; fatal ones abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MosaicError::InvalidRange(_) | MosaicError::Config(_))
    }
}

/// Result type for mosaicking operations
pub type MosaicResult<T> = Result<T, MosaicError>;
