use chrono::{DateTime, Utc};
use geo::{coord, BoundingRect, Contains, Coord, Intersects, LineString, Polygon, Rect};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// Mean length of one degree of latitude (and of longitude at the equator), in meters
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// 2D real raster samples (rows x cols)
pub type SarRealImage = Array2<f32>;

/// Coordinate system enumeration
///
/// Every geometry handled in one run (footprints, region of interest,
/// rasters) shares a single coordinate system with x pointing east and
/// y pointing north.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic coordinates (longitude, latitude) in degrees
    Geographic,
    /// Projected coordinates in meters (e.g., UTM)
    Projected { epsg: u32 },
}

impl CoordinateSystem {
    /// Ground meters per coordinate unit along x and y at the given y
    pub fn meters_per_unit(&self, y: f64) -> (f64, f64) {
        match self {
            CoordinateSystem::Geographic => {
                let cos_lat = y.to_radians().cos().abs().max(1e-12);
                (METERS_PER_DEGREE * cos_lat, METERS_PER_DEGREE)
            }
            CoordinateSystem::Projected { .. } => (1.0, 1.0),
        }
    }

    /// Move a point by a ground offset given in meters (east, north)
    pub fn offset(&self, point: GeoPoint, east_m: f64, north_m: f64) -> GeoPoint {
        let (mx, my) = self.meters_per_unit(point.y);
        GeoPoint::new(point.x + east_m / mx, point.y + north_m / my)
    }

    /// Equirectangular ground distance between two points, in meters
    pub fn ground_distance(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        let (mx, my) = self.meters_per_unit(0.5 * (a.y + b.y));
        ((b.x - a.x) * mx).hypot((b.y - a.y) * my)
    }

    /// Circular buffer of `radius_m` ground meters around a point, as a closed polygon
    pub fn buffer(&self, center: GeoPoint, radius_m: f64, segments: usize) -> Polygon<f64> {
        let (mx, my) = self.meters_per_unit(center.y);
        let (rx, ry) = (radius_m / mx, radius_m / my);
        let n = segments.max(3);

        let mut coords: Vec<Coord<f64>> = (0..n)
            .map(|i| {
                let angle = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                coord! { x: center.x + rx * angle.cos(), y: center.y + ry * angle.sin() }
            })
            .collect();
        coords.push(coords[0]);

        Polygon::new(LineString::from(coords), vec![])
    }
}

/// A location; x is longitude/easting, y is latitude/northing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
}

impl GeoPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<GeoPoint> for Coord<f64> {
    fn from(p: GeoPoint) -> Self {
        coord! { x: p.x, y: p.y }
    }
}

impl From<Coord<f64>> for GeoPoint {
    fn from(c: Coord<f64>) -> Self {
        GeoPoint::new(c.x, c.y)
    }
}

/// Polarization modes for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl Polarization {
    /// Channels that receive an incidence angle correction
    pub const CORRECTED: [Polarization; 2] = [Polarization::VV, Polarization::VH];

    pub fn parse(value: &str) -> SarResult<Self> {
        match value.trim().to_uppercase().as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            other => Err(SarError::InvalidFormat(format!("Invalid polarization: {}", other))),
        }
    }
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

/// Sentinel-1 acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    IW, // Interferometric Wide swath
    EW, // Extra Wide swath
    SM, // StripMap
    WV, // Wave
}

impl AcquisitionMode {
    pub fn parse(value: &str) -> SarResult<Self> {
        match value.trim().to_uppercase().as_str() {
            "IW" => Ok(AcquisitionMode::IW),
            "EW" => Ok(AcquisitionMode::EW),
            "SM" | "S1" | "S2" | "S3" | "S4" | "S5" | "S6" => Ok(AcquisitionMode::SM),
            "WV" => Ok(AcquisitionMode::WV),
            other => Err(SarError::InvalidFormat(format!("Invalid acquisition mode: {}", other))),
        }
    }
}

impl std::fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionMode::IW => write!(f, "IW"),
            AcquisitionMode::EW => write!(f, "EW"),
            AcquisitionMode::SM => write!(f, "SM"),
            AcquisitionMode::WV => write!(f, "WV"),
        }
    }
}

/// Satellite pass direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrbitDirection {
    /// Satellite moving north
    Ascending,
    /// Satellite moving south
    Descending,
}

impl OrbitDirection {
    pub fn parse(value: &str) -> SarResult<Self> {
        match value.trim().to_uppercase().as_str() {
            "ASCENDING" | "ASC" => Ok(OrbitDirection::Ascending),
            "DESCENDING" | "DESC" => Ok(OrbitDirection::Descending),
            other => Err(SarError::InvalidFormat(format!("Invalid orbit direction: {}", other))),
        }
    }
}

impl std::fmt::Display for OrbitDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitDirection::Ascending => write!(f, "ASCENDING"),
            OrbitDirection::Descending => write!(f, "DESCENDING"),
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            0.5 * (self.min_lon + self.max_lon),
            0.5 * (self.min_lat + self.max_lat),
        )
    }

    /// Grow the box by a ground distance (meters) on every side
    pub fn buffered(&self, distance_m: f64, crs: CoordinateSystem) -> Self {
        let (mx, my) = crs.meters_per_unit(self.center().y);
        let dx = distance_m / mx;
        let dy = distance_m / my;
        BoundingBox {
            min_lon: self.min_lon - dx,
            max_lon: self.max_lon + dx,
            min_lat: self.min_lat - dy,
            max_lat: self.max_lat + dy,
        }
    }

    /// Inclusive of the edges
    pub fn contains(&self, point: GeoPoint) -> bool {
        self.to_rect().intersects(&Coord::from(point))
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.to_rect().intersects(&other.to_rect())
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_lon, y: self.min_lat },
            coord! { x: self.max_lon, y: self.max_lat },
        )
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        BoundingBox {
            min_lon: rect.min().x,
            max_lon: rect.max().x,
            min_lat: rect.min().y,
            max_lat: rect.max().y,
        }
    }
}

/// Geospatial transformation parameters
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
    /// North-up transform without rotation terms
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    /// Build from the six GDAL geotransform coefficients
    pub fn from_gdal(coefficients: [f64; 6]) -> Self {
        Self {
            top_left_x: coefficients[0],
            pixel_width: coefficients[1],
            rotation_x: coefficients[2],
            top_left_y: coefficients[3],
            rotation_y: coefficients[4],
            pixel_height: coefficients[5],
        }
    }
}

/// Pixel grid: transform, shape and coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub transform: GeoTransform,
    /// (rows, cols)
    pub shape: (usize, usize),
    pub crs: CoordinateSystem,
}

impl Grid {
    pub fn new(transform: GeoTransform, shape: (usize, usize), crs: CoordinateSystem) -> SarResult<Self> {
        if transform.rotation_x != 0.0 || transform.rotation_y != 0.0 {
            return Err(SarError::InvalidFormat(
                "Rotated geotransforms are not supported".to_string(),
            ));
        }
        if transform.pixel_width == 0.0 || transform.pixel_height == 0.0 {
            return Err(SarError::InvalidFormat("Pixel size must be non-zero".to_string()));
        }
        if shape.0 == 0 || shape.1 == 0 {
            return Err(SarError::InvalidFormat(format!("Empty grid shape {:?}", shape)));
        }
        Ok(Self { transform, shape, crs })
    }

    /// North-up grid covering `bounds` with square pixels of `scale_m` ground meters
    pub fn from_bounds(bounds: &BoundingBox, scale_m: f64, crs: CoordinateSystem) -> SarResult<Self> {
        if scale_m <= 0.0 {
            return Err(SarError::Configuration(format!("Invalid grid scale: {} m", scale_m)));
        }
        let (mx, my) = crs.meters_per_unit(bounds.center().y);
        let pixel_width = scale_m / mx;
        let pixel_height = scale_m / my;
        let cols = ((bounds.width() / pixel_width).ceil() as usize).max(1);
        let rows = ((bounds.height() / pixel_height).ceil() as usize).max(1);
        Self::new(
            GeoTransform::north_up(bounds.min_lon, bounds.max_lat, pixel_width, pixel_height),
            (rows, cols),
            crs,
        )
    }

    pub fn rows(&self) -> usize {
        self.shape.0
    }

    pub fn cols(&self) -> usize {
        self.shape.1
    }

    /// World coordinates of a pixel center
    pub fn pixel_center(&self, row: usize, col: usize) -> GeoPoint {
        GeoPoint::new(
            self.transform.top_left_x + (col as f64 + 0.5) * self.transform.pixel_width,
            self.transform.top_left_y + (row as f64 + 0.5) * self.transform.pixel_height,
        )
    }

    /// Cell outline of a pixel in world coordinates
    pub fn pixel_rect(&self, row: usize, col: usize) -> Rect<f64> {
        let c = self.pixel_center(row, col);
        let half_w = 0.5 * self.transform.pixel_width;
        let half_h = 0.5 * self.transform.pixel_height;
        Rect::new(
            coord! { x: c.x - half_w, y: c.y - half_h },
            coord! { x: c.x + half_w, y: c.y + half_h },
        )
    }

    /// Row and column ranges of the pixels overlapping `bounds`, clamped to the grid
    pub fn window(&self, bounds: &BoundingBox) -> (Range<usize>, Range<usize>) {
        let (r0, c0) = self.fractional_pixel(GeoPoint::new(bounds.min_lon, bounds.max_lat));
        let (r1, c1) = self.fractional_pixel(GeoPoint::new(bounds.max_lon, bounds.min_lat));
        let clamp = |lo: f64, hi: f64, len: usize| {
            let start = lo.floor().max(0.0) as usize;
            let end = (hi.ceil().max(0.0) as usize).min(len);
            start.min(end)..end
        };
        (
            clamp(r0.min(r1), r0.max(r1), self.rows()),
            clamp(c0.min(c1), c0.max(c1), self.cols()),
        )
    }

    /// Continuous pixel coordinates (row, col); pixel (0, 0) spans [0, 1) x [0, 1)
    pub fn fractional_pixel(&self, point: GeoPoint) -> (f64, f64) {
        (
            (point.y - self.transform.top_left_y) / self.transform.pixel_height,
            (point.x - self.transform.top_left_x) / self.transform.pixel_width,
        )
    }

    /// Pixel containing a point, if it lies on the grid
    pub fn locate(&self, point: GeoPoint) -> Option<(usize, usize)> {
        let (r, c) = self.fractional_pixel(point);
        if !r.is_finite() || !c.is_finite() || r < 0.0 || c < 0.0 {
            return None;
        }
        let (row, col) = (r.floor() as usize, c.floor() as usize);
        (row < self.rows() && col < self.cols()).then_some((row, col))
    }

    /// Ground size of one pixel (dx, dy) in meters for the given row
    pub fn ground_pixel_size(&self, row: usize) -> (f64, f64) {
        let y = self.transform.top_left_y + (row as f64 + 0.5) * self.transform.pixel_height;
        let (mx, my) = self.crs.meters_per_unit(y);
        (
            self.transform.pixel_width.abs() * mx,
            self.transform.pixel_height.abs() * my,
        )
    }

    /// Ground area of one pixel in square meters for the given row
    pub fn pixel_area_m2(&self, row: usize) -> f64 {
        let (dx, dy) = self.ground_pixel_size(row);
        dx * dy
    }

    pub fn bounds(&self) -> BoundingBox {
        let x0 = self.transform.top_left_x;
        let y0 = self.transform.top_left_y;
        let x1 = x0 + self.cols() as f64 * self.transform.pixel_width;
        let y1 = y0 + self.rows() as f64 * self.transform.pixel_height;
        BoundingBox {
            min_lon: x0.min(x1),
            max_lon: x0.max(x1),
            min_lat: y0.min(y1),
            max_lat: y0.max(y1),
        }
    }
}

/// Georeferenced single-band raster; NaN marks masked or missing pixels
#[derive(Debug, Clone)]
pub struct Raster {
    pub data: SarRealImage,
    pub grid: Grid,
}

impl Raster {
    pub fn new(data: SarRealImage, grid: Grid) -> SarResult<Self> {
        if data.dim() != grid.shape {
            return Err(SarError::Processing(format!(
                "Raster data shape {:?} does not match grid shape {:?}",
                data.dim(),
                grid.shape
            )));
        }
        Ok(Self { data, grid })
    }

    pub fn filled(grid: Grid, value: f32) -> Self {
        Self {
            data: Array2::from_elem(grid.shape, value),
            grid,
        }
    }

    /// Value of the pixel containing `point`, if on the grid and not masked
    pub fn value_at(&self, point: GeoPoint) -> Option<f32> {
        let (row, col) = self.grid.locate(point)?;
        let value = self.data[[row, col]];
        value.is_finite().then_some(value)
    }

    /// Same grid, new samples
    pub fn with_data(&self, data: SarRealImage) -> SarResult<Self> {
        Self::new(data, self.grid)
    }

    /// Set every pixel whose center lies outside `bounds` to NaN
    pub fn mask_outside(mut self, bounds: &BoundingBox) -> Self {
        let grid = self.grid;
        self.data.indexed_iter_mut().for_each(|((i, j), v)| {
            if !bounds.contains(grid.pixel_center(i, j)) {
                *v = f32::NAN;
            }
        });
        self
    }

    /// Keep pixels where `mask` is true, NaN elsewhere
    pub fn apply_mask(&self, mask: &Array2<bool>) -> SarResult<Self> {
        if mask.dim() != self.data.dim() {
            return Err(SarError::Processing(format!(
                "Mask shape {:?} does not match raster shape {:?}",
                mask.dim(),
                self.data.dim()
            )));
        }
        let mut data = self.data.clone();
        ndarray::Zip::from(&mut data).and(mask).for_each(|v, &keep| {
            if !keep {
                *v = f32::NAN;
            }
        });
        self.with_data(data)
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }
}

/// Polygon footprint of a scene (exterior ring only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    polygon: Polygon<f64>,
}

impl Footprint {
    /// Build from a ring; an open ring is closed by repeating its first vertex
    pub fn new(ring: Vec<GeoPoint>) -> Self {
        let exterior: LineString<f64> = ring.into_iter().map(Coord::from).collect();
        Self { polygon: Polygon::new(exterior, vec![]) }
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Closed ring, first vertex repeated at the end
    pub fn ring(&self) -> Vec<GeoPoint> {
        self.polygon.exterior().coords().map(|&c| GeoPoint::from(c)).collect()
    }

    /// Distinct vertices in ring order (closing vertex dropped)
    pub fn vertices(&self) -> Vec<GeoPoint> {
        let mut ring = self.ring();
        if ring.len() > 1 {
            ring.pop();
        }
        ring
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        self.polygon.bounding_rect().map(BoundingBox::from)
    }

    /// Strict interior test; points on the boundary are outside
    pub fn contains(&self, point: GeoPoint) -> bool {
        self.polygon.contains(&Coord::from(point))
    }
}

/// Region of interest for the reference angle and the calibration box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Region {
    Point(GeoPoint),
    Polygon(Footprint),
}

impl Region {
    pub fn bounds(&self) -> SarResult<BoundingBox> {
        match self {
            Region::Point(p) => Ok(BoundingBox {
                min_lon: p.x,
                max_lon: p.x,
                min_lat: p.y,
                max_lat: p.y,
            }),
            Region::Polygon(footprint) => footprint
                .bounds()
                .ok_or_else(|| SarError::Configuration("Region of interest polygon is empty".to_string())),
        }
    }
}

/// Named raster bands carried by a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    VV,
    VH,
    /// Ellipsoid incidence angle, degrees
    Angle,
    /// Local incidence angle, degrees
    Lia,
    CorrectedVV,
    CorrectedVH,
}

impl Band {
    /// Raw backscatter band of a polarization
    pub fn backscatter(pol: Polarization) -> SarResult<Self> {
        match pol {
            Polarization::VV => Ok(Band::VV),
            Polarization::VH => Ok(Band::VH),
            other => Err(SarError::Processing(format!("No backscatter band for {}", other))),
        }
    }

    /// Corrected band of a polarization
    pub fn corrected(pol: Polarization) -> SarResult<Self> {
        match pol {
            Polarization::VV => Ok(Band::CorrectedVV),
            Polarization::VH => Ok(Band::CorrectedVH),
            other => Err(SarError::Processing(format!("No corrected band for {}", other))),
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Band::VV => write!(f, "VV"),
            Band::VH => write!(f, "VH"),
            Band::Angle => write!(f, "angle"),
            Band::Lia => write!(f, "LIA"),
            Band::CorrectedVV => write!(f, "corrected_VV"),
            Band::CorrectedVH => write!(f, "corrected_VH"),
        }
    }
}

/// Ordinary least squares line with correlation statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// dB per degree of local incidence angle
    pub slope: f64,
    pub offset: f64,
    pub r_squared: f64,
    /// Two-sided p-value of the correlation; `None` with fewer than 3 samples
    pub p_value: Option<f64>,
}

/// Per-polarization regression of backscatter against LIA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub polarization: Polarization,
    /// Forest points left after outlier filtering
    pub sample_count: usize,
    pub lia_range: Option<f64>,
    pub lia_iqr: Option<f64>,
    /// `None` when the regression is degenerate
    pub fit: Option<LinearFit>,
}

impl FitResult {
    pub fn is_defined(&self) -> bool {
        self.fit.is_some()
    }
}

/// Per-scene data quality conditions that do not fail the scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataQualityFlag {
    /// Too few samples or no LIA spread to fit a line
    DegenerateRegression {
        polarization: Polarization,
        sample_count: usize,
        reason: String,
    },
    /// No corrected band was produced for this polarization
    Uncorrected { polarization: Polarization },
}

/// Scalar metadata accumulated on a scene by the processing stages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneMetadata {
    /// Radar look direction, degrees clockwise from north
    pub look_angle_azimuth: Option<f64>,
    pub fits: BTreeMap<Polarization, FitResult>,
    /// Mean elevation of the selected forest sites
    pub mean_elevation: Option<f64>,
    pub quality_flags: Vec<DataQualityFlag>,
}

/// Acquisition-level description of a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneInfo {
    pub id: String,
    pub acquisition_time: DateTime<Utc>,
    pub orbit: OrbitDirection,
    pub mode: AcquisitionMode,
    pub polarizations: Vec<Polarization>,
    pub footprint: Footprint,
}

/// One SAR acquisition with its bands and derived metadata
#[derive(Debug, Clone)]
pub struct Scene {
    pub info: SceneInfo,
    pub bands: HashMap<Band, Raster>,
    pub metadata: SceneMetadata,
}

impl Scene {
    pub fn new(info: SceneInfo) -> Self {
        Self {
            info,
            bands: HashMap::new(),
            metadata: SceneMetadata::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn with_band(mut self, band: Band, raster: Raster) -> Self {
        self.bands.insert(band, raster);
        self
    }

    pub fn band(&self, band: Band) -> SarResult<&Raster> {
        self.bands.get(&band).ok_or_else(|| {
            SarError::Processing(format!("Scene {} has no {} band", self.info.id, band))
        })
    }

    pub fn has_band(&self, band: Band) -> bool {
        self.bands.contains_key(&band)
    }

    pub fn fit(&self, pol: Polarization) -> Option<&FitResult> {
        self.metadata.fits.get(&pol)
    }
}

/// Error types for SAR processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Geometry error in scene {scene_id}: {reason}")]
    Geometry { scene_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data quality error in scene {scene_id}: {reason}")]
    DataQuality { scene_id: String, reason: String },

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Area;

    fn square() -> Footprint {
        Footprint::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(1.0, 0.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(0.0, 1.0),
        ])
    }

    #[test]
    fn test_footprint_closes_open_ring() {
        let fp = square();
        assert_eq!(fp.ring().len(), 5);
        assert_eq!(fp.vertices().len(), 4);
        assert_eq!(fp.ring()[0], fp.ring()[4]);
    }

    #[test]
    fn test_point_in_polygon() {
        let fp = square();
        assert!(fp.contains(GeoPoint::new(0.5, 0.5)));
        assert!(!fp.contains(GeoPoint::new(1.5, 0.5)));
        assert!(!fp.contains(GeoPoint::new(0.5, -0.1)));
    }

    #[test]
    fn test_footprint_bounds() {
        let bounds = square().bounds().unwrap();
        assert_eq!(bounds.min_lon, 0.0);
        assert_eq!(bounds.max_lat, 1.0);
        assert!(bounds.contains(GeoPoint::new(1.0, 1.0)));
        let other = BoundingBox { min_lon: 1.0, max_lon: 2.0, min_lat: 0.5, max_lat: 3.0 };
        assert!(bounds.intersects(&other));
    }

    #[test]
    fn test_projected_buffer_area() {
        let crs = CoordinateSystem::Projected { epsg: 32633 };
        let disc = crs.buffer(GeoPoint::new(100.0, 100.0), 20.0, 64);
        assert_eq!(disc.exterior().0.len(), 65);
        // Inscribed 64-gon falls just short of the circle
        let area = disc.unsigned_area();
        assert!(area < std::f64::consts::PI * 400.0);
        assert_relative_eq!(area, 1254.62, epsilon = 0.01);
    }

    #[test]
    fn test_grid_locate_and_center() {
        let grid = Grid::new(
            GeoTransform::north_up(0.0, 100.0, 10.0, 10.0),
            (10, 10),
            CoordinateSystem::Projected { epsg: 32633 },
        )
        .unwrap();
        assert_eq!(grid.locate(GeoPoint::new(5.0, 95.0)), Some((0, 0)));
        assert_eq!(grid.locate(GeoPoint::new(99.0, 1.0)), Some((9, 9)));
        assert_eq!(grid.locate(GeoPoint::new(100.0, 50.0)), None);
        let c = grid.pixel_center(2, 3);
        assert_relative_eq!(c.x, 35.0);
        assert_relative_eq!(c.y, 75.0);
        assert_relative_eq!(grid.pixel_area_m2(0), 100.0);

        let window = BoundingBox { min_lon: 15.0, max_lon: 35.0, min_lat: 60.0, max_lat: 80.0 };
        assert_eq!(grid.window(&window), (2..4, 1..4));
        let cell = grid.pixel_rect(2, 3);
        assert_eq!((cell.min().x, cell.min().y, cell.max().x, cell.max().y), (30.0, 70.0, 40.0, 80.0));
    }

    #[test]
    fn test_geographic_ground_distance() {
        let crs = CoordinateSystem::Geographic;
        let d = crs.ground_distance(GeoPoint::new(10.0, 0.0), GeoPoint::new(10.0, 1.0));
        assert_relative_eq!(d, METERS_PER_DEGREE, max_relative = 1e-9);
        let moved = crs.offset(GeoPoint::new(10.0, 60.0), 1000.0, 0.0);
        let back = crs.ground_distance(GeoPoint::new(10.0, 60.0), moved);
        assert_relative_eq!(back, 1000.0, max_relative = 1e-6);
    }

    #[test]
    fn test_buffered_bounds() {
        let bbox = Region::Point(GeoPoint::new(500_000.0, 5_000_000.0)).bounds().unwrap();
        let buffered = bbox.buffered(10_000.0, CoordinateSystem::Projected { epsg: 32633 });
        assert_relative_eq!(buffered.width(), 20_000.0);
        assert_relative_eq!(buffered.height(), 20_000.0);
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!(Polarization::parse("vh").unwrap(), Polarization::VH);
        assert_eq!(OrbitDirection::parse("DESCENDING").unwrap(), OrbitDirection::Descending);
        assert_eq!(AcquisitionMode::parse("IW").unwrap(), AcquisitionMode::IW);
        assert!(Polarization::parse("XX").is_err());
    }
}
