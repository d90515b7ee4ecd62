use crate::types::{
    BoundingBox, Footprint, GeoPoint, Grid, Raster, Region, SarError, SarResult,
};
use geo::{Area, BooleanOps, BoundingRect, Centroid, Contains, Coord, Polygon};
use ndarray::{Array2, Zip};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::ops::Range;

/// Stand-in for infinity inside the distance transform
const DT_FAR: f64 = 1e20;

/// Resampling kernel for [`ProcessingEngine::reproject`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    Nearest,
    Bilinear,
}

/// Capability interface over the raster/vector processing backend
pub trait ProcessingEngine: Send + Sync {
    /// Resample `source` onto `target`; pixels without source coverage are NaN
    fn reproject(&self, source: &Raster, target: &Grid, resampling: Resampling) -> SarResult<Raster>;

    /// Ground distance (m) from every pixel to the nearest pixel where `valid` is false
    fn distance_to_invalid(&self, valid: &Array2<bool>, grid: &Grid) -> SarResult<Array2<f32>>;

    /// Uniform random points inside `bounds`, deterministic for a given seed
    fn random_points(&self, bounds: &BoundingBox, count: usize, seed: u64) -> SarResult<Vec<GeoPoint>>;

    /// Value of the pixel containing `point`
    fn sample(&self, raster: &Raster, point: GeoPoint) -> Option<f64>;

    /// Mean of unmasked pixels whose centers fall inside `site`
    fn mean_within(&self, raster: &Raster, site: &Polygon<f64>) -> Option<f64>;

    /// Ground area (m²) of `site` lying on unmasked pixels of `mask`
    fn covered_area(&self, mask: &Raster, site: &Polygon<f64>) -> f64;

    /// NaN outside the footprint polygon
    fn clip_to_polygon(&self, raster: &Raster, footprint: &Footprint) -> Raster;

    /// Pixel centers of `grid` belonging to a region
    fn pixel_centers_within(&self, grid: &Grid, region: &Region) -> Vec<GeoPoint>;
}

/// In-process engine over `ndarray`
#[derive(Debug, Clone)]
pub struct NdarrayEngine {
    parallel: bool,
}

impl Default for NdarrayEngine {
    fn default() -> Self {
        Self::new(cfg!(feature = "parallel"))
    }
}

impl NdarrayEngine {
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    fn bilinear(source: &Raster, r: f64, c: f64) -> f32 {
        let (rows, cols) = source.grid.shape;
        // Interpolate between pixel centers
        let rr = r - 0.5;
        let cc = c - 0.5;
        if rr < 0.0 || cc < 0.0 || rr > (rows - 1) as f64 || cc > (cols - 1) as f64 {
            return Self::nearest(source, r, c);
        }
        let y1 = rr.floor() as usize;
        let x1 = cc.floor() as usize;
        let y2 = (y1 + 1).min(rows - 1);
        let x2 = (x1 + 1).min(cols - 1);
        let dy = rr - y1 as f64;
        let dx = cc - x1 as f64;

        let v11 = source.data[[y1, x1]] as f64;
        let v12 = source.data[[y2, x1]] as f64;
        let v21 = source.data[[y1, x2]] as f64;
        let v22 = source.data[[y2, x2]] as f64;

        let interpolated = v11 * (1.0 - dx) * (1.0 - dy)
            + v21 * dx * (1.0 - dy)
            + v12 * (1.0 - dx) * dy
            + v22 * dx * dy;
        interpolated as f32
    }

    fn nearest(source: &Raster, r: f64, c: f64) -> f32 {
        let (rows, cols) = source.grid.shape;
        if !(r >= 0.0 && c >= 0.0) {
            return f32::NAN;
        }
        let (row, col) = (r.floor() as usize, c.floor() as usize);
        if row < rows && col < cols {
            source.data[[row, col]]
        } else {
            f32::NAN
        }
    }

    /// Pixels of `grid` under the bounding box of `polygon`
    fn window_over(grid: &Grid, polygon: &Polygon<f64>) -> Option<(Range<usize>, Range<usize>)> {
        polygon.bounding_rect().map(|rect| grid.window(&BoundingBox::from(rect)))
    }
}

/// Squared distance transform of a sampled function along one axis
/// (lower envelope of parabolas, Felzenszwalb & Huttenlocher)
fn squared_distance_1d(f: &[f64], out: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];
    let mut k = 0usize;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    let intersect = |q: usize, p: usize| -> f64 {
        let (qf, pf) = (q as f64, p as f64);
        ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
    };

    for q in 1..n {
        let mut s = intersect(q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    k = 0;
    for (q, slot) in out.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let d = q as f64 - v[k] as f64;
        *slot = d * d + f[v[k]];
    }
}

/// Exact squared Euclidean distance (pixel units) to the nearest `false` pixel
pub(crate) fn squared_distance_to_invalid(valid: &Array2<bool>) -> Array2<f64> {
    let (rows, cols) = valid.dim();
    let mut grid = valid.mapv(|ok| if ok { DT_FAR } else { 0.0 });

    let mut column = vec![0.0; rows];
    let mut transformed = vec![0.0; rows];
    for col in 0..cols {
        for row in 0..rows {
            column[row] = grid[[row, col]];
        }
        squared_distance_1d(&column, &mut transformed);
        for row in 0..rows {
            grid[[row, col]] = transformed[row];
        }
    }

    let mut line = vec![0.0; cols];
    let mut transformed = vec![0.0; cols];
    for row in 0..rows {
        for col in 0..cols {
            line[col] = grid[[row, col]];
        }
        squared_distance_1d(&line, &mut transformed);
        for col in 0..cols {
            grid[[row, col]] = transformed[col];
        }
    }

    grid
}

impl ProcessingEngine for NdarrayEngine {
    fn reproject(&self, source: &Raster, target: &Grid, resampling: Resampling) -> SarResult<Raster> {
        if source.grid.crs != target.crs {
            return Err(SarError::Processing(format!(
                "Cannot reproject between {:?} and {:?}",
                source.grid.crs, target.crs
            )));
        }
        if source.grid == *target {
            return Ok(source.clone());
        }

        log::debug!(
            "Reprojecting {:?} raster onto {:?} grid ({:?})",
            source.grid.shape,
            target.shape,
            resampling
        );

        let mut out = Array2::<f32>::from_elem(target.shape, f32::NAN);
        let kernel = |(i, j): (usize, usize), v: &mut f32| {
            let (r, c) = source.grid.fractional_pixel(target.pixel_center(i, j));
            *v = match resampling {
                Resampling::Nearest => Self::nearest(source, r, c),
                Resampling::Bilinear => Self::bilinear(source, r, c),
            };
        };
        if self.parallel {
            Zip::indexed(&mut out).par_for_each(kernel);
        } else {
            Zip::indexed(&mut out).for_each(kernel);
        }

        Raster::new(out, *target)
    }

    fn distance_to_invalid(&self, valid: &Array2<bool>, grid: &Grid) -> SarResult<Array2<f32>> {
        if valid.dim() != grid.shape {
            return Err(SarError::Processing(format!(
                "Mask shape {:?} does not match grid shape {:?}",
                valid.dim(),
                grid.shape
            )));
        }
        let squared = squared_distance_to_invalid(valid);
        let mut meters = Array2::<f32>::zeros(grid.shape);
        Zip::indexed(&mut meters).and(&squared).for_each(|(i, _), m, &d2| {
            *m = if d2 >= DT_FAR * 0.5 {
                f32::INFINITY
            } else {
                (d2.sqrt() * grid.pixel_area_m2(i).sqrt()) as f32
            };
        });
        Ok(meters)
    }

    fn random_points(&self, bounds: &BoundingBox, count: usize, seed: u64) -> SarResult<Vec<GeoPoint>> {
        if !(bounds.width() > 0.0 && bounds.height() > 0.0) {
            return Err(SarError::Processing(format!(
                "Cannot draw random points in an empty region {:?}",
                bounds
            )));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Ok((0..count)
            .map(|_| {
                GeoPoint::new(
                    rng.random_range(bounds.min_lon..bounds.max_lon),
                    rng.random_range(bounds.min_lat..bounds.max_lat),
                )
            })
            .collect())
    }

    fn sample(&self, raster: &Raster, point: GeoPoint) -> Option<f64> {
        raster.value_at(point).map(f64::from)
    }

    fn mean_within(&self, raster: &Raster, site: &Polygon<f64>) -> Option<f64> {
        let (rows, cols) = Self::window_over(&raster.grid, site)?;
        let mut inside = 0usize;
        let (mut sum, mut count) = (0.0f64, 0usize);
        for row in rows {
            for col in cols.clone() {
                if !site.contains(&Coord::from(raster.grid.pixel_center(row, col))) {
                    continue;
                }
                inside += 1;
                let v = raster.data[[row, col]];
                if v.is_finite() {
                    sum += v as f64;
                    count += 1;
                }
            }
        }
        if inside == 0 {
            // Site smaller than a pixel: use the pixel under its centroid
            return site
                .centroid()
                .and_then(|c| self.sample(raster, GeoPoint::new(c.x(), c.y())));
        }
        (count > 0).then(|| sum / count as f64)
    }

    fn covered_area(&self, mask: &Raster, site: &Polygon<f64>) -> f64 {
        let Some(rect) = site.bounding_rect() else {
            return 0.0;
        };
        let grid = &mask.grid;
        let (rows, cols) = grid.window(&BoundingBox::from(rect));
        let mut area = 0.0;
        for row in rows {
            for col in cols.clone() {
                if !mask.data[[row, col]].is_finite() {
                    continue;
                }
                let cell = grid.pixel_rect(row, col).to_polygon();
                area += site.intersection(&cell).unsigned_area();
            }
        }

        let (mx, my) = grid.crs.meters_per_unit(rect.center().y);
        area * mx * my
    }

    fn clip_to_polygon(&self, raster: &Raster, footprint: &Footprint) -> Raster {
        let grid = raster.grid;
        let Some(bounds) = footprint.bounds() else {
            return Raster::filled(grid, f32::NAN);
        };
        let mut data = raster.data.clone();
        let kernel = |(i, j): (usize, usize), v: &mut f32| {
            let p = grid.pixel_center(i, j);
            if !(bounds.contains(p) && footprint.contains(p)) {
                *v = f32::NAN;
            }
        };
        if self.parallel {
            Zip::indexed(&mut data).par_for_each(kernel);
        } else {
            Zip::indexed(&mut data).for_each(kernel);
        }
        Raster { data, grid }
    }

    fn pixel_centers_within(&self, grid: &Grid, region: &Region) -> Vec<GeoPoint> {
        match region {
            Region::Point(p) => grid
                .locate(*p)
                .map(|(r, c)| vec![grid.pixel_center(r, c)])
                .unwrap_or_default(),
            Region::Polygon(footprint) => {
                let Some((rows, cols)) = Self::window_over(grid, footprint.polygon()) else {
                    return Vec::new();
                };
                let mut centers = Vec::new();
                for row in rows {
                    for col in cols.clone() {
                        let p = grid.pixel_center(row, col);
                        if footprint.contains(p) {
                            centers.push(p);
                        }
                    }
                }
                centers
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordinateSystem, GeoTransform};
    use approx::assert_relative_eq;

    fn metric_grid(rows: usize, cols: usize, pixel: f64) -> Grid {
        Grid::new(
            GeoTransform::north_up(0.0, rows as f64 * pixel, pixel, pixel),
            (rows, cols),
            CoordinateSystem::Projected { epsg: 32633 },
        )
        .unwrap()
    }

    #[test]
    fn test_distance_transform_single_invalid_pixel() {
        let mut valid = Array2::from_elem((7, 7), true);
        valid[[3, 3]] = false;
        let d2 = squared_distance_to_invalid(&valid);
        assert_eq!(d2[[3, 3]], 0.0);
        assert_eq!(d2[[3, 4]], 1.0);
        assert_eq!(d2[[5, 5]], 8.0);
        assert_eq!(d2[[0, 3]], 9.0);
    }

    #[test]
    fn test_distance_in_meters_and_all_valid() {
        let engine = NdarrayEngine::new(false);
        let grid = metric_grid(5, 5, 10.0);
        let mut valid = Array2::from_elem((5, 5), true);
        let far = engine.distance_to_invalid(&valid, &grid).unwrap();
        assert!(far.iter().all(|d| d.is_infinite()));

        valid[[0, 0]] = false;
        let d = engine.distance_to_invalid(&valid, &grid).unwrap();
        assert_relative_eq!(d[[0, 2]], 20.0);
        assert_relative_eq!(d[[3, 4]], 50.0);
    }

    #[test]
    fn test_random_points_are_deterministic_and_inside() {
        let engine = NdarrayEngine::default();
        let bounds = BoundingBox { min_lon: 10.0, max_lon: 11.0, min_lat: 45.0, max_lat: 46.0 };
        let a = engine.random_points(&bounds, 50, 40).unwrap();
        let b = engine.random_points(&bounds, 50, 40).unwrap();
        let c = engine.random_points(&bounds, 50, 41).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|p| bounds.contains(*p)));
    }

    #[test]
    fn test_reproject_nearest_identity_and_offset() {
        let engine = NdarrayEngine::new(false);
        let grid = metric_grid(4, 4, 10.0);
        let data = Array2::from_shape_fn((4, 4), |(i, j)| (i * 4 + j) as f32);
        let source = Raster::new(data, grid).unwrap();

        let fine = metric_grid(8, 8, 5.0);
        let out = engine.reproject(&source, &fine, Resampling::Nearest).unwrap();
        assert_eq!(out.data[[0, 0]], 0.0);
        assert_eq!(out.data[[1, 1]], 0.0);
        assert_eq!(out.data[[2, 2]], 5.0);
        assert_eq!(out.data[[7, 7]], 15.0);
    }

    fn disc(x: f64, y: f64, radius_m: f64) -> Polygon<f64> {
        CoordinateSystem::Projected { epsg: 32633 }.buffer(GeoPoint::new(x, y), radius_m, 64)
    }

    #[test]
    fn test_covered_area_clipped_by_mask() {
        let engine = NdarrayEngine::new(false);
        let grid = metric_grid(20, 20, 10.0);
        let mut data = Array2::from_elem((20, 20), 1.0f32);
        for row in 0..20 {
            for col in 10..20 {
                data[[row, col]] = f32::NAN;
            }
        }
        let mask = Raster::new(data, grid).unwrap();

        let site = disc(50.0, 100.0, 20.0);
        let inside = engine.covered_area(&mask, &site);
        assert_relative_eq!(inside, site.unsigned_area(), epsilon = 1e-3);

        // Centered on the mask edge: exactly half survives
        let halved = engine.covered_area(&mask, &disc(100.0, 100.0, 20.0));
        assert_relative_eq!(halved, 0.5 * inside, epsilon = 1e-3);

        let masked = engine.covered_area(&mask, &disc(150.0, 100.0, 20.0));
        assert_eq!(masked, 0.0);
    }

    #[test]
    fn test_mean_within_skips_masked_pixels() {
        let engine = NdarrayEngine::new(false);
        let grid = metric_grid(10, 10, 10.0);
        let mut data = Array2::from_elem((10, 10), 2.0f32);
        data[[5, 5]] = f32::NAN;
        data[[4, 4]] = 6.0;
        let raster = Raster::new(data, grid).unwrap();

        // Four pixel centers lie 7.07 m away; one of them is masked
        let mean = engine.mean_within(&raster, &disc(50.0, 50.0, 10.0)).unwrap();
        assert_relative_eq!(mean, 10.0 / 3.0, epsilon = 1e-9);

        // No center inside a 2 m disc: falls back to the pixel under its centroid
        assert!(engine.mean_within(&raster, &disc(52.0, 48.0, 2.0)).is_none());
        assert_relative_eq!(engine.mean_within(&raster, &disc(43.0, 57.0, 2.0)).unwrap(), 6.0, epsilon = 1e-9);

        let all_masked = Raster::filled(grid, f32::NAN);
        assert!(engine.mean_within(&all_masked, &disc(50.0, 50.0, 20.0)).is_none());
    }

    #[test]
    fn test_polygon_region_and_clip() {
        let engine = NdarrayEngine::new(false);
        let grid = metric_grid(10, 10, 10.0);
        let footprint = Footprint::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(30.0, 0.0),
            GeoPoint::new(30.0, 20.0),
            GeoPoint::new(0.0, 20.0),
        ]);

        let centers = engine.pixel_centers_within(&grid, &Region::Polygon(footprint.clone()));
        assert_eq!(centers.len(), 6);
        assert!(centers.iter().all(|p| p.x < 30.0 && p.y < 20.0));

        let clipped = engine.clip_to_polygon(&Raster::filled(grid, 1.0), &footprint);
        assert_eq!(clipped.valid_count(), 6);
        assert_eq!(clipped.data[[9, 0]], 1.0);
        assert!(clipped.data[[0, 0]].is_nan());
    }
}
