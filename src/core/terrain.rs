use crate::core::engine::{ProcessingEngine, Resampling};
use crate::types::{BoundingBox, Grid, Raster, SarError, SarResult, Scene, Band};
use ndarray::Array2;
use rayon::prelude::*;
use std::f32::consts::PI;

/// Slope, aspect and elevation over the area of interest
///
/// Slope and aspect are in radians; aspect is measured clockwise from north
/// (0 = north-facing, π/2 = east-facing). Shared read-only by every scene.
#[derive(Debug, Clone)]
pub struct TerrainModel {
    pub slope: Raster,
    pub aspect: Raster,
    pub elevation: Raster,
}

/// Terrain fields resampled onto one scene's grid
#[derive(Debug, Clone)]
pub struct SceneTerrain {
    pub slope: Raster,
    pub aspect: Raster,
    /// Ellipsoid incidence angle, degrees
    pub incidence: Raster,
}

impl TerrainModel {
    pub fn new(slope: Raster, aspect: Raster, elevation: Raster) -> SarResult<Self> {
        if slope.grid != aspect.grid {
            return Err(SarError::Processing(
                "Slope and aspect rasters must share a grid".to_string(),
            ));
        }
        Ok(Self { slope, aspect, elevation })
    }

    /// Derive slope and aspect from an elevation model using central differences
    pub fn from_dem(dem: Raster, parallel: bool) -> SarResult<Self> {
        log::info!("Deriving slope and aspect from {:?} DEM", dem.grid.shape);
        let (slope, aspect) = compute_slope_aspect(&dem, parallel)?;
        Ok(Self {
            slope: dem.with_data(slope)?,
            aspect: dem.with_data(aspect)?,
            elevation: dem,
        })
    }

    /// Clip slope and aspect to a box; LIA is only produced inside it
    pub fn clipped(self, bounds: &BoundingBox) -> Self {
        Self {
            slope: self.slope.mask_outside(bounds),
            aspect: self.aspect.mask_outside(bounds),
            elevation: self.elevation,
        }
    }

    /// Resample terrain (nearest neighbour) and the incidence band onto a scene grid
    pub fn for_scene<E: ProcessingEngine + ?Sized>(
        &self,
        engine: &E,
        scene: &Scene,
    ) -> SarResult<SceneTerrain> {
        let grid: Grid = scene.band(Band::VV)?.grid;
        log::debug!("Resampling terrain onto scene {} grid {:?}", scene.id(), grid.shape);

        let slope = engine.reproject(&self.slope, &grid, Resampling::Nearest)?;
        let aspect = engine.reproject(&self.aspect, &grid, Resampling::Nearest)?;
        let incidence = engine.reproject(scene.band(Band::Angle)?, &grid, Resampling::Bilinear)?;

        Ok(SceneTerrain { slope, aspect, incidence })
    }
}

/// Returns (slope_radians, aspect_radians)
fn compute_slope_aspect(dem: &Raster, parallel: bool) -> SarResult<(Array2<f32>, Array2<f32>)> {
    let (rows, cols) = dem.data.dim();
    if rows < 3 || cols < 3 {
        return Err(SarError::Processing("Array too small for edge filling".to_string()));
    }

    let row_values = |i: usize| -> Vec<(f32, f32)> {
        let (dx, dy) = dem.grid.ground_pixel_size(i);
        let (dx, dy) = (dx as f32, dy as f32);
        // Row index grows southwards on north-up grids
        let north_sign = if dem.grid.transform.pixel_height < 0.0 { 1.0 } else { -1.0 };
        let east_sign = if dem.grid.transform.pixel_width > 0.0 { 1.0 } else { -1.0 };
        (1..cols - 1)
            .map(|j| {
                let dz_east = east_sign * (dem.data[[i, j + 1]] - dem.data[[i, j - 1]]) / (2.0 * dx);
                let dz_north = north_sign * (dem.data[[i - 1, j]] - dem.data[[i + 1, j]]) / (2.0 * dy);

                let slope = (dz_east * dz_east + dz_north * dz_north).sqrt().atan();

                // Downslope direction, clockwise from north
                let mut aspect = (-dz_east).atan2(-dz_north);
                if aspect < 0.0 {
                    aspect += 2.0 * PI;
                }
                (slope, aspect)
            })
            .collect()
    };

    let interior: Vec<Vec<(f32, f32)>> = if parallel {
        (1..rows - 1).into_par_iter().map(row_values).collect()
    } else {
        (1..rows - 1).map(row_values).collect()
    };

    let mut slope = Array2::<f32>::zeros((rows, cols));
    let mut aspect = Array2::<f32>::zeros((rows, cols));
    for (offset, values) in interior.into_iter().enumerate() {
        let i = offset + 1;
        for (k, (s, a)) in values.into_iter().enumerate() {
            slope[[i, k + 1]] = s;
            aspect[[i, k + 1]] = a;
        }
    }

    fill_edges(&mut slope);
    fill_edges(&mut aspect);

    Ok((slope, aspect))
}

/// Fill edge values by copying from nearest interior pixels
fn fill_edges(array: &mut Array2<f32>) {
    let (rows, cols) = array.dim();

    for j in 0..cols {
        array[[0, j]] = array[[1, j]];
        array[[rows - 1, j]] = array[[rows - 2, j]];
    }

    for i in 0..rows {
        array[[i, 0]] = array[[i, 1]];
        array[[i, cols - 1]] = array[[i, cols - 2]];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordinateSystem, GeoTransform};
    use approx::assert_relative_eq;

    fn dem_from_fn(f: impl Fn(usize, usize) -> f32) -> Raster {
        let grid = Grid::new(
            GeoTransform::north_up(0.0, 100.0, 10.0, 10.0),
            (10, 10),
            CoordinateSystem::Projected { epsg: 32633 },
        )
        .unwrap();
        Raster::new(Array2::from_shape_fn((10, 10), |(i, j)| f(i, j)), grid).unwrap()
    }

    #[test]
    fn test_flat_dem_has_zero_slope() {
        let terrain = TerrainModel::from_dem(dem_from_fn(|_, _| 250.0), false).unwrap();
        assert!(terrain.slope.data.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_east_rising_plane_faces_west() {
        // 10 m rise per 10 m pixel eastwards: 45 degree slope
        let terrain = TerrainModel::from_dem(dem_from_fn(|_, j| j as f32 * 10.0), false).unwrap();
        assert_relative_eq!(terrain.slope.data[[5, 5]], PI / 4.0, epsilon = 1e-5);
        assert_relative_eq!(terrain.aspect.data[[5, 5]], 1.5 * PI, epsilon = 1e-5);
        // Edges copy their interior neighbour
        assert_relative_eq!(terrain.slope.data[[0, 0]], terrain.slope.data[[1, 1]]);
    }

    #[test]
    fn test_north_rising_plane_faces_south() {
        // Elevation grows towards row 0 (north)
        let terrain = TerrainModel::from_dem(dem_from_fn(|i, _| (9 - i) as f32 * 5.0), true).unwrap();
        assert_relative_eq!(terrain.aspect.data[[4, 4]], PI, epsilon = 1e-5);
        assert_relative_eq!(terrain.slope.data[[4, 4]], 0.5f32.atan(), epsilon = 1e-5);
    }

    #[test]
    fn test_tiny_dem_is_rejected() {
        let grid = Grid::new(
            GeoTransform::north_up(0.0, 20.0, 10.0, 10.0),
            (2, 2),
            CoordinateSystem::Projected { epsg: 32633 },
        )
        .unwrap();
        let dem = Raster::filled(grid, 1.0);
        assert!(TerrainModel::from_dem(dem, false).is_err());
    }
}
