#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use ndarray::Array2;
use sliac::core::look_geometry::{local_incidence_angle, LookGeometry};
use sliac::core::{AncillaryData, ForestLayers, TerrainModel};
use sliac::{
    AcquisitionMode, Band, CoordinateSystem, Footprint, GeoPoint, Grid, OrbitDirection,
    Polarization, Raster, Scene, SceneInfo,
};
use sliac::types::GeoTransform;
use std::collections::BTreeMap;

pub const CRS: CoordinateSystem = CoordinateSystem::Projected { epsg: 32633 };
pub const SIZE: usize = 120;
pub const PIXEL_M: f64 = 10.0;
pub const INCIDENCE_DEG: f32 = 38.0;
pub const FOREST_CLASS: u16 = 111;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 1.2 km square with 10 m pixels, origin at (0, 0)
pub fn grid() -> Grid {
    Grid::new(
        GeoTransform::north_up(0.0, SIZE as f64 * PIXEL_M, PIXEL_M, PIXEL_M),
        (SIZE, SIZE),
        CRS,
    )
    .expect("valid test grid")
}

pub fn raster(f: impl Fn(usize, usize) -> f32) -> Raster {
    Raster::new(Array2::from_shape_fn((SIZE, SIZE), |(i, j)| f(i, j)), grid()).expect("valid test raster")
}

/// Region of interest at the centre of the grid
pub fn roi_point() -> GeoPoint {
    GeoPoint::new(600.0, 600.0)
}

/// East-facing terrain whose slope grows with the column index
pub fn tilted_terrain() -> TerrainModel {
    TerrainModel::new(
        raster(|_, j| (2.0 + 0.15 * j as f32).to_radians()),
        raster(|_, _| 90f32.to_radians()),
        raster(|_, _| 300.0),
    )
    .expect("terrain rasters share a grid")
}

pub fn flat_terrain() -> TerrainModel {
    TerrainModel::new(raster(|_, _| 0.0), raster(|_, _| 0.0), raster(|_, _| 300.0))
        .expect("terrain rasters share a grid")
}

/// Dense, never-lost forest of the reference class over [300, 900) m in both axes
pub fn forest_layers() -> ForestLayers {
    let grid = grid();
    let tree_cover = raster(|i, j| {
        let p = grid.pixel_center(i, j);
        if (300.0..900.0).contains(&p.x) && (300.0..900.0).contains(&p.y) {
            85.0
        } else {
            10.0
        }
    });
    let land_cover = (2015..=2019)
        .map(|year| (year, raster(|_, _| FOREST_CLASS as f32)))
        .collect::<BTreeMap<_, _>>();
    ForestLayers {
        tree_cover,
        loss_year: raster(|_, _| 0.0),
        land_cover,
    }
}

pub fn ancillary(terrain: TerrainModel) -> AncillaryData {
    AncillaryData { terrain, forest: forest_layers() }
}

/// Swath polygons covering the whole grid, tilted like real S1 frames
pub fn footprint(orbit: OrbitDirection) -> Footprint {
    let corners: [(f64, f64); 4] = match orbit {
        OrbitDirection::Ascending => [(-200.0, -400.0), (1500.0, -200.0), (1400.0, 1600.0), (-300.0, 1400.0)],
        OrbitDirection::Descending => [(-200.0, 1600.0), (1500.0, 1400.0), (1400.0, -300.0), (-300.0, -200.0)],
    };
    Footprint::new(corners.iter().map(|&(x, y)| GeoPoint::new(x, y)).collect())
}

/// LIA as the geometry stage computes it for one pixel
pub fn expected_lia(terrain: &TerrainModel, look: &LookGeometry, i: usize, j: usize) -> f32 {
    local_incidence_angle(
        terrain.slope.data[[i, j]] as f64,
        terrain.aspect.data[[i, j]] as f64,
        (INCIDENCE_DEG as f64).to_radians(),
        look.look_azimuth_rad(),
    )
    .to_degrees() as f32
}

/// Dual-pol scene whose backscatter is an exact function of its LIA
pub fn scene(
    id: &str,
    day: u32,
    orbit: OrbitDirection,
    terrain: &TerrainModel,
    vv: impl Fn(f32) -> f32,
    vh: impl Fn(f32) -> f32,
) -> Scene {
    let footprint = footprint(orbit);
    let look = LookGeometry::from_footprint(&footprint, orbit).expect("tilted footprint is not degenerate");
    let lia = Array2::from_shape_fn((SIZE, SIZE), |(i, j)| expected_lia(terrain, &look, i, j));

    let info = SceneInfo {
        id: id.to_string(),
        acquisition_time: Utc.with_ymd_and_hms(2019, 7, day, 5, 30, 0).unwrap(),
        orbit,
        mode: AcquisitionMode::IW,
        polarizations: vec![Polarization::VV, Polarization::VH],
        footprint,
    };
    Scene::new(info)
        .with_band(Band::VV, raster(|i, j| vv(lia[[i, j]])))
        .with_band(Band::VH, raster(|i, j| vh(lia[[i, j]])))
        .with_band(Band::Angle, raster(|_, _| INCIDENCE_DEG))
}

/// VV trend of -0.12 dB per degree, -8 dB at 35°
pub fn vv_trend(lia: f32) -> f32 {
    (-8.0 - 0.12 * (lia as f64 - 35.0)) as f32
}

/// VH trend of -0.2 dB per degree, -15 dB at 35°
pub fn vh_trend(lia: f32) -> f32 {
    (-15.0 - 0.2 * (lia as f64 - 35.0)) as f32
}
