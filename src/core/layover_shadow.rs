use crate::core::engine::{ProcessingEngine, Resampling};
use crate::core::terrain::SceneTerrain;
use crate::types::{Band, SarError, SarResult, Scene};
use ndarray::{Array2, Zip};
use std::f64::consts::FRAC_PI_2;

/// Geometric class of a pixel as seen by the radar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelGeometry {
    Valid,
    Shadow,
    Layover,
    /// Missing slope, aspect or incidence
    NoData,
}

/// Classify one pixel (all angles in radians)
///
/// The terrain slope component along the look direction is
/// α_r = atan(tan(s)·cos(φ − a)). Shadow when α_r ≤ −(π/2 − θ), layover when α_r ≥ θ.
pub fn classify_pixel(slope: f64, aspect: f64, incidence: f64, look_azimuth: f64) -> PixelGeometry {
    if !(slope.is_finite() && aspect.is_finite() && incidence.is_finite()) {
        return PixelGeometry::NoData;
    }
    let relative_azimuth = look_azimuth - aspect;
    let alpha_r = (slope.tan() * relative_azimuth.cos()).atan();

    if !(alpha_r > -(FRAC_PI_2 - incidence)) {
        PixelGeometry::Shadow
    } else if !(alpha_r < incidence) {
        PixelGeometry::Layover
    } else {
        PixelGeometry::Valid
    }
}

/// Pixel counts of a mask build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskStats {
    pub total: usize,
    pub shadow: usize,
    pub layover: usize,
    pub no_data: usize,
    /// Geometrically valid pixels removed by erosion
    pub eroded: usize,
    pub valid: usize,
}

impl MaskStats {
    pub fn valid_percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.valid as f64 / self.total as f64 * 100.0
        }
    }
}

/// Eroded validity mask on a scene grid
#[derive(Debug, Clone)]
pub struct LayoverShadowMask {
    /// true where the pixel survives shadow, layover and erosion
    pub valid: Array2<bool>,
    pub stats: MaskStats,
}

pub struct MaskBuilder<'a, E: ProcessingEngine + ?Sized> {
    engine: &'a E,
    erosion_distance_m: f64,
    parallel: bool,
}

impl<'a, E: ProcessingEngine + ?Sized> MaskBuilder<'a, E> {
    pub fn new(engine: &'a E, erosion_distance_m: f64, parallel: bool) -> Self {
        Self { engine, erosion_distance_m, parallel }
    }

    /// Classify every pixel, then keep valid pixels farther than the erosion distance from any invalid one
    pub fn build(&self, terrain: &SceneTerrain, look_azimuth_deg: f64) -> SarResult<LayoverShadowMask> {
        let look = look_azimuth_deg.to_radians();
        let shape = terrain.slope.data.dim();
        if terrain.aspect.data.dim() != shape || terrain.incidence.data.dim() != shape {
            return Err(SarError::Processing(
                "Terrain and incidence rasters must share the scene grid".to_string(),
            ));
        }

        let mut classes = Array2::from_elem(shape, PixelGeometry::NoData);
        let kernel = |class: &mut PixelGeometry, &slope: &f32, &aspect: &f32, &incidence: &f32| {
            *class = classify_pixel(
                slope as f64,
                aspect as f64,
                (incidence as f64).to_radians(),
                look,
            );
        };
        let zip = Zip::from(&mut classes)
            .and(&terrain.slope.data)
            .and(&terrain.aspect.data)
            .and(&terrain.incidence.data);
        if self.parallel {
            zip.par_for_each(kernel);
        } else {
            zip.for_each(kernel);
        }

        let mut stats = MaskStats { total: classes.len(), ..Default::default() };
        for class in classes.iter() {
            match class {
                PixelGeometry::Shadow => stats.shadow += 1,
                PixelGeometry::Layover => stats.layover += 1,
                PixelGeometry::NoData => stats.no_data += 1,
                PixelGeometry::Valid => {}
            }
        }

        let geometric = classes.mapv(|c| c == PixelGeometry::Valid);
        let valid = if self.erosion_distance_m > 0.0 {
            let distance = self.engine.distance_to_invalid(&geometric, &terrain.slope.grid)?;
            let erosion = self.erosion_distance_m as f32;
            let mut eroded = geometric.clone();
            Zip::from(&mut eroded).and(&distance).for_each(|keep, &d| {
                *keep = *keep && d > erosion;
            });
            eroded
        } else {
            geometric.clone()
        };

        stats.valid = valid.iter().filter(|&&v| v).count();
        stats.eroded = geometric.iter().filter(|&&v| v).count() - stats.valid;

        log::debug!(
            "Shadow/layover mask: {} shadow, {} layover, {} no-data, {} eroded, {:.1}% valid",
            stats.shadow,
            stats.layover,
            stats.no_data,
            stats.eroded,
            stats.valid_percentage()
        );

        Ok(LayoverShadowMask { valid, stats })
    }

    /// Mask the VV, VH and angle bands; the angle band is replaced by its resampled, masked version
    pub fn apply(&self, mut scene: Scene, mask: &LayoverShadowMask, terrain: &SceneTerrain) -> SarResult<Scene> {
        let grid = terrain.slope.grid;
        for band in [Band::VV, Band::VH] {
            let Some(raster) = scene.bands.get(&band) else {
                continue;
            };
            let on_grid = if raster.grid == grid {
                raster.clone()
            } else {
                self.engine.reproject(raster, &grid, Resampling::Nearest)?
            };
            let masked = on_grid.apply_mask(&mask.valid)?;
            scene.bands.insert(band, masked);
        }
        let angle = terrain.incidence.apply_mask(&mask.valid)?;
        scene.bands.insert(Band::Angle, angle);
        Ok(scene)
    }
}
