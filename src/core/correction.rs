use crate::core::engine::ProcessingEngine;
use crate::core::stats;
use crate::types::{
    Band, DataQualityFlag, GeoPoint, Polarization, Raster, Region, SarError, SarResult, Scene,
};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Incidence angle every scene is normalized to
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ReferenceAngle {
    /// Midpoint of the maximum and minimum LIA observed at the region of interest
    #[default]
    Auto,
    /// Degrees
    Fixed(f64),
}

pub struct ReferenceAngleResolver<'a, E: ProcessingEngine + ?Sized> {
    engine: &'a E,
}

impl<'a, E: ProcessingEngine + ?Sized> ReferenceAngleResolver<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    /// Resolve the angle once for the whole collection; every scene must carry its LIA band
    pub fn resolve(&self, angle: ReferenceAngle, scenes: &[Scene], roi: &Region) -> SarResult<f64> {
        match angle {
            ReferenceAngle::Fixed(degrees) => {
                if !degrees.is_finite() {
                    return Err(SarError::Configuration(format!(
                        "Reference angle must be finite, got {}",
                        degrees
                    )));
                }
                Ok(degrees)
            }
            ReferenceAngle::Auto => self.midpoint(scenes, roi),
        }
    }

    fn midpoint(&self, scenes: &[Scene], roi: &Region) -> SarResult<f64> {
        let first = scenes.first().ok_or_else(|| {
            SarError::Processing("Cannot resolve a reference angle without scenes".to_string())
        })?;
        let grid = first.band(Band::Lia)?.grid;

        let mut locations = self.engine.pixel_centers_within(&grid, roi);
        if locations.is_empty() {
            // Region smaller than a pixel
            locations.push(roi.bounds()?.center());
        }

        let lia_bands = scenes
            .iter()
            .map(|s| s.band(Band::Lia))
            .collect::<SarResult<Vec<_>>>()?;

        // Per-location max/min over the collection, then the spatial mean of each
        let (mut maxima, mut minima) = (Vec::new(), Vec::new());
        for &location in &locations {
            if let Some((max, min)) = self.extremes_at(&lia_bands, location) {
                maxima.push(max);
                minima.push(min);
            }
        }

        let max = stats::mean(&maxima);
        let min = stats::mean(&minima);
        match (max, min) {
            (Some(max), Some(min)) => {
                let angle = 0.5 * (max + min);
                log::info!(
                    "📐 Reference angle {:.3}° (LIA max {:.3}°, min {:.3}° over {} scenes)",
                    angle,
                    max,
                    min,
                    scenes.len()
                );
                Ok(angle)
            }
            _ => Err(SarError::Processing(
                "No valid LIA at the region of interest to resolve the reference angle".to_string(),
            )),
        }
    }

    fn extremes_at(&self, lia_bands: &[&Raster], location: GeoPoint) -> Option<(f64, f64)> {
        lia_bands
            .iter()
            .filter_map(|lia| self.engine.sample(lia, location))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((max, min)) => Some((f64::max(max, v), f64::min(min, v))),
            })
    }
}

/// `corrected = raw - slope·(LIA - reference)` per pixel
pub fn correct_value(raw: f32, lia: f32, slope: f64, reference_angle: f64) -> f32 {
    (raw as f64 - slope * (lia as f64 - reference_angle)) as f32
}

pub struct CorrectionApplicator {
    parallel: bool,
}

impl CorrectionApplicator {
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    /// Add `corrected_VV` / `corrected_VH`; a polarization without a defined fit is flagged instead
    pub fn apply(&self, mut scene: Scene, reference_angle: f64) -> SarResult<Scene> {
        let lia = scene.band(Band::Lia)?.clone();

        for pol in Polarization::CORRECTED {
            let slope = scene.fit(pol).and_then(|f| f.fit).map(|fit| fit.slope);
            let Some(slope) = slope else {
                log::warn!("Scene {} left uncorrected for {}", scene.id(), pol);
                scene
                    .metadata
                    .quality_flags
                    .push(DataQualityFlag::Uncorrected { polarization: pol });
                continue;
            };

            let raw = scene.band(Band::backscatter(pol)?)?;
            if raw.grid != lia.grid {
                return Err(SarError::Processing(format!(
                    "Scene {}: {} and LIA bands are on different grids",
                    scene.id(),
                    pol
                )));
            }

            let mut corrected = raw.data.clone();
            let kernel = |out: &mut f32, &angle: &f32| {
                *out = correct_value(*out, angle, slope, reference_angle);
            };
            if self.parallel {
                Zip::from(&mut corrected).and(&lia.data).par_for_each(kernel);
            } else {
                Zip::from(&mut corrected).and(&lia.data).for_each(kernel);
            }

            let band = raw.with_data(corrected)?;
            scene = scene.with_band(Band::corrected(pol)?, band);
        }
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::NdarrayEngine;
    use crate::types::{
        AcquisitionMode, CoordinateSystem, FitResult, Footprint, GeoTransform, Grid, LinearFit,
        OrbitDirection, SceneInfo,
    };
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn grid() -> Grid {
        Grid::new(
            GeoTransform::north_up(0.0, 30.0, 10.0, 10.0),
            (3, 3),
            CoordinateSystem::Projected { epsg: 32633 },
        )
        .unwrap()
    }

    fn scene(id: &str, lia: impl Fn(usize, usize) -> f32) -> Scene {
        let info = SceneInfo {
            id: id.to_string(),
            acquisition_time: Utc.with_ymd_and_hms(2019, 6, 1, 5, 0, 0).unwrap(),
            orbit: OrbitDirection::Ascending,
            mode: AcquisitionMode::IW,
            polarizations: vec![Polarization::VV, Polarization::VH],
            footprint: Footprint::new(vec![]),
        };
        let g = grid();
        Scene::new(info)
            .with_band(Band::Lia, Raster::new(Array2::from_shape_fn((3, 3), |(i, j)| lia(i, j)), g).unwrap())
            .with_band(Band::VV, Raster::filled(g, -8.0))
            .with_band(Band::VH, Raster::filled(g, -15.0))
    }

    fn fitted(mut scene: Scene, vv: Option<f64>, vh: Option<f64>) -> Scene {
        for (pol, slope) in [(Polarization::VV, vv), (Polarization::VH, vh)] {
            scene.metadata.fits.insert(
                pol,
                FitResult {
                    polarization: pol,
                    sample_count: 10,
                    lia_range: None,
                    lia_iqr: None,
                    fit: slope.map(|slope| LinearFit { slope, offset: 0.0, r_squared: 0.5, p_value: None }),
                },
            );
        }
        scene
    }

    #[test]
    fn test_fixed_angle_is_used_unchanged() {
        let engine = NdarrayEngine::new(false);
        let resolver = ReferenceAngleResolver::new(&engine);
        let roi = Region::Point(GeoPoint::new(15.0, 15.0));
        assert_eq!(resolver.resolve(ReferenceAngle::Fixed(37.5), &[], &roi).unwrap(), 37.5);
    }

    #[test]
    fn test_auto_angle_is_midpoint_of_extremes() {
        let engine = NdarrayEngine::new(false);
        let resolver = ReferenceAngleResolver::new(&engine);
        let scenes = vec![scene("a", |_, _| 31.0), scene("b", |_, _| 44.0), scene("c", |_, _| 38.0)];
        let roi = Region::Point(GeoPoint::new(15.0, 15.0));
        let angle = resolver.resolve(ReferenceAngle::Auto, &scenes, &roi).unwrap();
        assert_relative_eq!(angle, 37.5);
    }

    #[test]
    fn test_auto_angle_averages_over_polygon() {
        let engine = NdarrayEngine::new(false);
        let resolver = ReferenceAngleResolver::new(&engine);
        // Column-dependent LIA: max per pixel from scene b, min from scene a
        let scenes = vec![scene("a", |_, j| 30.0 + j as f32), scene("b", |_, j| 40.0 + 2.0 * j as f32)];
        let roi = Region::Polygon(Footprint::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(20.0, 0.0),
            GeoPoint::new(20.0, 30.0),
            GeoPoint::new(0.0, 30.0),
        ]));
        // Columns 0 and 1: max mean 41, min mean 30.5
        let angle = resolver.resolve(ReferenceAngle::Auto, &scenes, &roi).unwrap();
        assert_relative_eq!(angle, 35.75);
    }

    #[test]
    fn test_correction_matches_formula() {
        let s = fitted(scene("a", |i, j| 30.0 + (i * 3 + j) as f32), Some(-0.12), Some(-0.2));
        let corrected = CorrectionApplicator::new(true).apply(s, 35.0).unwrap();

        let lia = corrected.band(Band::Lia).unwrap();
        let vv = corrected.band(Band::CorrectedVV).unwrap();
        let vh = corrected.band(Band::CorrectedVH).unwrap();
        for ((i, j), &angle) in lia.data.indexed_iter() {
            assert_eq!(vv.data[[i, j]], correct_value(-8.0, angle, -0.12, 35.0));
            assert_eq!(vh.data[[i, j]], correct_value(-15.0, angle, -0.2, 35.0));
        }
        assert_relative_eq!(vv.data[[0, 0]], -8.0 - 0.6, epsilon = 1e-5);
        assert!(corrected.metadata.quality_flags.is_empty());
    }

    #[test]
    fn test_undefined_fit_leaves_band_out_and_flags() {
        let s = fitted(scene("a", |_, _| 33.0), Some(-0.1), None);
        let corrected = CorrectionApplicator::new(false).apply(s, 35.0).unwrap();
        assert!(corrected.has_band(Band::CorrectedVV));
        assert!(!corrected.has_band(Band::CorrectedVH));
        assert_eq!(
            corrected.metadata.quality_flags,
            vec![DataQualityFlag::Uncorrected { polarization: Polarization::VH }]
        );
    }

    #[test]
    fn test_masked_pixels_stay_masked() {
        let s = fitted(scene("a", |i, _| if i == 0 { f32::NAN } else { 36.0 }), Some(-0.1), Some(-0.1));
        let corrected = CorrectionApplicator::new(false).apply(s, 35.0).unwrap();
        let vv = corrected.band(Band::CorrectedVV).unwrap();
        assert!(vv.data[[0, 1]].is_nan());
        assert!(vv.data[[2, 1]].is_finite());
    }
}
