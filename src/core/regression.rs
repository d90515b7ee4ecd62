use crate::core::sampling::{CalibrationSample, PolarizationSample};
use crate::core::stats;
use crate::types::{DataQualityFlag, FitResult, LinearFit, Polarization, SarResult, Scene};

/// Fewest pairs a line can be fitted through
pub const MIN_REGRESSION_SAMPLES: usize = 2;

/// Fit `backscatter = slope·lia + offset`
///
/// Returns the reason when the fit is undefined.
pub fn fit_line(lia: &[f64], backscatter: &[f64]) -> Result<LinearFit, String> {
    if lia.len() != backscatter.len() {
        return Err(format!(
            "mismatched sample lengths {} and {}",
            lia.len(),
            backscatter.len()
        ));
    }
    if lia.len() < MIN_REGRESSION_SAMPLES {
        return Err(format!(
            "{} samples, need at least {}",
            lia.len(),
            MIN_REGRESSION_SAMPLES
        ));
    }
    let (slope, offset) =
        stats::least_squares(lia, backscatter).ok_or_else(|| "no LIA variance".to_string())?;

    // Constant backscatter gives a flat, perfectly defined line with no correlation
    let (r_squared, p_value) = match stats::pearson(lia, backscatter) {
        Some(r) => (r * r, stats::correlation_p_value(r, lia.len())),
        None => (0.0, None),
    };

    Ok(LinearFit { slope, offset, r_squared, p_value })
}

/// Per-polarization regressions for a scene
#[derive(Debug, Clone, Default)]
pub struct RegressionEngine;

impl RegressionEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn fit(&self, sample: &PolarizationSample) -> (FitResult, Option<DataQualityFlag>) {
        let lia_range = sample.lia_range();
        let lia_iqr = sample.lia_iqr();
        match fit_line(&sample.lia, &sample.backscatter) {
            Ok(fit) => (
                FitResult {
                    polarization: sample.polarization,
                    sample_count: sample.len(),
                    lia_range,
                    lia_iqr,
                    fit: Some(fit),
                },
                None,
            ),
            Err(reason) => (
                FitResult {
                    polarization: sample.polarization,
                    sample_count: sample.len(),
                    lia_range,
                    lia_iqr,
                    fit: None,
                },
                Some(DataQualityFlag::DegenerateRegression {
                    polarization: sample.polarization,
                    sample_count: sample.len(),
                    reason,
                }),
            ),
        }
    }

    /// Attach fits, flags and the mean site elevation to the scene metadata
    pub fn apply(&self, mut scene: Scene, sample: &CalibrationSample) -> SarResult<Scene> {
        for pol in Polarization::CORRECTED {
            let (result, flag) = self.fit(sample.polarization(pol)?);
            match (&result.fit, &flag) {
                (Some(fit), _) => log::debug!(
                    "Scene {} {}: slope {:.4} dB/°, offset {:.3} dB, R² {:.3}, n = {}",
                    scene.id(),
                    pol,
                    fit.slope,
                    fit.offset,
                    fit.r_squared,
                    result.sample_count
                ),
                (None, Some(DataQualityFlag::DegenerateRegression { reason, .. })) => log::warn!(
                    "Scene {} {}: regression undefined ({})",
                    scene.id(),
                    pol,
                    reason
                ),
                _ => {}
            }
            scene.metadata.fits.insert(pol, result);
            if let Some(flag) = flag {
                scene.metadata.quality_flags.push(flag);
            }
        }
        scene.metadata.mean_elevation = sample.mean_elevation;
        Ok(scene)
    }
}
