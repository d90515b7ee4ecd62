//! sliac: slope-based local incidence angle correction for Sentinel-1 backscatter
//!
//! Terrain makes radar backscatter depend on the local incidence angle (LIA)
//! between the beam and the ground surface. This library reconstructs the LIA
//! of each scene from a DEM and the scene footprint, fits the backscatter/LIA
//! trend over stable forest, and normalizes every pixel to a common reference
//! angle.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AcquisitionMode, Band, BoundingBox, CoordinateSystem, DataQualityFlag, FitResult, Footprint,
    GeoPoint, Grid, LinearFit, OrbitDirection, Polarization, Raster, Region, SarError, SarResult,
    Scene, SceneInfo,
};

pub use crate::core::{
    AncillaryData, CorrectionOutput, CorrectionRequest, ForestLayers, ReferenceAngle, SceneSource,
    SliacParams, SliacProcessor, TerrainModel,
};
pub use io::ManifestReader;

#[cfg(feature = "python")]
mod python {
    use crate::core::look_geometry::{self, LookGeometry};
    use crate::core::regression;
    use crate::types::{Footprint, GeoPoint, OrbitDirection};
    use ndarray::Zip;
    use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
    use pyo3::prelude::*;

    fn value_error(message: impl std::fmt::Display) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", message))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(look_azimuth, m)?)?;
        m.add_function(wrap_pyfunction!(local_incidence_angle, m)?)?;
        m.add_function(wrap_pyfunction!(fit_backscatter_trend, m)?)?;
        Ok(())
    }

    /// Look azimuth in degrees from footprint (x, y) vertices and the pass direction
    #[pyfunction]
    fn look_azimuth(footprint: Vec<(f64, f64)>, orbit: &str) -> PyResult<f64> {
        let orbit = OrbitDirection::parse(orbit).map_err(value_error)?;
        let footprint = Footprint::new(footprint.into_iter().map(|(x, y)| GeoPoint::new(x, y)).collect());
        let look = LookGeometry::from_footprint(&footprint, orbit).map_err(value_error)?;
        Ok(look.look_azimuth_deg)
    }

    /// LIA in degrees from slope/aspect (radians), incidence (degrees) and look azimuth (degrees)
    #[pyfunction]
    fn local_incidence_angle<'py>(
        py: Python<'py>,
        slope: PyReadonlyArray2<'py, f32>,
        aspect: PyReadonlyArray2<'py, f32>,
        incidence: PyReadonlyArray2<'py, f32>,
        look_azimuth_deg: f64,
    ) -> PyResult<&'py PyArray2<f32>> {
        let (slope, aspect, incidence) = (slope.as_array(), aspect.as_array(), incidence.as_array());
        if slope.shape() != aspect.shape() || slope.shape() != incidence.shape() {
            return Err(value_error("slope, aspect and incidence must have the same shape"));
        }

        let look = look_azimuth_deg.to_radians();
        let lia = Zip::from(&slope)
            .and(&aspect)
            .and(&incidence)
            .map_collect(|&s, &a, &theta| {
                look_geometry::local_incidence_angle(s as f64, a as f64, (theta as f64).to_radians(), look)
                    .to_degrees() as f32
            });
        Ok(lia.into_pyarray(py))
    }

    /// (slope, offset, r_squared, p_value) of backscatter against LIA
    #[pyfunction]
    fn fit_backscatter_trend(lia: Vec<f64>, backscatter: Vec<f64>) -> PyResult<(f64, f64, f64, Option<f64>)> {
        let fit = regression::fit_line(&lia, &backscatter).map_err(value_error)?;
        Ok((fit.slope, fit.offset, fit.r_squared, fit.p_value))
    }
}
