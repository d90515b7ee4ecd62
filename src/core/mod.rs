//! Core correction stages

pub mod collection;
pub mod correction;
pub mod engine;
pub mod layover_shadow;
pub mod look_geometry;
pub mod pipeline;
pub mod reference_area;
pub mod regression;
pub mod sampling;
pub mod stats;
pub mod terrain;

// Re-export main types
pub use collection::{SceneCollection, SceneSource};
pub use correction::{CorrectionApplicator, ReferenceAngle, ReferenceAngleResolver};
pub use engine::{NdarrayEngine, ProcessingEngine, Resampling};
pub use layover_shadow::{LayoverShadowMask, MaskBuilder, MaskStats, PixelGeometry};
pub use look_geometry::{local_incidence_angle, GeometryReconstructor, LookGeometry};
pub use pipeline::{
    AncillaryData, CorrectionOutput, CorrectionRequest, RunWarning, SceneFailure, SliacParams,
    SliacProcessor,
};
pub use reference_area::{ForestLayers, LandCoverYear, ReferenceArea, ReferenceAreaSelector};
pub use regression::{fit_line, RegressionEngine};
pub use sampling::{CalibrationSample, CalibrationSites, PolarizationSample, SampleFilter, SiteSelector};
pub use terrain::{SceneTerrain, TerrainModel};
