use crate::core::collection::{SceneCollection, SceneSource};
use crate::core::correction::{CorrectionApplicator, ReferenceAngle, ReferenceAngleResolver};
use crate::core::engine::{NdarrayEngine, ProcessingEngine};
use crate::core::layover_shadow::MaskBuilder;
use crate::core::look_geometry::GeometryReconstructor;
use crate::core::reference_area::{ForestLayers, LandCoverYear, ReferenceAreaSelector};
use crate::core::regression::RegressionEngine;
use crate::core::sampling::{CalibrationSites, SampleFilter, SiteSelector};
use crate::core::terrain::TerrainModel;
use crate::types::{AcquisitionMode, Band, Region, SarError, SarResult, Scene};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Algorithm constants of a correction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliacParams {
    /// Random points drawn over the calibration box
    pub sample_points: usize,
    pub random_seed: u64,
    /// Buffer radius around each sample point (m)
    pub buffer_radius_m: f64,
    /// Valid pixels closer than this to a shadow/layover pixel are dropped (m)
    pub erosion_distance_m: f64,
    /// Tukey fence multiplier on the interquartile range
    pub tukey_multiplier: f64,
    /// Pixel size of the rasterised reference area (m)
    pub vectorize_scale_m: f64,
    /// Minimum canopy cover (%) for forest
    pub tree_cover_threshold: f32,
    /// Vertices of each circular buffer polygon
    pub buffer_segments: usize,
    /// Years with a land cover layer
    pub land_cover_years: RangeInclusive<i32>,
    pub enable_parallel: bool,
}

impl Default for SliacParams {
    fn default() -> Self {
        Self {
            sample_points: 1000,
            random_seed: 40,
            buffer_radius_m: 20.0,
            erosion_distance_m: 20.0,
            tukey_multiplier: 1.5,
            vectorize_scale_m: 30.0,
            tree_cover_threshold: 50.0,
            buffer_segments: 64,
            land_cover_years: 2015..=2019,
            enable_parallel: true,
        }
    }
}

impl SliacParams {
    pub fn with_sample_points(mut self, sample_points: usize) -> Self {
        self.sample_points = sample_points;
        self
    }

    pub fn with_random_seed(mut self, random_seed: u64) -> Self {
        self.random_seed = random_seed;
        self
    }

    pub fn with_buffer_radius(mut self, buffer_radius_m: f64) -> Self {
        self.buffer_radius_m = buffer_radius_m;
        self
    }

    pub fn with_erosion_distance(mut self, erosion_distance_m: f64) -> Self {
        self.erosion_distance_m = erosion_distance_m;
        self
    }

    pub fn with_tukey_multiplier(mut self, tukey_multiplier: f64) -> Self {
        self.tukey_multiplier = tukey_multiplier;
        self
    }

    pub fn with_parallel(mut self, enable_parallel: bool) -> Self {
        self.enable_parallel = enable_parallel;
        self
    }

    pub fn validate(&self) -> SarResult<()> {
        let positive = [
            ("buffer_radius_m", self.buffer_radius_m),
            ("vectorize_scale_m", self.vectorize_scale_m),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SarError::Configuration(format!("{} must be positive, got {}", name, value)));
            }
        }
        if !(self.erosion_distance_m >= 0.0) || !(self.tukey_multiplier >= 0.0) {
            return Err(SarError::Configuration(
                "erosion_distance_m and tukey_multiplier must be non-negative".to_string(),
            ));
        }
        if self.buffer_segments < 3 {
            return Err(SarError::Configuration(format!(
                "buffer_segments must be at least 3, got {}",
                self.buffer_segments
            )));
        }
        if self.sample_points == 0 {
            return Err(SarError::Configuration("sample_points must be at least 1".to_string()));
        }
        if self.land_cover_years.is_empty() {
            return Err(SarError::Configuration("land_cover_years is empty".to_string()));
        }
        Ok(())
    }

    fn parallel(&self) -> bool {
        self.enable_parallel && cfg!(feature = "parallel")
    }
}

/// Caller-facing parameters of one run
#[derive(Debug, Clone)]
pub struct CorrectionRequest {
    pub roi: Region,
    pub start: DateTime<Utc>,
    /// Exclusive
    pub end: DateTime<Utc>,
    /// Calendar year for the land cover layer and the forest loss cut-off
    pub target_year: i32,
    pub land_cover_class: u16,
    /// Buffer around the region bounds forming the calibration box (m)
    pub bounding_box_size_m: f64,
    pub reference_angle: ReferenceAngle,
    pub acquisition_mode: AcquisitionMode,
}

impl CorrectionRequest {
    pub fn new(
        roi: Region,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        target_year: i32,
        land_cover_class: u16,
    ) -> Self {
        Self {
            roi,
            start,
            end,
            target_year,
            land_cover_class,
            bounding_box_size_m: 10_000.0,
            reference_angle: ReferenceAngle::Auto,
            acquisition_mode: AcquisitionMode::IW,
        }
    }

    pub fn with_reference_angle(mut self, reference_angle: ReferenceAngle) -> Self {
        self.reference_angle = reference_angle;
        self
    }

    pub fn with_bounding_box_size(mut self, bounding_box_size_m: f64) -> Self {
        self.bounding_box_size_m = bounding_box_size_m;
        self
    }

    pub fn with_acquisition_mode(mut self, acquisition_mode: AcquisitionMode) -> Self {
        self.acquisition_mode = acquisition_mode;
        self
    }

    fn validate(&self) -> SarResult<()> {
        if self.start >= self.end {
            return Err(SarError::Configuration(format!(
                "Start date {} must precede end date {}",
                self.start, self.end
            )));
        }
        if !(self.bounding_box_size_m.is_finite() && self.bounding_box_size_m > 0.0) {
            return Err(SarError::Configuration(format!(
                "Bounding box size must be positive, got {}",
                self.bounding_box_size_m
            )));
        }
        Ok(())
    }
}

/// Terrain and forest layers shared read-only by every scene
#[derive(Debug, Clone)]
pub struct AncillaryData {
    pub terrain: TerrainModel,
    pub forest: ForestLayers,
}

/// Non-fatal run-level conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunWarning {
    LandCoverYearSubstituted { requested: i32, used: i32 },
}

/// A scene that could not be processed
#[derive(Debug)]
pub struct SceneFailure {
    pub scene_id: String,
    pub error: SarError,
}

/// Result of a correction run
#[derive(Debug)]
pub struct CorrectionOutput {
    /// Processed scenes sorted by acquisition time
    pub scenes: Vec<Scene>,
    pub failures: Vec<SceneFailure>,
    /// Degrees
    pub reference_angle: f64,
    pub warnings: Vec<RunWarning>,
    pub land_cover_year: LandCoverYear,
    pub calibration_sites: usize,
}

/// Slope-based local incidence angle correction processor
pub struct SliacProcessor<E: ProcessingEngine = NdarrayEngine> {
    engine: E,
    params: SliacParams,
}

impl SliacProcessor<NdarrayEngine> {
    pub fn new(params: SliacParams) -> Self {
        let engine = NdarrayEngine::new(params.parallel());
        Self { engine, params }
    }
}

impl<E: ProcessingEngine> SliacProcessor<E> {
    pub fn with_engine(engine: E, params: SliacParams) -> Self {
        Self { engine, params }
    }

    pub fn params(&self) -> &SliacParams {
        &self.params
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run the full correction
    ///
    /// Configuration errors stop the run. Failures of individual scenes are
    /// collected in [`CorrectionOutput::failures`].
    pub fn run(
        &self,
        request: &CorrectionRequest,
        source: SceneSource,
        ancillary: &AncillaryData,
    ) -> SarResult<CorrectionOutput> {
        log::info!("🚀 Starting slope-based incidence angle correction");
        self.params.validate()?;
        request.validate()?;

        let roi_bounds = request.roi.bounds()?;
        let crs = ancillary.terrain.slope.grid.crs;
        let calibration_box = roi_bounds.buffered(request.bounding_box_size_m, crs);
        log::debug!("Calibration box: {:?}", calibration_box);

        // Collection-wide inputs
        log::info!("Step 1: Selecting stable forest reference area");
        let reference = ReferenceAreaSelector::new(&self.engine, &self.params).select(
            &ancillary.forest,
            &calibration_box,
            request.land_cover_class,
            request.target_year,
        )?;
        let mut warnings = Vec::new();
        if reference.land_cover_year.substituted() {
            warnings.push(RunWarning::LandCoverYearSubstituted {
                requested: reference.land_cover_year.requested,
                used: reference.land_cover_year.used,
            });
        }

        log::info!("Step 2: Drawing calibration sites");
        let sites = SiteSelector::new(&self.engine, &self.params).select(&reference)?;
        if sites.is_empty() {
            log::warn!("No calibration site survived; every regression will be degenerate");
        }

        let terrain = ancillary.terrain.clone().clipped(&calibration_box);

        let collection = source.resolve(request.acquisition_mode, &roi_bounds, request.start, request.end);
        let (ascending, descending) = collection.split_by_orbit();
        log::info!(
            "Step 3: Processing {} ascending and {} descending scenes",
            ascending.len(),
            descending.len()
        );
        let collection = descending.merge(ascending).sorted_by_time();
        if collection.is_empty() {
            return Err(SarError::Processing("No scenes match the request".to_string()));
        }
        let total = collection.len();

        let (calibrated, mut failures) =
            self.partition(self.for_each_scene(collection, |scene| self.calibrate_scene(scene, &terrain, &sites)));
        if calibrated.is_empty() {
            return Err(SarError::Processing(format!("All {} scenes failed to calibrate", total)));
        }

        // Barrier: every scene has its LIA band
        log::info!("Step 4: Resolving reference angle");
        let reference_angle = ReferenceAngleResolver::new(&self.engine).resolve(
            request.reference_angle,
            &calibrated,
            &request.roi,
        )?;

        log::info!("Step 5: Applying correction at {:.3}°", reference_angle);
        let applicator = CorrectionApplicator::new(self.params.parallel());
        let (corrected, correction_failures) = self.partition(self.for_each_scene(
            SceneCollection::new(calibrated),
            |scene| applicator.apply(scene, reference_angle),
        ));
        failures.extend(correction_failures);

        let scenes = SceneCollection::new(corrected).sorted_by_time().into_scenes();

        log::info!("✅ Correction completed");
        log::info!("   Scenes corrected: {}/{}", scenes.len(), total);
        log::info!("   Reference angle: {:.3}°", reference_angle);
        if !failures.is_empty() {
            log::info!("   Failed scenes: {}", failures.len());
        }

        Ok(CorrectionOutput {
            scenes,
            failures,
            reference_angle,
            warnings,
            land_cover_year: reference.land_cover_year,
            calibration_sites: sites.len(),
        })
    }

    /// Stage A for one scene: LIA, shadow/layover mask, calibration sample and regression
    pub fn calibrate_scene(
        &self,
        scene: Scene,
        terrain: &TerrainModel,
        sites: &CalibrationSites,
    ) -> SarResult<Scene> {
        if let Some(missing) = [Band::VV, Band::VH, Band::Angle].into_iter().find(|&b| !scene.has_band(b)) {
            return Err(SarError::DataQuality {
                scene_id: scene.id().to_string(),
                reason: format!("missing {} band", missing),
            });
        }

        let scene_terrain = terrain.for_scene(&self.engine, &scene)?;
        let scene = GeometryReconstructor::new(&self.engine).reconstruct(scene, &scene_terrain)?;
        let look = scene.metadata.look_angle_azimuth.ok_or_else(|| SarError::Geometry {
            scene_id: scene.id().to_string(),
            reason: "look azimuth missing after reconstruction".to_string(),
        })?;

        let masker = MaskBuilder::new(&self.engine, self.params.erosion_distance_m, self.params.parallel());
        let mask = masker.build(&scene_terrain, look)?;
        let scene = masker.apply(scene, &mask, &scene_terrain)?;

        let sample = SampleFilter::new(&self.engine, &self.params).extract(&scene, sites, &terrain.elevation)?;
        RegressionEngine::new().apply(scene, &sample)
    }

    fn for_each_scene<F>(&self, collection: SceneCollection, stage: F) -> Vec<(String, SarResult<Scene>)>
    where
        F: Fn(Scene) -> SarResult<Scene> + Send + Sync,
    {
        let run = |scene: Scene| {
            let id = scene.id().to_string();
            (id, stage(scene))
        };
        let scenes = collection.into_scenes();
        if self.params.parallel() {
            scenes.into_par_iter().map(run).collect()
        } else {
            scenes.into_iter().map(run).collect()
        }
    }

    fn partition(&self, results: Vec<(String, SarResult<Scene>)>) -> (Vec<Scene>, Vec<SceneFailure>) {
        let mut scenes = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (scene_id, result) in results {
            match result {
                Ok(scene) => scenes.push(scene),
                Err(error) => {
                    log::warn!("Scene {} failed: {}", scene_id, error);
                    failures.push(SceneFailure { scene_id, error });
                }
            }
        }
        (scenes, failures)
    }
}
