use crate::core::engine::{ProcessingEngine, Resampling};
use crate::core::pipeline::SliacParams;
use crate::types::{BoundingBox, GeoPoint, Grid, Raster, SarError, SarResult};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Base year of the forest-loss year codes
pub const LOSS_EPOCH: i32 = 2000;

/// Forest cover, forest loss and land cover classification layers
#[derive(Debug, Clone)]
pub struct ForestLayers {
    /// Canopy cover, percent
    pub tree_cover: Raster,
    /// Year of canopy loss as years since 2000; 0 or NaN means no loss
    pub loss_year: Raster,
    /// Discrete land cover classification per calendar year
    pub land_cover: BTreeMap<i32, Raster>,
}

/// Land cover year actually used for a requested target year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandCoverYear {
    pub requested: i32,
    pub used: i32,
}

impl LandCoverYear {
    pub fn substituted(&self) -> bool {
        self.requested != self.used
    }
}

/// Map a target year onto the available land cover span
///
/// The year just before the span uses the first available layer. Any other
/// year outside the span is a configuration error.
pub fn resolve_land_cover_year(requested: i32, span: &RangeInclusive<i32>) -> SarResult<LandCoverYear> {
    if span.contains(&requested) {
        return Ok(LandCoverYear { requested, used: requested });
    }
    if requested == span.start() - 1 {
        log::warn!(
            "Land cover is not available for {}; using the {} layer",
            requested,
            span.start()
        );
        return Ok(LandCoverYear { requested, used: *span.start() });
    }
    Err(SarError::Configuration(format!(
        "Land cover is not available for {}, use a year between {} and {}",
        requested,
        span.start() - 1,
        span.end()
    )))
}

/// Stable forest pixels of the selected land cover class
#[derive(Debug, Clone)]
pub struct ReferenceArea {
    /// 1.0 on reference pixels, NaN elsewhere
    pub mask: Raster,
    pub bounds: BoundingBox,
    pub land_cover_year: LandCoverYear,
    pub stats: ReferenceAreaStats,
}

impl ReferenceArea {
    pub fn contains(&self, point: GeoPoint) -> bool {
        self.mask.value_at(point).is_some()
    }

    pub fn pixel_count(&self) -> usize {
        self.mask.valid_count()
    }
}

/// Pixel counts after each successive mask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAreaStats {
    pub total: usize,
    pub forest: usize,
    pub stable_forest: usize,
    pub reference: usize,
}

pub struct ReferenceAreaSelector<'a, E: ProcessingEngine + ?Sized> {
    engine: &'a E,
    params: &'a SliacParams,
}

impl<'a, E: ProcessingEngine + ?Sized> ReferenceAreaSelector<'a, E> {
    pub fn new(engine: &'a E, params: &'a SliacParams) -> Self {
        Self { engine, params }
    }

    /// Land cover class ∩ canopy cover ≥ threshold ∩ no loss up to the target year,
    /// rasterised at the vectorisation scale over the calibration box
    pub fn select(
        &self,
        layers: &ForestLayers,
        calibration_box: &BoundingBox,
        land_cover_class: u16,
        target_year: i32,
    ) -> SarResult<ReferenceArea> {
        let land_cover_year = resolve_land_cover_year(target_year, &self.params.land_cover_years)?;
        let land_cover = layers.land_cover.get(&land_cover_year.used).ok_or_else(|| {
            SarError::Configuration(format!(
                "No land cover layer supplied for {}",
                land_cover_year.used
            ))
        })?;

        log::info!(
            "🌲 Selecting reference forest (class {}, year {})",
            land_cover_class,
            land_cover_year.used
        );

        let grid = Grid::from_bounds(
            calibration_box,
            self.params.vectorize_scale_m,
            layers.tree_cover.grid.crs,
        )?;
        let tree_cover = self.engine.reproject(&layers.tree_cover, &grid, Resampling::Nearest)?;
        let loss_year = self.engine.reproject(&layers.loss_year, &grid, Resampling::Nearest)?;
        let land_cover = self.engine.reproject(land_cover, &grid, Resampling::Nearest)?;

        let threshold = self.params.tree_cover_threshold;
        let forest = tree_cover.data.mapv(|tc| tc.is_finite() && tc >= threshold);

        let loss_code = (land_cover_year.used - LOSS_EPOCH) as f32;
        let not_lost = loss_year.data.mapv(|loss| {
            // Missing loss counts as no loss
            let loss = if loss.is_finite() { loss } else { 0.0 };
            loss < 1.0 || loss > loss_code
        });

        let class = land_cover_class as f32;
        let in_class = land_cover.data.mapv(|lc| lc == class);

        let mut stable_forest = forest.clone();
        Zip::from(&mut stable_forest).and(&not_lost).for_each(|keep, &ok| *keep = *keep && ok);
        let mut reference = stable_forest.clone();
        Zip::from(&mut reference).and(&in_class).for_each(|keep, &ok| *keep = *keep && ok);

        let stats = ReferenceAreaStats {
            total: reference.len(),
            forest: count(&forest),
            stable_forest: count(&stable_forest),
            reference: count(&reference),
        };
        log::debug!(
            "Reference area pixels: {} forest -> {} without loss -> {} in class",
            stats.forest,
            stats.stable_forest,
            stats.reference
        );
        if stats.reference == 0 {
            log::warn!("Reference area is empty for class {}", land_cover_class);
        }

        let mask = Raster::new(reference.mapv(|r| if r { 1.0 } else { f32::NAN }), grid)?;
        Ok(ReferenceArea {
            mask,
            bounds: *calibration_box,
            land_cover_year,
            stats,
        })
    }
}

fn count(mask: &Array2<bool>) -> usize {
    mask.iter().filter(|&&v| v).count()
}
