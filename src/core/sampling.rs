use crate::core::engine::ProcessingEngine;
use crate::core::pipeline::SliacParams;
use crate::core::reference_area::ReferenceArea;
use crate::core::stats::{self, TukeyFence};
use crate::types::{Band, GeoPoint, Polarization, Raster, SarError, SarResult, Scene};
use geo::{BooleanOps, Contains, Coord, MultiPolygon, Polygon};
use std::collections::BTreeMap;

/// Dissolved buffer of one or more sample points lying on the reference area
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSite {
    /// Sample points whose buffers merged into this site
    pub centers: Vec<GeoPoint>,
    pub polygon: Polygon<f64>,
    /// Buffer area on the reference area, rounded to whole square meters
    pub area_m2: i64,
}

/// Sites kept for calibration, shared by every scene of a run
#[derive(Debug, Clone, Default)]
pub struct CalibrationSites {
    pub sites: Vec<CalibrationSite>,
    /// Most common buffer area, i.e. the area of an unclipped buffer
    pub mode_area_m2: Option<i64>,
    pub random_points: usize,
    pub tree_points: usize,
    pub candidates: usize,
}

impl CalibrationSites {
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Draws and screens calibration sites on the reference area
pub struct SiteSelector<'a, E: ProcessingEngine + ?Sized> {
    engine: &'a E,
    params: &'a SliacParams,
}

impl<'a, E: ProcessingEngine + ?Sized> SiteSelector<'a, E> {
    pub fn new(engine: &'a E, params: &'a SliacParams) -> Self {
        Self { engine, params }
    }

    pub fn select(&self, reference: &ReferenceArea) -> SarResult<CalibrationSites> {
        let points = self.engine.random_points(
            &reference.bounds,
            self.params.sample_points,
            self.params.random_seed,
        )?;
        let tree_points: Vec<GeoPoint> = points
            .iter()
            .copied()
            .filter(|&p| self.engine.sample(&reference.mask, p).is_some())
            .collect();
        log::debug!(
            "{} of {} random points fall on the reference area",
            tree_points.len(),
            points.len()
        );

        let crs = reference.mask.grid.crs;
        let buffers: Vec<Polygon<f64>> = tree_points
            .iter()
            .map(|&p| crs.buffer(p, self.params.buffer_radius_m, self.params.buffer_segments))
            .collect();

        let mut candidates: Vec<(usize, CalibrationSite)> = dissolve(buffers)
            .into_iter()
            .filter_map(|polygon| {
                let members: Vec<usize> = (0..tree_points.len())
                    .filter(|&i| polygon.contains(&Coord::from(tree_points[i])))
                    .collect();
                let first = *members.first()?;
                let area = self.engine.covered_area(&reference.mask, &polygon);
                Some((
                    first,
                    CalibrationSite {
                        centers: members.iter().map(|&i| tree_points[i]).collect(),
                        polygon,
                        area_m2: area.round() as i64,
                    },
                ))
            })
            .collect();
        candidates.sort_by_key(|(first, _)| *first);
        let candidates: Vec<CalibrationSite> = candidates.into_iter().map(|(_, site)| site).collect();

        let areas: Vec<i64> = candidates.iter().map(|s| s.area_m2).collect();
        let mode_area_m2 = stats::mode(&areas);
        let candidate_count = candidates.len();
        let sites: Vec<CalibrationSite> = match mode_area_m2 {
            Some(mode) => candidates.into_iter().filter(|s| s.area_m2 == mode).collect(),
            None => Vec::new(),
        };

        log::info!(
            "📍 Calibration sites: {} of {} buffers unclipped (mode area {:?} m²)",
            sites.len(),
            candidate_count,
            mode_area_m2
        );

        Ok(CalibrationSites {
            sites,
            mode_area_m2,
            random_points: points.len(),
            tree_points: tree_points.len(),
            candidates: candidate_count,
        })
    }
}

/// Union of all buffers; overlapping buffers merge into one polygon
fn dissolve(buffers: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut layer: Vec<MultiPolygon<f64>> = buffers.into_iter().map(MultiPolygon::from).collect();
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => a.union(b),
                _ => pair.iter().flat_map(|m| m.0.iter().cloned()).collect(),
            })
            .collect();
    }
    layer.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

/// Band values of one calibration site in one scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteObservation {
    pub lia: f64,
    pub vv: f64,
    pub vh: f64,
}

impl SiteObservation {
    pub fn backscatter(&self, pol: Polarization) -> Option<f64> {
        match pol {
            Polarization::VV => Some(self.vv),
            Polarization::VH => Some(self.vh),
            _ => None,
        }
    }
}

/// Tukey-filtered (LIA, backscatter) pairs of one polarization
#[derive(Debug, Clone, PartialEq)]
pub struct PolarizationSample {
    pub polarization: Polarization,
    pub lia: Vec<f64>,
    pub backscatter: Vec<f64>,
    pub fence: Option<TukeyFence>,
    /// Observations rejected by the fence
    pub removed: usize,
}

impl PolarizationSample {
    pub fn len(&self) -> usize {
        self.lia.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lia.is_empty()
    }

    pub fn lia_range(&self) -> Option<f64> {
        stats::range(&self.lia)
    }

    pub fn lia_iqr(&self) -> Option<f64> {
        stats::iqr(&self.lia)
    }
}

/// Keep observations whose backscatter lies strictly inside the polarization's Tukey fence
pub fn tukey_filter(pol: Polarization, observations: &[SiteObservation], multiplier: f64) -> PolarizationSample {
    let pairs: Vec<(f64, f64)> = observations
        .iter()
        .filter_map(|o| o.backscatter(pol).map(|v| (o.lia, v)))
        .collect();
    let values: Vec<f64> = pairs.iter().map(|&(_, v)| v).collect();
    let fence = TukeyFence::from_values(&values, multiplier);

    let kept: Vec<(f64, f64)> = match fence {
        Some(f) => pairs.iter().copied().filter(|&(_, v)| f.contains(v)).collect(),
        None => Vec::new(),
    };

    PolarizationSample {
        polarization: pol,
        removed: pairs.len() - kept.len(),
        lia: kept.iter().map(|&(lia, _)| lia).collect(),
        backscatter: kept.iter().map(|&(_, v)| v).collect(),
        fence,
    }
}

/// Calibration data of one scene
#[derive(Debug, Clone)]
pub struct CalibrationSample {
    pub observations: Vec<SiteObservation>,
    /// Mean elevation over the calibration sites
    pub mean_elevation: Option<f64>,
    pub by_polarization: BTreeMap<Polarization, PolarizationSample>,
}

/// Extracts band means at the calibration sites and filters outliers
pub struct SampleFilter<'a, E: ProcessingEngine + ?Sized> {
    engine: &'a E,
    params: &'a SliacParams,
}

impl<'a, E: ProcessingEngine + ?Sized> SampleFilter<'a, E> {
    pub fn new(engine: &'a E, params: &'a SliacParams) -> Self {
        Self { engine, params }
    }

    pub fn extract(
        &self,
        scene: &Scene,
        sites: &CalibrationSites,
        elevation: &Raster,
    ) -> SarResult<CalibrationSample> {
        let lia = scene.band(Band::Lia)?;
        let vv = scene.band(Band::VV)?;
        let vh = scene.band(Band::VH)?;

        let elevations: Vec<f64> = sites
            .sites
            .iter()
            .filter_map(|s| self.engine.mean_within(elevation, &s.polygon))
            .collect();
        let mean_elevation = stats::mean(&elevations);

        // Sites with a missing value in any band are dropped, never zero-filled
        let observations: Vec<SiteObservation> = sites
            .sites
            .iter()
            .filter_map(|s| {
                Some(SiteObservation {
                    lia: self.engine.mean_within(lia, &s.polygon)?,
                    vv: self.engine.mean_within(vv, &s.polygon)?,
                    vh: self.engine.mean_within(vh, &s.polygon)?,
                })
            })
            .collect();

        if observations.is_empty() && !sites.is_empty() {
            log::warn!("Scene {}: no calibration site has valid VV, VH and LIA", scene.id());
        }

        let mut by_polarization = BTreeMap::new();
        for pol in Polarization::CORRECTED {
            let sample = tukey_filter(pol, &observations, self.params.tukey_multiplier);
            log::debug!(
                "Scene {} {}: {} forest points after Tukey filtering ({} removed)",
                scene.id(),
                pol,
                sample.len(),
                sample.removed
            );
            by_polarization.insert(pol, sample);
        }

        Ok(CalibrationSample { observations, mean_elevation, by_polarization })
    }
}

impl CalibrationSample {
    pub fn polarization(&self, pol: Polarization) -> SarResult<&PolarizationSample> {
        self.by_polarization
            .get(&pol)
            .ok_or_else(|| SarError::Processing(format!("No calibration sample for {}", pol)))
    }
}
