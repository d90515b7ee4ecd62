use crate::types::{AcquisitionMode, BoundingBox, OrbitDirection, Polarization, Scene};
use chrono::{DateTime, Utc};

/// An ordered set of scenes with archive-style filters
#[derive(Debug, Clone, Default)]
pub struct SceneCollection {
    scenes: Vec<Scene>,
}

impl SceneCollection {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn into_scenes(self) -> Vec<Scene> {
        self.scenes
    }

    fn retain(mut self, keep: impl Fn(&Scene) -> bool) -> Self {
        self.scenes.retain(|s| keep(s));
        self
    }

    /// Scenes carrying both VV and VH
    pub fn dual_polarization(self) -> Self {
        self.retain(|s| {
            s.info.polarizations.contains(&Polarization::VV)
                && s.info.polarizations.contains(&Polarization::VH)
        })
    }

    pub fn with_mode(self, mode: AcquisitionMode) -> Self {
        self.retain(|s| s.info.mode == mode)
    }

    /// Scenes whose footprint bounds intersect `bounds`
    pub fn intersecting(self, bounds: &BoundingBox) -> Self {
        self.retain(|s| {
            s.info
                .footprint
                .bounds()
                .map_or(false, |fp| fp.intersects(bounds))
        })
    }

    /// Acquisitions in `[start, end)`
    pub fn acquired_between(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.retain(|s| s.info.acquisition_time >= start && s.info.acquisition_time < end)
    }

    pub fn with_orbit(self, orbit: OrbitDirection) -> Self {
        self.retain(|s| s.info.orbit == orbit)
    }

    /// (ascending, descending)
    pub fn split_by_orbit(self) -> (Self, Self) {
        let (ascending, descending): (Vec<Scene>, Vec<Scene>) = self
            .scenes
            .into_iter()
            .partition(|s| s.info.orbit == OrbitDirection::Ascending);
        (Self::new(ascending), Self::new(descending))
    }

    pub fn merge(mut self, other: SceneCollection) -> Self {
        self.scenes.extend(other.scenes);
        self
    }

    /// Stable sort by acquisition time
    pub fn sorted_by_time(mut self) -> Self {
        self.scenes.sort_by_key(|s| s.info.acquisition_time);
        self
    }
}

impl From<Vec<Scene>> for SceneCollection {
    fn from(scenes: Vec<Scene>) -> Self {
        Self::new(scenes)
    }
}

impl FromIterator<Scene> for SceneCollection {
    fn from_iter<I: IntoIterator<Item = Scene>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for SceneCollection {
    type Item = Scene;
    type IntoIter = std::vec::IntoIter<Scene>;

    fn into_iter(self) -> Self::IntoIter {
        self.scenes.into_iter()
    }
}

/// Where the scenes of a run come from
#[derive(Debug, Clone)]
pub enum SceneSource {
    /// Unfiltered archive: narrowed to dual-polarization scenes of the requested
    /// mode, region and date range
    Archive(Vec<Scene>),
    /// Caller-curated collection, used as supplied
    Collection(Vec<Scene>),
}

impl SceneSource {
    pub fn resolve(
        self,
        mode: AcquisitionMode,
        bounds: &BoundingBox,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SceneCollection {
        match self {
            SceneSource::Archive(scenes) => {
                let total = scenes.len();
                let collection = SceneCollection::new(scenes)
                    .dual_polarization()
                    .with_mode(mode)
                    .intersecting(bounds)
                    .acquired_between(start, end);
                log::info!(
                    "🛰️  {} of {} archive scenes match {} dual-pol over the region",
                    collection.len(),
                    total,
                    mode
                );
                collection
            }
            SceneSource::Collection(scenes) => SceneCollection::new(scenes),
        }
    }
}
