use crate::core::engine::ProcessingEngine;
use crate::core::terrain::SceneTerrain;
use crate::types::{
    Band, Footprint, GeoPoint, OrbitDirection, SarError, SarResult, Scene,
};
use ndarray::Zip;

/// Minimum ring length (closed ring with at least three distinct corners)
pub const MIN_RING_VERTICES: usize = 4;

/// Look geometry reconstructed from a footprint's corner layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookGeometry {
    pub orbit: OrbitDirection,
    /// Footprint edge azimuth, degrees
    pub azimuth_deg: f64,
    /// Radar boresight azimuth, degrees clockwise from north
    pub look_azimuth_deg: f64,
}

impl LookGeometry {
    /// Reconstruct the look azimuth from the first ring of a footprint
    ///
    /// Extreme vertices are picked with an explicit first-in-ring-order argmin /
    /// argmax, so footprints with several vertices sharing the extreme latitude
    /// or longitude resolve to the earliest of them.
    pub fn from_footprint(footprint: &Footprint, orbit: OrbitDirection) -> Result<Self, String> {
        let ring = footprint.ring();
        if ring.len() < MIN_RING_VERTICES {
            return Err(format!(
                "footprint ring has {} vertices, need at least {}",
                ring.len(),
                MIN_RING_VERTICES
            ));
        }
        let vertices = footprint.vertices();
        if vertices.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err("footprint has non-finite coordinates".to_string());
        }

        let min_lon = vertices[argmin(&vertices, |p| p.x)].x;
        let at_min_lat = vertices[argmin(&vertices, |p| p.y)];
        let min_lat = at_min_lat.y;

        let (x_diff, y_diff) = match orbit {
            OrbitDirection::Ascending => {
                // South-west and north-west extremities
                let at_min_lon = vertices[argmin(&vertices, |p| p.x)];
                (at_min_lat.x - min_lon, at_min_lon.y - min_lat)
            }
            OrbitDirection::Descending => {
                // South-east and north-east extremities
                let at_max_lon = vertices[argmax(&vertices, |p| p.x)];
                (at_max_lon.x - at_min_lat.x, at_max_lon.y - min_lat)
            }
        };

        if x_diff == 0.0 && y_diff == 0.0 {
            return Err("footprint corners are degenerate".to_string());
        }

        // Both differences are non-negative, so atan2 equals atan(y/x) and
        // stays defined when x_diff is zero
        let angle = y_diff.atan2(x_diff).to_degrees();
        let (azimuth_deg, look_azimuth_deg) = match orbit {
            OrbitDirection::Ascending => {
                let azimuth = angle + 270.0;
                (azimuth, azimuth - 270.0)
            }
            OrbitDirection::Descending => {
                let azimuth = 90.0 - angle + 180.0;
                (azimuth, azimuth + 90.0)
            }
        };

        Ok(Self { orbit, azimuth_deg, look_azimuth_deg })
    }

    pub fn look_azimuth_rad(&self) -> f64 {
        self.look_azimuth_deg.to_radians()
    }
}

fn argmin(points: &[GeoPoint], key: impl Fn(&GeoPoint) -> f64) -> usize {
    let mut best = 0;
    for (i, p) in points.iter().enumerate().skip(1) {
        if key(p) < key(&points[best]) {
            best = i;
        }
    }
    best
}

fn argmax(points: &[GeoPoint], key: impl Fn(&GeoPoint) -> f64) -> usize {
    let mut best = 0;
    for (i, p) in points.iter().enumerate().skip(1) {
        if key(p) > key(&points[best]) {
            best = i;
        }
    }
    best
}

/// Local incidence angle (radians) from slope, aspect, radar incidence and look azimuth (radians)
///
/// θ_lia = acos(cos(s)·cos(θ) − sin(s)·sin(θ)·cos(a − φ))
pub fn local_incidence_angle(slope: f64, aspect: f64, incidence: f64, look_azimuth: f64) -> f64 {
    let cos_lia = slope.cos() * incidence.cos()
        - slope.sin() * incidence.sin() * (aspect - look_azimuth).cos();
    cos_lia.clamp(-1.0, 1.0).acos()
}

/// Adds the `LIA` band and the look azimuth to a scene
pub struct GeometryReconstructor<'a, E: ProcessingEngine + ?Sized> {
    engine: &'a E,
}

impl<'a, E: ProcessingEngine + ?Sized> GeometryReconstructor<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    pub fn reconstruct(&self, mut scene: Scene, terrain: &SceneTerrain) -> SarResult<Scene> {
        let look = LookGeometry::from_footprint(&scene.info.footprint, scene.info.orbit).map_err(
            |reason| SarError::Geometry {
                scene_id: scene.id().to_string(),
                reason,
            },
        )?;
        log::debug!(
            "Scene {} ({}): look azimuth {:.3}°",
            scene.id(),
            scene.info.orbit,
            look.look_azimuth_deg
        );

        let look_rad = look.look_azimuth_rad();
        let mut lia = terrain.slope.data.clone();
        Zip::from(&mut lia)
            .and(&terrain.aspect.data)
            .and(&terrain.incidence.data)
            .for_each(|value, &aspect, &incidence| {
                let slope = *value;
                *value = if slope.is_finite() && aspect.is_finite() && incidence.is_finite() {
                    local_incidence_angle(
                        slope as f64,
                        aspect as f64,
                        (incidence as f64).to_radians(),
                        look_rad,
                    )
                    .to_degrees() as f32
                } else {
                    f32::NAN
                };
            });

        let lia = terrain.slope.with_data(lia)?;
        let lia = self.engine.clip_to_polygon(&lia, &scene.info.footprint);

        scene.metadata.look_angle_azimuth = Some(look.look_azimuth_deg);
        Ok(scene.with_band(Band::Lia, lia))
    }
}
