mod common;

use approx::assert_relative_eq;
use chrono::{TimeZone, Utc};
use common::*;
use sliac::core::correction::correct_value;
use sliac::core::RunWarning;
use sliac::{
    Band, CorrectionRequest, OrbitDirection, Polarization, ReferenceAngle, Region, SarError,
    SceneSource, SliacParams, SliacProcessor,
};

fn request(target_year: i32) -> CorrectionRequest {
    CorrectionRequest::new(
        Region::Point(roi_point()),
        Utc.with_ymd_and_hms(2019, 7, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2019, 8, 1, 0, 0, 0).unwrap(),
        target_year,
        FOREST_CLASS,
    )
    .with_bounding_box_size(500.0)
}

fn params() -> SliacParams {
    SliacParams::default().with_sample_points(150)
}

fn two_orbit_source() -> SceneSource {
    let terrain = tilted_terrain();
    SceneSource::Collection(vec![
        scene("desc", 5, OrbitDirection::Descending, &terrain, vv_trend, vh_trend),
        scene("asc", 2, OrbitDirection::Ascending, &terrain, vv_trend, vh_trend),
    ])
}

#[test]
fn test_two_orbit_run_normalizes_backscatter() -> anyhow::Result<()> {
    init_logging();

    let output = SliacProcessor::new(params()).run(&request(2019), two_orbit_source(), &ancillary(tilted_terrain()))?;

    assert!(output.failures.is_empty());
    assert!(output.warnings.is_empty());
    assert_eq!(output.land_cover_year.used, 2019);
    assert!(output.calibration_sites >= 2, "only {} calibration sites", output.calibration_sites);
    let ids: Vec<&str> = output.scenes.iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec!["asc", "desc"]);
    println!("Reference angle: {:.3}°, sites: {}", output.reference_angle, output.calibration_sites);

    // Auto reference angle is the midpoint of the LIA extremes at the region of interest
    let at_roi: Vec<f64> = output
        .scenes
        .iter()
        .map(|s| s.band(Band::Lia).map(|lia| lia.value_at(roi_point()).map(f64::from)))
        .collect::<Result<Option<Vec<_>>, _>>()?
        .expect("LIA defined at the region of interest");
    let max = at_roi.iter().cloned().fold(f64::MIN, f64::max);
    let min = at_roi.iter().cloned().fold(f64::MAX, f64::min);
    assert_relative_eq!(output.reference_angle, 0.5 * (max + min), epsilon = 1e-9);
    assert!(max - min > 5.0, "opposite looks should see different LIA");

    let reference = output.reference_angle;
    for scene in &output.scenes {
        let look = scene.metadata.look_angle_azimuth.expect("look azimuth recorded");
        match scene.info.orbit {
            OrbitDirection::Ascending => assert!((0.0..180.0).contains(&look), "ascending look {}", look),
            OrbitDirection::Descending => assert!((180.0..360.0).contains(&look), "descending look {}", look),
        }
        assert_relative_eq!(scene.metadata.mean_elevation.expect("sites have elevation"), 300.0, epsilon = 1e-6);
        assert!(scene.metadata.quality_flags.is_empty());

        for (pol, generating_slope, level_at_35) in [(Polarization::VV, -0.12, -8.0), (Polarization::VH, -0.2, -15.0)] {
            let fit = scene.fit(pol).and_then(|f| f.fit).expect("fit defined on tilted terrain");
            assert_relative_eq!(fit.slope, generating_slope, epsilon = 1e-4);
            assert!(fit.r_squared > 0.999, "{} {} R² {}", scene.id(), pol, fit.r_squared);

            let raw = scene.band(Band::backscatter(pol)?)?;
            let lia = scene.band(Band::Lia)?;
            let corrected = scene.band(Band::corrected(pol)?)?;
            let flat_level = (level_at_35 + generating_slope * (reference - 35.0)) as f32;

            let mut checked = 0;
            for ((i, j), &value) in corrected.data.indexed_iter() {
                let (r, a) = (raw.data[[i, j]], lia.data[[i, j]]);
                if !(r.is_finite() && a.is_finite()) {
                    assert!(value.is_nan());
                    continue;
                }
                assert_eq!(value, correct_value(r, a, fit.slope, reference));
                assert_relative_eq!(value, flat_level, epsilon = 5e-3);
                checked += 1;
            }
            assert!(checked > 5000, "{} corrected pixels", checked);
        }
    }
    Ok(())
}

#[test]
fn test_fixed_reference_angle() {
    init_logging();

    let request = request(2019).with_reference_angle(ReferenceAngle::Fixed(40.0));
    let output = SliacProcessor::new(params().with_parallel(false))
        .run(&request, two_orbit_source(), &ancillary(tilted_terrain()))
        .expect("run succeeds");

    assert_eq!(output.reference_angle, 40.0);
    for scene in &output.scenes {
        let corrected = scene.band(Band::CorrectedVV).expect("corrected VV");
        // At the reference angle the corrected value equals the trend there
        let level = corrected.data.iter().find(|v| v.is_finite()).copied().expect("valid pixel");
        assert_relative_eq!(level, vv_trend(40.0), epsilon = 5e-3);
    }
}

#[test]
fn test_degenerate_footprint_fails_only_that_scene() {
    init_logging();

    let terrain = tilted_terrain();
    // Axis-aligned frame: south-west corner is both the min-lat and min-lon vertex
    let mut broken = scene("broken", 3, OrbitDirection::Ascending, &terrain, vv_trend, vh_trend);
    broken.info.footprint = sliac::Footprint::new(vec![
        sliac::GeoPoint::new(-100.0, -100.0),
        sliac::GeoPoint::new(1300.0, -100.0),
        sliac::GeoPoint::new(1300.0, 1300.0),
        sliac::GeoPoint::new(-100.0, 1300.0),
    ]);
    let mut no_angle = scene("no-angle", 4, OrbitDirection::Ascending, &terrain, vv_trend, vh_trend);
    no_angle.bands.remove(&Band::Angle);

    let source = SceneSource::Collection(vec![
        scene("asc", 2, OrbitDirection::Ascending, &terrain, vv_trend, vh_trend),
        broken,
        no_angle,
    ]);
    let output = SliacProcessor::new(params())
        .run(&request(2019), source, &ancillary(tilted_terrain()))
        .expect("one scene still calibrates");

    assert_eq!(output.scenes.len(), 1);
    assert_eq!(output.failures.len(), 2);
    let broken = output.failures.iter().find(|f| f.scene_id == "broken").expect("broken scene reported");
    assert!(matches!(broken.error, SarError::Geometry { .. }));
    let no_angle = output.failures.iter().find(|f| f.scene_id == "no-angle").expect("no-angle scene reported");
    assert!(matches!(no_angle.error, SarError::DataQuality { .. }));
}

#[test]
fn test_run_without_usable_scenes_is_an_error() {
    init_logging();

    let processor = SliacProcessor::new(params());
    let empty = processor.run(&request(2019), SceneSource::Collection(Vec::new()), &ancillary(tilted_terrain()));
    assert!(matches!(empty, Err(SarError::Processing(_))));

    let terrain = tilted_terrain();
    let mut only = scene("no-vh", 2, OrbitDirection::Ascending, &terrain, vv_trend, vh_trend);
    only.bands.remove(&Band::VH);
    let failed = processor.run(&request(2019), SceneSource::Collection(vec![only]), &ancillary(terrain));
    assert!(matches!(failed, Err(SarError::Processing(_))));
}

#[test]
fn test_land_cover_year_before_span_is_substituted() {
    init_logging();

    let output = SliacProcessor::new(params())
        .run(&request(2014), two_orbit_source(), &ancillary(tilted_terrain()))
        .expect("2014 falls back to the first land cover year");
    assert_eq!(output.land_cover_year.requested, 2014);
    assert_eq!(output.land_cover_year.used, 2015);
    assert_eq!(
        output.warnings,
        vec![RunWarning::LandCoverYearSubstituted { requested: 2014, used: 2015 }]
    );
}

#[test]
fn test_land_cover_year_outside_span_is_rejected() {
    init_logging();

    let result = SliacProcessor::new(params()).run(&request(2012), two_orbit_source(), &ancillary(tilted_terrain()));
    assert!(matches!(result, Err(SarError::Configuration(_))));
}

#[test]
fn test_archive_source_is_filtered_to_the_request() {
    init_logging();

    let terrain = tilted_terrain();
    let mut august = scene("august", 2, OrbitDirection::Ascending, &terrain, vv_trend, vh_trend);
    august.info.acquisition_time = Utc.with_ymd_and_hms(2019, 8, 2, 5, 30, 0).unwrap();
    let source = SceneSource::Archive(vec![
        scene("july", 9, OrbitDirection::Descending, &terrain, vv_trend, vh_trend),
        august,
    ]);

    let output = SliacProcessor::new(params())
        .run(&request(2019), source, &ancillary(terrain))
        .expect("july scene is processed");
    let ids: Vec<&str> = output.scenes.iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec!["july"]);
}
