use std::sync::Arc;

use super::common::{examiner, origin, point_km_north};
use crate::booking::domain::Coordinates;
use crate::booking::geo::{haversine_km, nautical_miles_to_km, GeoMatcher};
use crate::booking::memory::StaticExaminerDirectory;

fn matcher(examiners: Vec<crate::booking::domain::Examiner>) -> GeoMatcher {
    GeoMatcher::new(Arc::new(StaticExaminerDirectory::new(examiners)))
}

#[test]
fn haversine_is_zero_for_identical_points() {
    let here = origin();
    assert!(haversine_km(here, here).abs() < 1e-9);
}

#[test]
fn haversine_matches_known_meridian_distance() {
    // One degree of latitude along a meridian is R * 1 degree in radians.
    let a = Coordinates {
        latitude: 40.0,
        longitude: -85.0,
    };
    let b = Coordinates {
        latitude: 41.0,
        longitude: -85.0,
    };
    let expected = 6371.0 * 1.0_f64.to_radians();
    assert!((haversine_km(a, b) - expected).abs() < 0.01);
}

#[test]
fn nautical_mile_conversion_uses_exact_factor() {
    assert!((nautical_miles_to_km(1.0) - 1.852).abs() < 1e-12);
    assert!((nautical_miles_to_km(100.0) - 185.2).abs() < 1e-9);
}

#[test]
fn radius_boundary_is_inclusive() {
    let position = point_km_north(30.0);
    let distance = haversine_km(origin(), position);
    let matcher = matcher(vec![examiner("edge", Some(position), "DPE-PE")]);

    let at_radius = matcher
        .find_nearby(origin(), distance, "Private")
        .expect("search succeeds");
    assert_eq!(at_radius.len(), 1);

    let inside_radius = matcher
        .find_nearby(origin(), distance - 1e-6, "Private")
        .expect("search succeeds");
    assert!(inside_radius.is_empty());
}

#[test]
fn results_are_sorted_nearest_first_and_capped_at_three() {
    let matcher = matcher(vec![
        examiner("a", Some(point_km_north(10.0)), "DPE-PE"),
        examiner("b", Some(point_km_north(5.0)), "DPE-PE"),
        examiner("c", Some(point_km_north(30.0)), "DPE-PE"),
        examiner("d", Some(point_km_north(5.5)), "DPE-PE"),
        examiner("e", Some(point_km_north(2.0)), "DPE-PE"),
    ]);

    let found = matcher
        .find_nearby(origin(), 200.0, "Private")
        .expect("search succeeds");
    let ids: Vec<&str> = found.iter().map(|c| c.examiner_id.0.as_str()).collect();
    assert_eq!(ids, vec!["e", "b", "d"]);
    assert!(found[0].distance_km < found[1].distance_km);
    assert!(found[1].distance_km < found[2].distance_km);
}

#[test]
fn contact_limit_can_be_lowered_but_not_raised() {
    let examiners = vec![
        examiner("a", Some(point_km_north(1.0)), "DPE-PE"),
        examiner("b", Some(point_km_north(2.0)), "DPE-PE"),
        examiner("c", Some(point_km_north(3.0)), "DPE-PE"),
        examiner("d", Some(point_km_north(4.0)), "DPE-PE"),
    ];

    let one = matcher(examiners.clone()).with_limit(1);
    assert_eq!(one.find_nearby(origin(), 200.0, "Private").unwrap().len(), 1);

    let ten = matcher(examiners).with_limit(10);
    assert_eq!(ten.find_nearby(origin(), 200.0, "Private").unwrap().len(), 3);
}

#[test]
fn entries_without_coordinates_or_email_are_skipped() {
    let mut no_email = examiner("no-email", Some(point_km_north(1.0)), "DPE-PE");
    no_email.email = "  ".to_string();

    let matcher = matcher(vec![
        examiner("no-coords", None, "DPE-PE"),
        no_email,
        examiner("ok", Some(point_km_north(2.0)), "DPE-PE"),
    ]);

    let found = matcher
        .find_nearby(origin(), 200.0, "Private")
        .expect("search succeeds");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].examiner_id.0, "ok");
}

#[test]
fn unqualified_examiners_are_excluded() {
    let matcher = matcher(vec![
        examiner("commercial-only", Some(point_km_north(1.0)), "DPE-CE"),
        examiner("private", Some(point_km_north(2.0)), "DPE-PE-ASEL"),
    ]);

    let found = matcher
        .find_nearby(origin(), 200.0, "Private")
        .expect("search succeeds");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].examiner_id.0, "private");
}

#[test]
fn empty_exam_type_skips_the_qualification_filter() {
    let matcher = matcher(vec![examiner(
        "anything",
        Some(point_km_north(1.0)),
        "DPE-CE",
    )]);

    let found = matcher
        .find_nearby(origin(), 200.0, "")
        .expect("search succeeds");
    assert_eq!(found.len(), 1);
}

#[test]
fn empty_result_is_a_valid_outcome() {
    let matcher = matcher(vec![examiner(
        "far-away",
        Some(point_km_north(500.0)),
        "DPE-PE",
    )]);

    let found = matcher
        .find_nearby(origin(), 10.0, "Private")
        .expect("search succeeds");
    assert!(found.is_empty());
}
