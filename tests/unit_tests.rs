// Unit tests for SoundSpot

use soundspot::core::{
    bounding_box, decode, decode_with_error, distance_km, encode, haversine_distance, key_range,
    within_radius, GeoError, EARTH_RADIUS_KM, SHARE_KEY_PRECISION,
};
use soundspot::models::{BoundingBox, Coordinate, Location, ShareRecord, Track};
use chrono::Utc;
use geo::{HaversineDistance, Point};

const SEOUL: Coordinate = Coordinate { latitude: 37.5665, longitude: 126.9780 };

fn create_share(id: &str, lat: f64, lon: f64) -> ShareRecord {
    ShareRecord {
        id: id.to_string(),
        user_id: format!("user-{}", id),
        username: format!("User {}", id),
        track: Track {
            id: format!("track-{}", id),
            name: "Song".to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            album_art: String::new(),
            preview_url: None,
            external_url: String::new(),
        },
        location: Location::new(lat, lon).unwrap(),
        timestamp: 0,
        created_at: Utc::now(),
    }
}

/// Point `distance_km` away from `origin` along `bearing_deg` on the sphere
fn destination(origin: &Coordinate, bearing_deg: f64, distance_km: f64) -> Coordinate {
    let angular = distance_km / EARTH_RADIUS_KM;
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    Coordinate {
        latitude: lat2.to_degrees(),
        longitude: lon2.to_degrees(),
    }
}

fn in_box(point: &Coordinate, bbox: &BoundingBox) -> bool {
    (bbox.min_lat..=bbox.max_lat).contains(&point.latitude)
        && (bbox.min_lon..=bbox.max_lon).contains(&point.longitude)
}

#[test]
fn test_encode_is_deterministic() {
    let a = encode(SEOUL.latitude, SEOUL.longitude, SHARE_KEY_PRECISION).unwrap();
    let b = encode(SEOUL.latitude, SEOUL.longitude, SHARE_KEY_PRECISION).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), SHARE_KEY_PRECISION);
}

#[test]
fn test_longer_keys_extend_shorter_ones() {
    let short = encode(SEOUL.latitude, SEOUL.longitude, 5).unwrap();
    let long = encode(SEOUL.latitude, SEOUL.longitude, 9).unwrap();
    assert!(long.starts_with(&short));
}

#[test]
fn test_cell_shrinks_with_precision() {
    let mut previous = (f64::MAX, f64::MAX);

    for precision in 1..=12 {
        let key = encode(SEOUL.latitude, SEOUL.longitude, precision).unwrap();
        let (center, lat_err, lon_err) = decode_with_error(&key).unwrap();

        assert!(lat_err < previous.0 && lon_err <= previous.1, "precision {}", precision);
        assert!((center.latitude - SEOUL.latitude).abs() <= lat_err);
        assert!((center.longitude - SEOUL.longitude).abs() <= lon_err);

        previous = (lat_err, lon_err);
    }
}

#[test]
fn test_decoded_share_key_is_within_meters() {
    let key = encode(SEOUL.latitude, SEOUL.longitude, SHARE_KEY_PRECISION).unwrap();
    let center = decode(&key).unwrap();
    assert!(distance_km(&center, &SEOUL) < 0.005);
}

#[test]
fn test_invalid_inputs_are_rejected() {
    assert!(matches!(encode(91.0, 0.0, 9), Err(GeoError::InvalidCoordinate { .. })));
    assert!(matches!(encode(0.0, f64::NAN, 9), Err(GeoError::InvalidCoordinate { .. })));
    assert_eq!(encode(0.0, 0.0, 0), Err(GeoError::InvalidPrecision(0)));
    assert!(matches!(decode("abc"), Err(GeoError::InvalidKey(_))));
    assert_eq!(key_range(&SEOUL, -1.0), Err(GeoError::InvalidRadius(-1.0)));
}

#[test]
fn test_haversine_distance_zero() {
    assert!(distance_km(&SEOUL, &SEOUL) < 1e-9);
}

#[test]
fn test_haversine_distance_is_symmetric() {
    let busan = Coordinate { latitude: 35.1796, longitude: 129.0756 };
    assert_eq!(distance_km(&SEOUL, &busan), distance_km(&busan, &SEOUL));
}

#[test]
fn test_haversine_matches_geo_crate() {
    let pairs = [
        ((37.5665, 126.9780), (35.1796, 129.0756)),
        ((51.5074, -0.1278), (48.8566, 2.3522)),
        ((-33.8688, 151.2093), (40.7128, -74.0060)),
    ];

    for ((lat1, lon1), (lat2, lon2)) in pairs {
        let ours = haversine_distance(lat1, lon1, lat2, lon2);
        let theirs = Point::new(lon1, lat1).haversine_distance(&Point::new(lon2, lat2)) / 1000.0;
        assert!(
            (ours - theirs).abs() / theirs < 1e-4,
            "{} vs {} for ({}, {}) -> ({}, {})",
            ours, theirs, lat1, lon1, lat2, lon2
        );
    }
}

#[test]
fn test_antipodal_distance_is_half_circumference() {
    let distance = haversine_distance(0.0, 0.0, 0.0, 180.0);
    assert!((distance - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
}

#[test]
fn test_key_range_covers_disk() {
    let centers = [
        SEOUL,
        Coordinate { latitude: 0.0, longitude: 0.0 },
        Coordinate { latitude: -33.8688, longitude: 151.2093 },
        Coordinate { latitude: 64.1466, longitude: -21.9426 },
        Coordinate { latitude: 40.7128, longitude: -74.0060 },
    ];

    for center in centers {
        for radius_km in [0.5, 5.0, 50.0] {
            let bounds = key_range(&center, radius_km).unwrap();

            for step in 0..16 {
                let bearing = step as f64 * 22.5;
                for fraction in [0.25, 0.5, 0.99] {
                    let point = destination(&center, bearing, radius_km * fraction);
                    let key = encode(point.latitude, point.longitude, SHARE_KEY_PRECISION).unwrap();
                    assert!(
                        bounds.contains(&key),
                        "{} outside [{}, {}] for center {:?} r={} bearing={}",
                        key, bounds.lower, bounds.upper, center, radius_km, bearing
                    );
                }
            }
        }
    }
}

#[test]
fn test_bounding_box_contains_disk_points() {
    let bbox = bounding_box(&SEOUL, 10.0).unwrap();

    for step in 0..8 {
        let point = destination(&SEOUL, step as f64 * 45.0, 10.0);
        assert!(in_box(&point, &bbox));
    }

    // ~0.18 degrees of latitude for 10 km, plus the coverage margin
    let lat_span = bbox.max_lat - bbox.min_lat;
    assert!((lat_span - 0.18).abs() < 0.01);
    let north = Coordinate { latitude: SEOUL.latitude + 0.2, longitude: SEOUL.longitude };
    assert!(!in_box(&north, &bbox));
}

#[test]
fn test_within_radius_keeps_order() {
    let shares = vec![
        create_share("far", 37.9, 127.3),
        create_share("a", 37.5665, 126.9780),
        create_share("b", 37.57, 126.98),
    ];

    let ids: Vec<_> = within_radius(shares, &SEOUL, 5.0)
        .into_iter()
        .map(|share| share.id)
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn test_within_radius_is_idempotent() {
    let shares: Vec<_> = (0..40)
        .map(|i| {
            let offset = i as f64 * 0.003;
            create_share(&i.to_string(), SEOUL.latitude + offset, SEOUL.longitude - offset)
        })
        .collect();

    let once = within_radius(shares, &SEOUL, 5.0);
    let twice = within_radius(once.clone(), &SEOUL, 5.0);

    assert_eq!(once, twice);
    assert!(!once.is_empty());
    assert!(once.iter().all(|share| distance_km(&SEOUL, &share.location.coordinate()) <= 5.0));
}

#[test]
fn test_within_radius_boundary_is_inclusive() {
    let edge = destination(&SEOUL, 90.0, 3.0);
    let share = create_share("edge", edge.latitude, edge.longitude);
    let exact = distance_km(&SEOUL, &share.location.coordinate());

    assert_eq!(within_radius(vec![share], &SEOUL, exact).len(), 1);
}
