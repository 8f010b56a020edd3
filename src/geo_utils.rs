//! # Geographic Utilities
//!
//! Distance and containment primitives used by the viewport filter, the spatial
//! index, the clusterer and the route overlay.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two coordinates |
//! | [`within_radius`] | Whether a coordinate lies within a radius of a center |
//! | [`polyline_length`] | Total length of a path in meters |
//! | [`circle_bounds`] | Bounding box enclosing a circle |
//! | [`compute_center`] | Centroid of a set of coordinates |
//! | [`meters_to_degrees`] | Convert meters to approximate longitude degrees at a latitude |
//!
//! ## Example
//!
//! ```rust
//! use parkmap::{Coordinate, geo_utils};
//!
//! let center = Coordinate::new(37.456, 126.705);
//! let nearby = Coordinate::new(37.458, 126.706);
//!
//! assert!(geo_utils::within_radius(&nearby, &center, 500.0));
//!
//! let bounds = geo_utils::circle_bounds(&center, 500.0);
//! assert!(bounds.contains(&nearby));
//! ```
//!
//! All functions expect WGS84 coordinates in degrees. Distances use a spherical Earth
//! with the mean radius, which is what the haversine formula in `geo` assumes.

use geo::{Distance, Haversine, Point};

use crate::{Bounds, Coordinate};

/// Mean Earth radius in meters (same value `geo` uses for haversine).
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

// Keeps circle envelopes strictly larger than the circle they enclose.
const ENVELOPE_MARGIN: f64 = 1.001;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two coordinates using the Haversine formula.
///
/// Returns the distance in meters.
///
/// # Example
///
/// ```rust
/// use parkmap::{Coordinate, geo_utils};
///
/// let seoul = Coordinate::new(37.5665, 126.9780);
/// let incheon = Coordinate::new(37.4563, 126.7052);
///
/// let distance = geo_utils::haversine_distance(&seoul, &incheon);
/// assert!((distance - 27_000.0).abs() < 2_000.0); // ~27 km
/// ```
#[inline]
pub fn haversine_distance(p1: &Coordinate, p2: &Coordinate) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Check whether `point` lies within `radius_meters` of `center` (boundary included).
///
/// Invalid coordinates are never within any radius.
#[inline]
pub fn within_radius(point: &Coordinate, center: &Coordinate, radius_meters: f64) -> bool {
    if !point.is_valid() || !center.is_valid() {
        return false;
    }
    haversine_distance(point, center) <= radius_meters
}

/// Calculate the total length of a path in meters.
///
/// Empty or single-point paths return 0.0.
pub fn polyline_length(points: &[Coordinate]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Convert meters to approximate longitude degrees at a given latitude.
///
/// Uses a floor of `cos(latitude) = 0.1` so the result stays bounded near the poles.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Bounding box that fully encloses the circle of `radius_meters` around `center`.
///
/// The box is slightly larger than the circle, so it is safe as a prefilter before an
/// exact [`within_radius`] check.
pub fn circle_bounds(center: &Coordinate, radius_meters: f64) -> Bounds {
    let radius = radius_meters.max(0.0) * ENVELOPE_MARGIN;
    let lat_delta = (radius / EARTH_RADIUS_METERS).to_degrees();
    let cos_lat = center.latitude.to_radians().cos().abs().max(0.01);
    let lng_delta = (lat_delta / cos_lat).min(180.0);

    Bounds {
        min_lat: (center.latitude - lat_delta).max(-90.0),
        max_lat: (center.latitude + lat_delta).min(90.0),
        min_lng: center.longitude - lng_delta,
        max_lng: center.longitude + lng_delta,
    }
}

// =============================================================================
// Center/Centroid Functions
// =============================================================================

/// Compute the arithmetic centroid of a set of coordinates.
///
/// Returns `None` for empty input. Suitable for the small areas a cluster covers.
pub fn compute_center(points: &[Coordinate]) -> Option<Coordinate> {
    if points.is_empty() {
        return None;
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    Some(Coordinate::new(sum_lat / n, sum_lng / n))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = Coordinate::new(37.456, 126.705);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // 0.001 degrees of latitude is ~111m
        let a = Coordinate::new(37.456, 126.705);
        let b = Coordinate::new(37.457, 126.705);
        assert!(approx_eq(haversine_distance(&a, &b), 111.2, 0.5));
    }

    #[test]
    fn test_within_radius_nearby_lots() {
        let center = Coordinate::new(37.456, 126.705);
        let far = Coordinate::new(37.460, 126.710);
        // ~630m away
        assert!(!within_radius(&far, &center, 500.0));
        assert!(within_radius(&far, &center, 700.0));
        assert!(within_radius(&center, &center, 0.0));
    }

    #[test]
    fn test_within_radius_rejects_invalid() {
        let center = Coordinate::new(37.456, 126.705);
        assert!(!within_radius(&Coordinate::new(f64::NAN, 126.705), &center, 1e9));
    }

    #[test]
    fn test_polyline_length() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[Coordinate::new(37.45, 126.7)]), 0.0);

        let path = vec![
            Coordinate::new(37.456, 126.705),
            Coordinate::new(37.457, 126.705),
            Coordinate::new(37.458, 126.705),
        ];
        assert!(approx_eq(polyline_length(&path), 222.4, 1.0));
    }

    #[test]
    fn test_circle_bounds_encloses_circle() {
        let center = Coordinate::new(37.456, 126.705);
        let bounds = circle_bounds(&center, 1000.0);

        // Points exactly on the circle in each cardinal direction
        let lat_delta = (1000.0 / EARTH_RADIUS_METERS).to_degrees();
        let north = Coordinate::new(center.latitude + lat_delta, center.longitude);
        assert!(bounds.contains(&north));

        let east_lng = center.longitude + lat_delta / center.latitude.to_radians().cos();
        assert!(bounds.contains(&Coordinate::new(center.latitude, east_lng)));
    }

    #[test]
    fn test_compute_center() {
        assert!(compute_center(&[]).is_none());

        let center = compute_center(&[
            Coordinate::new(37.50, 126.70),
            Coordinate::new(37.52, 126.72),
        ])
        .unwrap();
        assert!(approx_eq(center.latitude, 37.51, 1e-9));
        assert!(approx_eq(center.longitude, 126.71, 1e-9));
    }

    #[test]
    fn test_meters_to_degrees() {
        let deg = meters_to_degrees(111_320.0, 0.0);
        assert!(approx_eq(deg, 1.0, 0.01));
        assert!(meters_to_degrees(111_320.0, 45.0) > 1.0);
    }
}
