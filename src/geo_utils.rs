//! # Geographic Utilities
//!
//! Distance, bounding-box and Web-Mercator projection helpers shared by the
//! clustering, rasterization and hit-testing modules.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two locations |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//! | [`search_window`] | Degree box enclosing a Haversine radius |
//! | [`lng_delta`] | Longitude difference across the antimeridian |
//! | [`compute_bounds`] | Bounding box of a point set |
//! | [`compute_center`] | Centroid of a point set |
//! | [`bounds_overlap`] | Check if two bounding boxes overlap |
//! | [`project`] / [`unproject`] | Web-Mercator world pixels at a zoom level |
//! | [`tile_bounds`] | Geographic bounds of a slippy-map tile |
//!
//! ## Example
//!
//! ```rust
//! use sugarcane_map::{LatLng, geo_utils};
//!
//! let la_carlota = LatLng::new(10.4236, 122.9200);
//! let bacolod = LatLng::new(10.6765, 122.9509);
//!
//! let dist = geo_utils::haversine_distance(la_carlota, bacolod);
//! assert!((dist - 28_300.0).abs() < 1_000.0);
//!
//! // World pixel position at zoom 10
//! let (x, y) = geo_utils::project(la_carlota.lat, la_carlota.lng, 10);
//! let back = geo_utils::unproject(x, y, 10);
//! assert!((back.lat - la_carlota.lat).abs() < 1e-9);
//! ```
//!
//! ## Coordinate System
//!
//! Locations are WGS84 degrees. Pixel space is the standard Web-Mercator
//! world grid: at zoom `z` the world is `256 * 2^z` pixels square, origin at
//! the north-west corner, y growing southward. Latitudes beyond
//! ±85.0511° are clamped onto the grid.

use geo::{Distance, Haversine, Point};
use std::f64::consts::PI;

use crate::{Bounds, LatLng, StagePoint, TileCoord};

/// Edge length of a slippy-map tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Latitude limit of the square Web-Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Mean Earth radius used by [`geo::Haversine`].
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

// Slack on search windows for floating-point error.
const WINDOW_MARGIN: f64 = 1.01;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in meters between two locations (Haversine formula).
#[inline]
pub fn haversine_distance(p1: LatLng, p2: LatLng) -> f64 {
    let point1 = Point::new(p1.lng, p1.lat);
    let point2 = Point::new(p2.lng, p2.lat);
    Haversine::distance(point1, point2)
}

/// Convert meters to degrees at a given latitude, for square buffers.
///
/// The larger of the two [`search_window`] half-widths, capped at 180°.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let (lat_window, lng_window) = search_window(meters, latitude);
    lng_window.unwrap_or(180.0).max(lat_window)
}

/// Half-widths in degrees `(lat, lng)` of a box around `latitude` that holds
/// every point closer than `meters` by Haversine distance.
///
/// The longitude half-width uses the most poleward latitude the box can reach,
/// so it never undercuts the true distance. It is `None` when the box would
/// span all longitudes (near the poles or for very large radii).
pub fn search_window(meters: f64, latitude: f64) -> (f64, Option<f64>) {
    let angle = meters / EARTH_RADIUS_M;
    let lat_window = angle.to_degrees() * WINDOW_MARGIN;

    let poleward = (latitude.abs() + lat_window).min(90.0);
    let cos = poleward.to_radians().cos();
    if cos <= 0.0 {
        return (lat_window, None);
    }
    let s = (angle / 2.0).min(PI / 2.0).sin() / cos;
    if s >= 1.0 {
        return (lat_window, None);
    }
    let lng_window = (2.0 * s.asin()).to_degrees() * WINDOW_MARGIN;
    (lat_window, (lng_window < 180.0).then_some(lng_window))
}

/// Absolute longitude difference in degrees, taking the short way across the
/// antimeridian. Always in `[0, 180]`.
#[inline]
pub fn lng_delta(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % 360.0;
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a point set.
///
/// For empty input the result has inverted MIN/MAX extents that fail any
/// overlap or containment check.
pub fn compute_bounds(points: &[StagePoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.lat);
        max_lat = max_lat.max(p.lat);
        min_lng = min_lng.min(p.lng);
        max_lng = max_lng.max(p.lng);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

/// Check if two bounding boxes overlap, with an optional buffer in meters.
pub fn bounds_overlap(a: &Bounds, b: &Bounds, buffer_meters: f64, reference_lat: f64) -> bool {
    let buffer_deg = meters_to_degrees(buffer_meters, reference_lat);

    !(a.max_lat + buffer_deg < b.min_lat
        || b.max_lat + buffer_deg < a.min_lat
        || a.max_lng + buffer_deg < b.min_lng
        || b.max_lng + buffer_deg < a.min_lng)
}

/// Arithmetic-mean centroid of a point set. Returns (0, 0) for empty input.
pub fn compute_center<'a, I>(points: I) -> LatLng
where
    I: IntoIterator<Item = &'a StagePoint>,
{
    let mut sum_lat = 0.0;
    let mut sum_lng = 0.0;
    let mut n = 0usize;
    for p in points {
        sum_lat += p.lat;
        sum_lng += p.lng;
        n += 1;
    }

    if n == 0 {
        return LatLng::new(0.0, 0.0);
    }
    LatLng::new(sum_lat / n as f64, sum_lng / n as f64)
}

// =============================================================================
// Web-Mercator Projection
// =============================================================================

/// World size in pixels at a zoom level.
#[inline]
pub fn world_scale(zoom: u8) -> f64 {
    TILE_SIZE as f64 * (1u64 << zoom) as f64
}

/// Project a location to Web-Mercator world pixels at `zoom`.
pub fn project(lat: f64, lng: f64, zoom: u8) -> (f64, f64) {
    let scale = world_scale(zoom);
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let sin_lat = lat.to_radians().sin();

    let x = (lng + 180.0) / 360.0 * scale;
    let y = (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI)) * scale;
    (x, y)
}

/// Inverse of [`project`].
pub fn unproject(x: f64, y: f64, zoom: u8) -> LatLng {
    let scale = world_scale(zoom);
    let lng = x / scale * 360.0 - 180.0;
    let n = PI - 2.0 * PI * y / scale;
    let lat = n.sinh().atan().to_degrees();
    LatLng::new(lat, lng)
}

/// Geographic bounds of a slippy-map tile.
pub fn tile_bounds(tile: TileCoord) -> Bounds {
    let size = TILE_SIZE as f64;
    let nw = unproject(tile.x as f64 * size, tile.y as f64 * size, tile.z);
    let se = unproject((tile.x + 1) as f64 * size, (tile.y + 1) as f64 * size, tile.z);
    Bounds {
        min_lat: se.lat,
        max_lat: nw.lat,
        min_lng: nw.lng,
        max_lng: se.lng,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GrowthStage;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = LatLng::new(14.1, 121.2);
        assert_eq!(haversine_distance(p, p), 0.0);
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // Manila to Cebu is roughly 570 km
        let manila = LatLng::new(14.5995, 120.9842);
        let cebu = LatLng::new(10.3157, 123.8854);
        let dist = haversine_distance(manila, cebu);
        assert!(approx_eq(dist, 570_000.0, 10_000.0));
    }

    #[test]
    fn test_meters_to_degrees() {
        // One degree of arc on the mean sphere, plus slack
        let one_degree = EARTH_RADIUS_M.to_radians();
        let deg = meters_to_degrees(one_degree, 0.0);
        assert!(deg >= 1.0 && deg < 1.02);

        let deg_45 = meters_to_degrees(one_degree, 45.0);
        assert!(approx_eq(deg_45, std::f64::consts::SQRT_2, 0.06));

        assert_eq!(meters_to_degrees(100.0, 90.0), 180.0);
    }

    #[test]
    fn test_compute_bounds_and_center() {
        let points = vec![
            StagePoint::new(10.0, 122.0, GrowthStage::Ripening),
            StagePoint::new(11.0, 123.0, GrowthStage::Tillering),
        ];
        let bounds = compute_bounds(&points);
        assert_eq!(bounds.min_lat, 10.0);
        assert_eq!(bounds.max_lng, 123.0);

        let center = compute_center(&points);
        assert!(approx_eq(center.lat, 10.5, 1e-9));
        assert!(approx_eq(center.lng, 122.5, 1e-9));
    }

    #[test]
    fn test_compute_center_empty() {
        let empty: Vec<StagePoint> = vec![];
        let center = compute_center(&empty);
        assert_eq!(center, LatLng::new(0.0, 0.0));
    }

    #[test]
    fn test_bounds_overlap() {
        let a = Bounds { min_lat: 10.0, max_lat: 10.1, min_lng: 122.0, max_lng: 122.1 };
        let b = Bounds { min_lat: 10.2, max_lat: 10.3, min_lng: 122.2, max_lng: 122.3 };
        assert!(!bounds_overlap(&a, &b, 0.0, 10.0));
        assert!(bounds_overlap(&a, &b, 20_000.0, 10.0));
    }

    #[test]
    fn test_project_origin_and_corners() {
        let (x, y) = project(0.0, 0.0, 0);
        assert!(approx_eq(x, 128.0, 1e-9));
        assert!(approx_eq(y, 128.0, 1e-9));

        let (x, y) = project(MAX_LATITUDE, -180.0, 1);
        assert!(approx_eq(x, 0.0, 1e-6));
        assert!(approx_eq(y, 0.0, 1e-6));
    }

    #[test]
    fn test_project_unproject_roundtrip() {
        let (x, y) = project(14.1, 121.2, 14);
        let back = unproject(x, y, 14);
        assert!(approx_eq(back.lat, 14.1, 1e-9));
        assert!(approx_eq(back.lng, 121.2, 1e-9));
    }

    #[test]
    fn test_tile_bounds_zoom_zero_is_world() {
        let b = tile_bounds(TileCoord { z: 0, x: 0, y: 0 });
        assert!(approx_eq(b.min_lng, -180.0, 1e-9));
        assert!(approx_eq(b.max_lng, 180.0, 1e-9));
        assert!(approx_eq(b.max_lat, MAX_LATITUDE, 1e-6));
    }

    #[test]
    fn test_search_window_covers_haversine_distance() {
        // 99.9 m due north and due east must sit inside the 100 m window
        let angle = 99.9 / EARTH_RADIUS_M;
        for lat in [0.0, 14.1, 45.0, -60.0, 84.0] {
            let (lat_w, lng_w) = search_window(100.0, lat);
            let lng_w = lng_w.unwrap();
            let origin = LatLng::new(lat, 121.2);

            let d_lat = angle.to_degrees();
            assert!(haversine_distance(origin, LatLng::new(lat + d_lat, 121.2)) < 100.0);
            assert!(d_lat < lat_w);

            let d_lng = (2.0 * ((angle / 2.0).sin() / lat.to_radians().cos()).asin()).to_degrees();
            assert!(haversine_distance(origin, LatLng::new(lat, 121.2 + d_lng)) < 100.0);
            assert!(d_lng < lng_w);
        }
    }

    #[test]
    fn test_search_window_at_pole_spans_all_longitudes() {
        let (lat_w, lng_w) = search_window(100.0, 90.0);
        assert!(lat_w > 0.0);
        assert!(lng_w.is_none());
        assert!(search_window(30_000_000.0, 0.0).1.is_none());
    }

    #[test]
    fn test_lng_delta_wraps_antimeridian() {
        assert!(approx_eq(lng_delta(179.9999, -179.9999), 0.0002, 1e-9));
        assert!(approx_eq(lng_delta(-170.0, 170.0), 20.0, 1e-9));
        assert!(approx_eq(lng_delta(121.2, 121.5), 0.3, 1e-9));
        assert!(approx_eq(lng_delta(0.0, 180.0), 180.0, 1e-9));
    }
}
