//! Lengths, areas and circles computed on the WGS84 ellipsoid.

use geo::{GeodesicArea, GeodesicDestination, GeodesicLength};

use crate::geo::GeoPoint2d;

/// Number of vertices used to approximate a circle.
pub const CIRCLE_VERTICES: usize = 64;

/// Length of the line in metres.
pub fn geodesic_length(points: &[GeoPoint2d]) -> f64 {
    let line: geo::LineString<f64> = points.iter().map(|p| p.to_geo()).collect();
    line.geodesic_length()
}

/// Area enclosed by the ring in square metres. The ring may be open or closed.
pub fn geodesic_area(ring: &[GeoPoint2d]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }

    let exterior: geo::LineString<f64> = ring.iter().map(|p| p.to_geo()).collect();
    geo::Polygon::new(exterior, vec![]).geodesic_area_unsigned()
}

/// Closed ring of points lying `radius` metres away from the center.
pub fn geodesic_circle(center: &GeoPoint2d, radius: f64, vertices: usize) -> Vec<GeoPoint2d> {
    let vertices = vertices.max(3);
    let origin = center.to_geo();
    let mut ring: Vec<GeoPoint2d> = (0..vertices)
        .map(|i| {
            let bearing = 360.0 * i as f64 / vertices as f64;
            GeoPoint2d::from_geo(origin.geodesic_destination(bearing, radius))
        })
        .collect();

    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }

    ring
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::latlon;

    #[test]
    fn circle_points_are_at_radius() {
        let center = latlon!(52.0, 0.0);
        let ring = geodesic_circle(&center, 1000.0, 16);
        assert_eq!(ring.len(), 17);
        assert_eq!(ring.first(), ring.last());
        for point in &ring {
            assert_relative_eq!(
                geodesic_length(&[center, *point]),
                1000.0,
                max_relative = 1e-6
            );
        }
    }

    #[test]
    fn equator_degree_length() {
        let length = geodesic_length(&[latlon!(0.0, 0.0), latlon!(0.0, 1.0)]);
        assert_relative_eq!(length, 111_319.49, epsilon = 1.0);
    }

    #[test]
    fn area_of_degenerate_ring_is_zero() {
        assert_eq!(geodesic_area(&[latlon!(0.0, 0.0), latlon!(0.0, 1.0)]), 0.0);
    }
}
