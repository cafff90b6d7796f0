//! Buffers around geometries.
//!
//! A buffer is the union of a disc around every vertex, a strip along every segment and the area
//! of every polygon, so concave shapes keep their notches.

use geo::{BooleanOps, GeodesicBearing, GeodesicDestination};

use crate::cartesian::{Point2d, Vector2d};
use crate::geo::GeoPoint2d;
use crate::geodesic::{geodesic_circle, CIRCLE_VERTICES};
use crate::geometry::Geom;

trait BufferSpace {
    /// Ring around the center.
    fn disc(&self, center: &Point2d) -> Vec<Point2d>;
    /// Points at buffer distance on both sides of the segment ends in ring order.
    fn strip(&self, a: &Point2d, b: &Point2d) -> [Point2d; 4];
}

struct Planar {
    radius: f64,
}

impl BufferSpace for Planar {
    fn disc(&self, center: &Point2d) -> Vec<Point2d> {
        (0..CIRCLE_VERTICES)
            .map(|i| {
                let angle = std::f64::consts::TAU * i as f64 / CIRCLE_VERTICES as f64;
                Point2d::new(
                    center.x + self.radius * angle.cos(),
                    center.y + self.radius * angle.sin(),
                )
            })
            .collect()
    }

    fn strip(&self, a: &Point2d, b: &Point2d) -> [Point2d; 4] {
        let direction = (b - a).normalize();
        let normal = Vector2d::new(-direction.y, direction.x) * self.radius;
        [a + normal, b + normal, b - normal, a - normal]
    }
}

/// Coordinates are longitude and latitude in degrees, the radius is in metres.
struct Geodesic {
    radius: f64,
}

fn to_geo_point(p: &Point2d) -> geo::Point<f64> {
    geo::Point::new(p.x, p.y)
}

fn from_geo_point(p: geo::Point<f64>) -> Point2d {
    Point2d::new(p.x(), p.y())
}

impl BufferSpace for Geodesic {
    fn disc(&self, center: &Point2d) -> Vec<Point2d> {
        geodesic_circle(&GeoPoint2d::lonlat(center.x, center.y), self.radius, CIRCLE_VERTICES)
            .iter()
            .map(|p| Point2d::new(p.lon(), p.lat()))
            .collect()
    }

    fn strip(&self, a: &Point2d, b: &Point2d) -> [Point2d; 4] {
        let (a, b) = (to_geo_point(a), to_geo_point(b));
        let forward = a.geodesic_bearing(b);
        let backward = b.geodesic_bearing(a);
        let offset = |p: geo::Point<f64>, bearing: f64| {
            from_geo_point(p.geodesic_destination(bearing, self.radius))
        };
        [
            offset(a, forward - 90.0),
            offset(b, backward + 90.0),
            offset(b, backward - 90.0),
            offset(a, forward + 90.0),
        ]
    }
}

fn ring_polygon(ring: Vec<Point2d>) -> geo::MultiPolygon<f64> {
    let exterior: geo::LineString<f64> = ring.iter().map(|p| (p.x, p.y)).collect();
    geo::MultiPolygon::new(vec![geo::Polygon::new(exterior, vec![])])
}

/// Unions the pieces pairwise, so every union joins pieces of similar size.
fn union_all(mut pieces: Vec<geo::MultiPolygon<f64>>) -> Option<geo::MultiPolygon<f64>> {
    while pieces.len() > 1 {
        let mut merged = Vec::with_capacity(pieces.len().div_ceil(2));
        let mut iter = pieces.into_iter();
        while let Some(first) = iter.next() {
            merged.push(match iter.next() {
                Some(second) => first.union(&second),
                None => first,
            });
        }
        pieces = merged;
    }

    pieces.pop()
}

fn buffer_in(geometry: &Geom, space: &impl BufferSpace) -> Option<Geom> {
    let mut pieces = vec![];
    let mut vertices: Vec<Point2d> = match geometry {
        Geom::Point(p) => vec![*p],
        Geom::MultiPoint(points) => points.clone(),
        _ => vec![],
    };

    for line in geometry.lines() {
        for segment in line.windows(2) {
            if segment[0] != segment[1] {
                pieces.push(ring_polygon(space.strip(&segment[0], &segment[1]).to_vec()));
            }
        }
        vertices.extend(line.iter().copied());
    }

    let mut discs: Vec<Point2d> = vec![];
    for vertex in vertices {
        if !discs.contains(&vertex) {
            discs.push(vertex);
        }
    }
    pieces.extend(discs.iter().map(|p| ring_polygon(space.disc(p))));

    match geometry.to_geo() {
        geo::Geometry::Polygon(polygon) => pieces.push(geo::MultiPolygon::new(vec![polygon])),
        geo::Geometry::MultiPolygon(polygons) => pieces.push(polygons),
        _ => {}
    }

    let union = union_all(pieces)?;
    Geom::from_geo(&geo::Geometry::MultiPolygon(union))
        .ok()
        .and_then(|multi| Geom::from_parts(multi.parts()))
}

/// Area within `radius` map units of the geometry given in projected coordinates.
///
/// Returns a polygon, or a multi polygon if the buffers of the parts do not touch. Returns `None`
/// for empty geometries.
pub fn planar_buffer(geometry: &Geom, radius: f64) -> Option<Geom> {
    buffer_in(geometry, &Planar { radius })
}

/// Area within `radius` metres of the geometry given in longitude and latitude degrees.
///
/// Distances are measured on the WGS84 ellipsoid.
pub fn geodesic_buffer(geometry: &Geom, radius: f64) -> Option<Geom> {
    buffer_in(geometry, &Geodesic { radius })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::geometry::Polygon;

    fn l_shape() -> Geom {
        Geom::Polygon(Polygon::new(
            vec![
                Point2d::new(0.0, 0.0),
                Point2d::new(1000.0, 0.0),
                Point2d::new(1000.0, 100.0),
                Point2d::new(100.0, 100.0),
                Point2d::new(100.0, 1000.0),
                Point2d::new(0.0, 1000.0),
            ],
            vec![],
        ))
    }

    #[test]
    fn line_buffer_extent() {
        let line = Geom::LineString(vec![Point2d::new(0.0, 0.0), Point2d::new(100.0, 0.0)]);
        let buffer = planar_buffer(&line, 10.0).unwrap();
        let rect = buffer.extent().unwrap();
        assert_relative_eq!(rect.x_min, -10.0, epsilon = 1e-9);
        assert_relative_eq!(rect.x_max, 110.0, epsilon = 1e-9);
        assert_relative_eq!(rect.y_max, 10.0, epsilon = 1e-9);
        assert!(buffer.contains_point(&Point2d::new(50.0, 9.0)));
        assert!(!buffer.contains_point(&Point2d::new(50.0, 11.0)));
    }

    #[test]
    fn concave_polygon_keeps_its_notch() {
        let buffer = planar_buffer(&l_shape(), 10.0).unwrap();
        assert!(buffer.contains_point(&Point2d::new(50.0, 50.0)));
        assert!(buffer.contains_point(&Point2d::new(500.0, 105.0)));
        assert!(!buffer.contains_point(&Point2d::new(500.0, 500.0)));
        assert_relative_eq!(buffer.extent().unwrap().x_max, 1010.0, epsilon = 1e-9);
    }

    #[test]
    fn concave_line_keeps_its_notch() {
        let line = Geom::LineString(vec![
            Point2d::new(0.0, 1000.0),
            Point2d::new(0.0, 0.0),
            Point2d::new(1000.0, 0.0),
        ]);
        let buffer = planar_buffer(&line, 20.0).unwrap();
        assert!(buffer.contains_point(&Point2d::new(10.0, 500.0)));
        assert!(!buffer.contains_point(&Point2d::new(300.0, 300.0)));
    }

    #[test]
    fn distant_points_give_multi_polygon() {
        let points = Geom::MultiPoint(vec![Point2d::new(0.0, 0.0), Point2d::new(100.0, 0.0)]);
        let buffer = planar_buffer(&points, 10.0).unwrap();
        assert_eq!(buffer.polygons().len(), 2);
        assert!(!buffer.contains_point(&Point2d::new(50.0, 0.0)));

        assert!(planar_buffer(&Geom::LineString(vec![]), 10.0).is_none());
    }

    #[test]
    fn geodesic_line_buffer_width() {
        let line = Geom::LineString(vec![Point2d::new(0.0, 0.0), Point2d::new(0.01, 0.0)]);
        let buffer = geodesic_buffer(&line, 100.0).unwrap();
        let rect = buffer.extent().unwrap();
        // 100 m is about 0.0009 degrees of latitude at the equator.
        assert_relative_eq!(rect.y_max, 0.000904, epsilon = 1e-5);
        assert_relative_eq!(rect.y_min, -0.000904, epsilon = 1e-5);
        assert!(buffer.contains_point(&Point2d::new(0.005, 0.0008)));
    }
}
