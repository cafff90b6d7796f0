//! Geometry stored in vector features.

use geo::{Centroid, Contains};
use serde::{Deserialize, Serialize};

use crate::cartesian::{CartesianPoint2d, Point2d, Rect};
use crate::error::GifwTypesError;
use crate::geo::Crs;
use crate::segment::{ring_is_self_intersecting, Segment};

/// Type of a geometry or of the parts of a multi geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    /// Single point.
    Point,
    /// Open line.
    LineString,
    /// Polygon with optional holes.
    Polygon,
}

/// Polygon with closed rings. The first point of every ring is repeated at its end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    exterior: Vec<Point2d>,
    interiors: Vec<Vec<Point2d>>,
}

impl Polygon {
    /// Creates a new polygon, closing the rings if necessary.
    pub fn new(exterior: Vec<Point2d>, interiors: Vec<Vec<Point2d>>) -> Self {
        Self {
            exterior: close_ring(exterior),
            interiors: interiors.into_iter().map(close_ring).collect(),
        }
    }

    /// Outer ring.
    pub fn exterior(&self) -> &[Point2d] {
        &self.exterior
    }

    /// Holes.
    pub fn interiors(&self) -> &[Vec<Point2d>] {
        &self.interiors
    }

    fn rings(&self) -> impl Iterator<Item = &[Point2d]> {
        std::iter::once(self.exterior.as_slice()).chain(self.interiors.iter().map(|r| r.as_slice()))
    }

    fn to_geo(&self) -> geo::Polygon<f64> {
        geo::Polygon::new(
            ring_to_geo(&self.exterior),
            self.interiors.iter().map(|r| ring_to_geo(r)).collect(),
        )
    }
}

fn close_ring(mut ring: Vec<Point2d>) -> Vec<Point2d> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }

    ring
}

fn ring_to_geo(ring: &[Point2d]) -> geo::LineString<f64> {
    geo::LineString::from(ring.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>())
}

fn ring_from_geo(ring: &geo::LineString<f64>) -> Vec<Point2d> {
    ring.coords().map(|c| Point2d::new(c.x, c.y)).collect()
}

fn polygon_from_geo(polygon: &geo::Polygon<f64>) -> Polygon {
    Polygon::new(
        ring_from_geo(polygon.exterior()),
        polygon.interiors().iter().map(ring_from_geo).collect(),
    )
}

fn line_distance(points: &[Point2d], point: &Point2d) -> f64 {
    points
        .windows(2)
        .map(|w| Segment(w[0], w[1]).distance_to_point(point))
        .fold(f64::INFINITY, f64::min)
}

fn ring_vertices(ring: &[Point2d]) -> &[Point2d] {
    &ring[..ring.len().saturating_sub(1)]
}

fn move_ring_vertex(ring: &mut [Point2d], index: usize, to: Point2d) -> bool {
    if index + 1 >= ring.len() {
        return false;
    }

    ring[index] = to;
    if index == 0 {
        let last = ring.len() - 1;
        ring[last] = to;
    }
    true
}

/// Geometry of a vector feature in the coordinates of its layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geom {
    /// Point.
    Point(Point2d),
    /// Line string.
    LineString(Vec<Point2d>),
    /// Polygon.
    Polygon(Polygon),
    /// Set of points.
    MultiPoint(Vec<Point2d>),
    /// Set of line strings.
    MultiLineString(Vec<Vec<Point2d>>),
    /// Set of polygons.
    MultiPolygon(Vec<Polygon>),
}

impl Geom {
    /// Type of the geometry parts. A multi polygon is of [`GeometryType::Polygon`].
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geom::Point(_) | Geom::MultiPoint(_) => GeometryType::Point,
            Geom::LineString(_) | Geom::MultiLineString(_) => GeometryType::LineString,
            Geom::Polygon(_) | Geom::MultiPolygon(_) => GeometryType::Polygon,
        }
    }

    /// Returns true for the multi part variants.
    pub fn is_multi(&self) -> bool {
        matches!(
            self,
            Geom::MultiPoint(_) | Geom::MultiLineString(_) | Geom::MultiPolygon(_)
        )
    }

    /// Single part geometries this geometry consists of.
    pub fn parts(&self) -> Vec<Geom> {
        match self {
            Geom::MultiPoint(points) => points.iter().copied().map(Geom::Point).collect(),
            Geom::MultiLineString(lines) => lines.iter().cloned().map(Geom::LineString).collect(),
            Geom::MultiPolygon(polygons) => polygons.iter().cloned().map(Geom::Polygon).collect(),
            single => vec![single.clone()],
        }
    }

    /// Joins single part geometries of the same type into one geometry. A single part is returned
    /// as is. Returns `None` if there are no parts or they are of different types.
    pub fn from_parts(parts: Vec<Geom>) -> Option<Geom> {
        let geometry_type = parts.first()?.geometry_type();
        if parts.len() == 1 {
            return parts.into_iter().next();
        }

        let mut points = vec![];
        let mut lines = vec![];
        let mut polygons = vec![];
        for part in parts {
            match part {
                Geom::Point(p) if geometry_type == GeometryType::Point => points.push(p),
                Geom::LineString(l) if geometry_type == GeometryType::LineString => lines.push(l),
                Geom::Polygon(p) if geometry_type == GeometryType::Polygon => polygons.push(p),
                _ => return None,
            }
        }

        Some(match geometry_type {
            GeometryType::Point => Geom::MultiPoint(points),
            GeometryType::LineString => Geom::MultiLineString(lines),
            GeometryType::Polygon => Geom::MultiPolygon(polygons),
        })
    }

    /// Polygons of the geometry.
    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Geom::Polygon(polygon) => std::slice::from_ref(polygon),
            Geom::MultiPolygon(polygons) => polygons,
            _ => &[],
        }
    }

    /// Drawn lines of the geometry: the line strings and every polygon ring.
    pub fn lines(&self) -> Vec<&[Point2d]> {
        match self {
            Geom::Point(_) | Geom::MultiPoint(_) => vec![],
            Geom::LineString(points) => vec![points.as_slice()],
            Geom::MultiLineString(lines) => lines.iter().map(|l| l.as_slice()).collect(),
            Geom::Polygon(_) | Geom::MultiPolygon(_) => {
                self.polygons().iter().flat_map(|p| p.rings()).collect()
            }
        }
    }

    /// Iterates over all coordinates of the geometry.
    pub fn points(&self) -> Box<dyn Iterator<Item = &Point2d> + '_> {
        match self {
            Geom::Point(p) => Box::new(std::iter::once(p)),
            Geom::LineString(points) | Geom::MultiPoint(points) => Box::new(points.iter()),
            Geom::MultiLineString(lines) => Box::new(lines.iter().flatten()),
            Geom::Polygon(_) | Geom::MultiPolygon(_) => Box::new(
                self.polygons()
                    .iter()
                    .flat_map(|p| p.rings())
                    .flat_map(|r| r.iter()),
            ),
        }
    }

    /// Bounding box of the geometry.
    pub fn extent(&self) -> Option<Rect> {
        Rect::from_points(self.points())
    }

    /// Applies the function to every coordinate of the geometry.
    pub fn try_map_points<E>(
        &self,
        f: impl Fn(&Point2d) -> Result<Point2d, E>,
    ) -> Result<Geom, E> {
        let map_ring = |ring: &[Point2d]| ring.iter().map(&f).collect::<Result<Vec<_>, E>>();
        let map_polygon = |polygon: &Polygon| -> Result<Polygon, E> {
            Ok(Polygon {
                exterior: map_ring(&polygon.exterior)?,
                interiors: polygon
                    .interiors
                    .iter()
                    .map(|r| map_ring(r))
                    .collect::<Result<_, E>>()?,
            })
        };
        Ok(match self {
            Geom::Point(p) => Geom::Point(f(p)?),
            Geom::LineString(points) => Geom::LineString(map_ring(points)?),
            Geom::Polygon(polygon) => Geom::Polygon(map_polygon(polygon)?),
            Geom::MultiPoint(points) => Geom::MultiPoint(map_ring(points)?),
            Geom::MultiLineString(lines) => Geom::MultiLineString(
                lines.iter().map(|l| map_ring(l)).collect::<Result<_, E>>()?,
            ),
            Geom::MultiPolygon(polygons) => Geom::MultiPolygon(
                polygons.iter().map(map_polygon).collect::<Result<_, E>>()?,
            ),
        })
    }

    /// Transforms the geometry from one CRS into another.
    pub fn transform(&self, from: &Crs, to: &Crs) -> Result<Geom, GifwTypesError> {
        if from == to {
            return Ok(self.clone());
        }

        self.try_map_points(|p| from.transform_point(to, p))
    }

    /// Returns true if the point lies inside one of the polygons. Always false for points and
    /// lines.
    pub fn contains_point(&self, point: &Point2d) -> bool {
        let point = geo::Point::new(point.x, point.y);
        self.polygons()
            .iter()
            .any(|polygon| polygon.to_geo().contains(&point))
    }

    /// Distance from the point to the nearest drawn part of the geometry: the points, the lines
    /// or the polygon rings.
    pub fn distance_to_outline(&self, point: &Point2d) -> f64 {
        match self {
            Geom::Point(p) => p.distance(point),
            Geom::MultiPoint(points) => points
                .iter()
                .map(|p| p.distance(point))
                .fold(f64::INFINITY, f64::min),
            _ => self
                .lines()
                .into_iter()
                .map(|line| line_distance(line, point))
                .fold(f64::INFINITY, f64::min),
        }
    }

    /// Distance from the point to the geometry. Zero if the point is inside a polygon.
    pub fn distance_to_point(&self, point: &Point2d) -> f64 {
        if self.contains_point(point) {
            0.0
        } else {
            self.distance_to_outline(point)
        }
    }

    /// Geometric center.
    pub fn centroid(&self) -> Option<Point2d> {
        let point = match self {
            Geom::Point(p) => return Some(*p),
            Geom::LineString(points) => ring_to_geo(points).centroid()?,
            Geom::Polygon(polygon) => polygon.to_geo().centroid()?,
            multi => multi.to_geo().centroid()?,
        };

        Some(Point2d::new(point.x(), point.y()))
    }

    /// Editable vertices of the geometry: the points, the line vertices or the exterior ring
    /// without its closing point. Only the first part of multi lines and multi polygons is
    /// editable.
    pub fn vertices(&self) -> &[Point2d] {
        match self {
            Geom::Point(p) => std::slice::from_ref(p),
            Geom::LineString(points) | Geom::MultiPoint(points) => points,
            Geom::MultiLineString(lines) => lines.first().map(|l| l.as_slice()).unwrap_or(&[]),
            Geom::Polygon(_) | Geom::MultiPolygon(_) => self
                .polygons()
                .first()
                .map(|p| ring_vertices(&p.exterior))
                .unwrap_or(&[]),
        }
    }

    /// Index and distance of the vertex nearest to the point.
    pub fn nearest_vertex(&self, point: &Point2d) -> Option<(usize, f64)> {
        self.vertices()
            .iter()
            .enumerate()
            .map(|(i, v)| (i, v.distance(point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Moves the vertex with the given index. Returns false if there is no such vertex.
    pub fn move_vertex(&mut self, index: usize, to: Point2d) -> bool {
        let points = match self {
            Geom::Point(p) if index == 0 => {
                *p = to;
                return true;
            }
            Geom::Point(_) => return false,
            Geom::LineString(points) | Geom::MultiPoint(points) => points,
            Geom::MultiLineString(lines) => match lines.first_mut() {
                Some(line) => line,
                None => return false,
            },
            Geom::Polygon(polygon) => return move_ring_vertex(&mut polygon.exterior, index, to),
            Geom::MultiPolygon(polygons) => {
                return polygons
                    .first_mut()
                    .is_some_and(|p| move_ring_vertex(&mut p.exterior, index, to))
            }
        };

        match points.get_mut(index) {
            Some(point) => {
                *point = to;
                true
            }
            None => false,
        }
    }

    /// Returns true for polygons whose rings cross themselves.
    pub fn is_self_intersecting(&self) -> bool {
        self.polygons()
            .iter()
            .flat_map(|p| p.rings())
            .any(ring_is_self_intersecting)
    }

    /// Converts the geometry into `geo` types.
    pub fn to_geo(&self) -> geo::Geometry<f64> {
        let point = |p: &Point2d| geo::Point::new(p.x, p.y);
        match self {
            Geom::Point(p) => geo::Geometry::Point(point(p)),
            Geom::LineString(points) => geo::Geometry::LineString(ring_to_geo(points)),
            Geom::Polygon(polygon) => geo::Geometry::Polygon(polygon.to_geo()),
            Geom::MultiPoint(points) => {
                geo::Geometry::MultiPoint(points.iter().map(point).collect())
            }
            Geom::MultiLineString(lines) => geo::Geometry::MultiLineString(geo::MultiLineString(
                lines.iter().map(|l| ring_to_geo(l)).collect(),
            )),
            Geom::MultiPolygon(polygons) => geo::Geometry::MultiPolygon(geo::MultiPolygon(
                polygons.iter().map(Polygon::to_geo).collect(),
            )),
        }
    }

    /// Converts a `geo` geometry. Geometry collections, lines, rectangles and triangles are not
    /// supported.
    pub fn from_geo(geometry: &geo::Geometry<f64>) -> Result<Self, GifwTypesError> {
        let point = |p: &geo::Point<f64>| Point2d::new(p.x(), p.y());
        Ok(match geometry {
            geo::Geometry::Point(p) => Geom::Point(point(p)),
            geo::Geometry::LineString(line) => Geom::LineString(ring_from_geo(line)),
            geo::Geometry::Polygon(polygon) => Geom::Polygon(polygon_from_geo(polygon)),
            geo::Geometry::MultiPoint(points) => Geom::MultiPoint(points.iter().map(point).collect()),
            geo::Geometry::MultiLineString(lines) => {
                Geom::MultiLineString(lines.iter().map(ring_from_geo).collect())
            }
            geo::Geometry::MultiPolygon(polygons) => {
                Geom::MultiPolygon(polygons.iter().map(polygon_from_geo).collect())
            }
            other => {
                return Err(GifwTypesError::Conversion(format!(
                    "unsupported geometry type: {other:?}"
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn square() -> Geom {
        Geom::Polygon(Polygon::new(
            vec![
                Point2d::new(0.0, 0.0),
                Point2d::new(10.0, 0.0),
                Point2d::new(10.0, 10.0),
                Point2d::new(0.0, 10.0),
            ],
            vec![],
        ))
    }

    #[test]
    fn polygon_rings_are_closed() {
        let Geom::Polygon(polygon) = square() else {
            unreachable!()
        };
        assert_eq!(polygon.exterior().len(), 5);
        assert_eq!(polygon.exterior()[0], polygon.exterior()[4]);
    }

    #[test]
    fn polygon_distances() {
        let geom = square();
        assert!(geom.contains_point(&Point2d::new(5.0, 5.0)));
        assert_relative_eq!(geom.distance_to_point(&Point2d::new(5.0, 5.0)), 0.0);
        assert_relative_eq!(geom.distance_to_outline(&Point2d::new(5.0, 5.0)), 5.0);
        assert_relative_eq!(geom.distance_to_point(&Point2d::new(13.0, 5.0)), 3.0);
    }

    #[test]
    fn moving_first_vertex_keeps_ring_closed() {
        let mut geom = square();
        assert!(geom.move_vertex(0, Point2d::new(-1.0, -1.0)));
        let Geom::Polygon(polygon) = &geom else {
            unreachable!()
        };
        assert_eq!(polygon.exterior()[4], Point2d::new(-1.0, -1.0));
        assert_eq!(geom.vertices().len(), 4);
        assert!(!geom.move_vertex(4, Point2d::new(0.0, 0.0)));
    }

    #[test]
    fn nearest_vertex_is_found() {
        let geom = square();
        let (index, distance) = geom.nearest_vertex(&Point2d::new(9.0, 9.0)).unwrap();
        assert_eq!(index, 2);
        assert_relative_eq!(distance, 2f64.sqrt());
    }

    fn two_squares() -> Geom {
        let Geom::Polygon(first) = square() else {
            unreachable!()
        };
        let second = Polygon::new(
            vec![
                Point2d::new(20.0, 0.0),
                Point2d::new(30.0, 0.0),
                Point2d::new(30.0, 10.0),
                Point2d::new(20.0, 10.0),
            ],
            vec![],
        );
        Geom::MultiPolygon(vec![first, second])
    }

    #[test]
    fn multi_polygon_hit_testing() {
        let geom = two_squares();
        assert_eq!(geom.geometry_type(), GeometryType::Polygon);
        assert!(geom.is_multi());
        assert!(geom.contains_point(&Point2d::new(25.0, 5.0)));
        assert!(!geom.contains_point(&Point2d::new(15.0, 5.0)));
        assert_relative_eq!(geom.distance_to_point(&Point2d::new(15.0, 5.0)), 5.0);
        assert_eq!(geom.extent(), Some(Rect::new(0.0, 0.0, 30.0, 10.0)));
        assert_relative_eq!(geom.centroid().unwrap().x, 15.0);
    }

    #[test]
    fn multi_geometries_from_geo() {
        let lines = geo::Geometry::MultiLineString(geo::MultiLineString(vec![
            geo::LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]),
            geo::LineString::from(vec![(5.0, 5.0), (6.0, 5.0)]),
        ]));
        let geom = Geom::from_geo(&lines).unwrap();
        assert_eq!(geom.parts().len(), 2);
        assert_relative_eq!(geom.distance_to_outline(&Point2d::new(5.5, 6.0)), 1.0);
        assert_eq!(geom.to_geo(), lines);

        let points = geo::Geometry::MultiPoint(vec![(0.0, 0.0), (3.0, 4.0)].into());
        let geom = Geom::from_geo(&points).unwrap();
        assert_eq!(geom.geometry_type(), GeometryType::Point);
        assert_relative_eq!(geom.distance_to_point(&Point2d::new(3.0, 3.0)), 1.0);

        let collection = geo::Geometry::GeometryCollection(geo::GeometryCollection::new_from(vec![]));
        assert!(Geom::from_geo(&collection).is_err());
    }

    #[test]
    fn parts_are_joined_back() {
        let geom = two_squares();
        assert_eq!(Geom::from_parts(geom.parts()), Some(geom.clone()));
        assert_eq!(Geom::from_parts(vec![]), None);
        assert_eq!(
            Geom::from_parts(vec![Geom::Point(Point2d::origin()), square()]),
            None
        );
        assert_eq!(Geom::from_parts(vec![square()]), Some(square()));
    }

    #[test]
    fn first_part_of_multi_polygon_is_editable() {
        let mut geom = two_squares();
        assert_eq!(geom.vertices().len(), 4);
        assert!(geom.move_vertex(0, Point2d::new(-1.0, -1.0)));
        let Geom::MultiPolygon(polygons) = &geom else {
            unreachable!()
        };
        assert_eq!(polygons[0].exterior()[4], Point2d::new(-1.0, -1.0));
        assert_eq!(polygons[1].exterior()[0], Point2d::new(20.0, 0.0));
    }
}
