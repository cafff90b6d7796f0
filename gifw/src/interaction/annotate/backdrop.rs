use geo::BooleanOps;
use gifw_types::buffer::planar_buffer;
use gifw_types::cartesian::Rect;
use gifw_types::geometry::{Geom, Polygon};

/// Distance in pixels between a modified feature and the backdrop edge.
pub const BACKDROP_PADDING_PX: f64 = 10.0;

/// Area covering `world` with a hole around the geometry, drawn to dim everything but the
/// feature being modified.
///
/// The hole is the geometry buffered by `padding` map units. Self-intersecting polygons get a
/// rectangular hole around their extent instead.
pub fn backdrop_geometry(geometry: &Geom, world: &Rect, padding: f64) -> Option<Geom> {
    if geometry.is_self_intersecting() {
        let hole = geometry.extent()?.expand(padding);
        let outer = world.merge(hole).expand(padding);
        return Some(Geom::Polygon(Polygon::new(
            outer.into_quadrangle().to_vec(),
            vec![hole.into_quadrangle().to_vec()],
        )));
    }

    let hole = planar_buffer(geometry, padding)?;
    let outer = world.merge(hole.extent()?).expand(padding);
    let outer = geo::Polygon::new(
        outer
            .into_quadrangle()
            .iter()
            .map(|p| (p.x, p.y))
            .collect::<Vec<_>>()
            .into(),
        vec![],
    );
    let hole = match hole.to_geo() {
        geo::Geometry::Polygon(polygon) => geo::MultiPolygon::new(vec![polygon]),
        geo::Geometry::MultiPolygon(polygons) => polygons,
        _ => return None,
    };

    let backdrop = geo::MultiPolygon::new(vec![outer]).difference(&hole);
    let backdrop = Geom::from_geo(&geo::Geometry::MultiPolygon(backdrop)).ok()?;
    Geom::from_parts(backdrop.parts())
}

#[cfg(test)]
mod tests {
    use gifw_types::cartesian::Point2d;

    use super::*;

    #[test]
    fn hole_contains_feature() {
        let world = Rect::new(-1000.0, -1000.0, 1000.0, 1000.0);
        let line = Geom::LineString(vec![Point2d::new(0.0, 0.0), Point2d::new(100.0, 0.0)]);
        let backdrop = backdrop_geometry(&line, &world, 5.0).unwrap();

        assert!(!backdrop.contains_point(&Point2d::new(50.0, 0.0)));
        assert!(!backdrop.contains_point(&Point2d::new(50.0, 4.0)));
        assert!(backdrop.contains_point(&Point2d::new(50.0, 20.0)));
        assert!(backdrop.contains_point(&Point2d::new(-900.0, 900.0)));
    }

    #[test]
    fn notch_of_concave_feature_is_dimmed() {
        let world = Rect::new(-5000.0, -5000.0, 5000.0, 5000.0);
        let l_shape = Geom::Polygon(Polygon::new(
            vec![
                Point2d::new(0.0, 0.0),
                Point2d::new(1000.0, 0.0),
                Point2d::new(1000.0, 100.0),
                Point2d::new(100.0, 100.0),
                Point2d::new(100.0, 1000.0),
                Point2d::new(0.0, 1000.0),
            ],
            vec![],
        ));
        let backdrop = backdrop_geometry(&l_shape, &world, 10.0).unwrap();

        assert!(backdrop.contains_point(&Point2d::new(500.0, 500.0)));
        assert!(!backdrop.contains_point(&Point2d::new(50.0, 500.0)));
        assert!(!backdrop.contains_point(&Point2d::new(500.0, 105.0)));
    }

    #[test]
    fn self_intersecting_polygon_uses_extent() {
        let world = Rect::new(-1000.0, -1000.0, 1000.0, 1000.0);
        let bowtie = Geom::Polygon(Polygon::new(
            vec![
                Point2d::new(0.0, 0.0),
                Point2d::new(10.0, 10.0),
                Point2d::new(10.0, 0.0),
                Point2d::new(0.0, 10.0),
            ],
            vec![],
        ));
        let Some(Geom::Polygon(backdrop)) = backdrop_geometry(&bowtie, &world, 1.0) else {
            panic!("no backdrop");
        };

        assert_eq!(backdrop.interiors()[0].len(), 5);
        assert_eq!(backdrop.interiors()[0][0], Point2d::new(-1.0, -1.0));
    }
}
