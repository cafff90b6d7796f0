//! Line segments and ring validity checks.

use crate::cartesian::{CartesianPoint2d, Point2d};

/// Line segment between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment(pub Point2d, pub Point2d);

impl Segment {
    /// Shortest distance from the point to the segment.
    pub fn distance_to_point(&self, point: &Point2d) -> f64 {
        let Segment(a, b) = *self;
        let ab = b - a;
        let len_sq = ab.norm_squared();
        if len_sq == 0.0 {
            return point.distance(&a);
        }

        let t = ((point - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
        point.distance(&(a + ab * t))
    }

    /// Returns true if the segments share at least one point.
    pub fn intersects(&self, other: &Segment) -> bool {
        let o1 = orientation(self.0, self.1, other.0);
        let o2 = orientation(self.0, self.1, other.1);
        let o3 = orientation(other.0, other.1, self.0);
        let o4 = orientation(other.0, other.1, self.1);

        if o1 != o2 && o3 != o4 && o1 != 0 && o2 != 0 && o3 != 0 && o4 != 0 {
            return true;
        }

        (o1 == 0 && on_segment(self.0, other.0, self.1))
            || (o2 == 0 && on_segment(self.0, other.1, self.1))
            || (o3 == 0 && on_segment(other.0, self.0, other.1))
            || (o4 == 0 && on_segment(other.0, self.1, other.1))
    }
}

fn orientation(a: Point2d, b: Point2d, c: Point2d) -> i8 {
    let value = (b.y - a.y) * (c.x - b.x) - (b.x - a.x) * (c.y - b.y);
    if value.abs() < f64::EPSILON {
        0
    } else if value > 0.0 {
        1
    } else {
        -1
    }
}

fn on_segment(a: Point2d, p: Point2d, b: Point2d) -> bool {
    p.x <= a.x.max(b.x) && p.x >= a.x.min(b.x) && p.y <= a.y.max(b.y) && p.y >= a.y.min(b.y)
}

/// Iterates over the edges of a ring. The ring may or may not repeat its first point at the end.
pub fn ring_segments(ring: &[Point2d]) -> impl Iterator<Item = Segment> + '_ {
    let points = open_ring(ring);
    let count = if points.len() < 2 { 0 } else { points.len() };
    (0..count).map(move |i| Segment(points[i], points[(i + 1) % points.len()]))
}

fn open_ring(ring: &[Point2d]) -> &[Point2d] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

/// Returns true if two non-adjacent edges of the ring touch or cross each other.
pub fn ring_is_self_intersecting(ring: &[Point2d]) -> bool {
    let segments: Vec<Segment> = ring_segments(ring).collect();
    let n = segments.len();
    if n < 4 {
        return false;
    }

    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }

            if segments[i].intersects(&segments[j]) {
                return true;
            }
        }
    }

    false
}
