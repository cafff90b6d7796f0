pub use nalgebra::{Point2, Vector2};

/// 2d point in projected coordinates.
pub type Point2d = Point2<f64>;
/// 2d vector in projected coordinates.
pub type Vector2d = Vector2<f64>;

/// Point in a cartesian coordinate system.
pub trait CartesianPoint2d {
    /// X coordinate.
    fn x(&self) -> f64;
    /// Y coordinate.
    fn y(&self) -> f64;

    /// Vector from `other` to this point.
    fn sub(&self, other: &impl CartesianPoint2d) -> Vector2d {
        Vector2d::new(self.x() - other.x(), self.y() - other.y())
    }

    /// Squared euclidean distance to the other point.
    fn distance_sq(&self, other: &impl CartesianPoint2d) -> f64 {
        let v = self.sub(other);
        v.x * v.x + v.y * v.y
    }

    /// Euclidean distance to the other point.
    fn distance(&self, other: &impl CartesianPoint2d) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Distance measured along the axes.
    fn taxicab_distance(&self, other: &impl CartesianPoint2d) -> f64 {
        (self.x() - other.x()).abs() + (self.y() - other.y()).abs()
    }
}

impl CartesianPoint2d for Point2d {
    fn x(&self) -> f64 {
        self.x
    }

    fn y(&self) -> f64 {
        self.y
    }
}

impl<T: CartesianPoint2d> CartesianPoint2d for &T {
    fn x(&self) -> f64 {
        (*self).x()
    }

    fn y(&self) -> f64 {
        (*self).y()
    }
}
