//! Geometry primitives shared by the GIFW map engine.
//!
//! The crate keeps the coordinate handling of the engine independent from any rendering library:
//!
//! * [`cartesian`] contains projected points, sizes and the [`Rect`](cartesian::Rect) type used for
//!   every extent check in the engine.
//! * [`geo`] contains geographic points, the [`Crs`](geo::Crs) type and the projections between them.
//! * [`geometry`] contains the [`Geom`](geometry::Geom) enum stored in vector features.
//! * [`geodesic`] computes lengths, areas and circles on the ellipsoid.
//! * [`buffer`] builds planar and geodesic buffers around geometries.

pub mod buffer;
pub mod cartesian;
pub mod error;
pub mod geo;
pub mod geodesic;
pub mod geometry;
pub mod segment;
pub mod units;

pub use cartesian::{CartesianPoint2d, Point2d, Rect, Size};
pub use self::geo::{Crs, GeoPoint2d};
pub use geometry::Geom;
pub use units::DistanceUnit;
