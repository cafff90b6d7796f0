//! Geographic coordinates, coordinate reference systems and projections.

mod crs;
mod datum;
mod point;
mod projection;

pub use crs::{Crs, ProjectionType};
pub use datum::Datum;
pub use point::GeoPoint2d;
pub use projection::{Geographic, Projection, WebMercator};
