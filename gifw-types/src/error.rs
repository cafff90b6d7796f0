//! Error type used by the crate.

use thiserror::Error;

/// Error enum.
#[derive(Debug, Error, PartialEq)]
pub enum GifwTypesError {
    /// Geometry conversion error.
    #[error("invalid input geometry: {0}")]
    Conversion(String),
    /// The coordinate reference system is not supported by the engine.
    #[error("unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),
    /// Point cannot be projected into or from the target CRS.
    #[error("point is outside of the projection domain")]
    OutOfDomain,
    /// Unknown unit code.
    #[error("unknown distance unit: {0}")]
    UnknownUnit(String),
}
