use super::datum::Datum;
use super::point::GeoPoint2d;
use super::projection::{Geographic, Projection, WebMercator};
use crate::cartesian::{Point2d, Rect};
use crate::error::GifwTypesError;

const WEB_MERCATOR_HALF_WORLD: f64 = 20_037_508.342_789_244;

/// Coordinate reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    epsg: u32,
    datum: Datum,
    projection_type: ProjectionType,
}

/// Type of the projection used by a [`Crs`].
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProjectionType {
    /// Spherical mercator.
    WebMercator,
    /// Longitude and latitude used as coordinates.
    Geographic,
    /// Projection the engine knows by code only. Points cannot be transformed into or from it.
    Other,
}

impl Crs {
    /// Web mercator (EPSG:3857).
    pub const EPSG3857: Crs = Crs {
        epsg: 3857,
        datum: Datum::WGS84,
        projection_type: ProjectionType::WebMercator,
    };

    /// WGS84 geographic coordinates (EPSG:4326).
    pub const EPSG4326: Crs = Crs {
        epsg: 4326,
        datum: Datum::WGS84,
        projection_type: ProjectionType::Geographic,
    };

    /// Parses codes like `EPSG:3857` or `3857`.
    pub fn from_code(code: &str) -> Result<Self, GifwTypesError> {
        let number = code
            .trim()
            .strip_prefix("EPSG:")
            .or_else(|| code.trim().strip_prefix("epsg:"))
            .unwrap_or(code.trim());
        let epsg: u32 = number
            .parse()
            .map_err(|_| GifwTypesError::UnsupportedCrs(code.to_string()))?;

        Ok(Self::from_epsg(epsg))
    }

    /// Creates a CRS from its EPSG number.
    pub fn from_epsg(epsg: u32) -> Self {
        match epsg {
            3857 | 900913 | 102100 => Self::EPSG3857,
            4326 => Self::EPSG4326,
            _ => Self {
                epsg,
                datum: Datum::WGS84,
                projection_type: ProjectionType::Other,
            },
        }
    }

    /// EPSG number.
    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Code in `EPSG:XXXX` form.
    pub fn code(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }

    /// Projection type.
    pub fn projection_type(&self) -> &ProjectionType {
        &self.projection_type
    }

    /// Returns true if points can be transformed into and from this CRS.
    pub fn is_supported(&self) -> bool {
        self.projection().is_some()
    }

    /// Projection from geographic coordinates into this CRS.
    pub fn projection(&self) -> Option<Box<dyn Projection>> {
        match self.projection_type {
            ProjectionType::WebMercator => Some(Box::new(WebMercator::new(self.datum))),
            ProjectionType::Geographic => Some(Box::new(Geographic)),
            ProjectionType::Other => None,
        }
    }

    /// Valid extent of the CRS in its own units.
    pub fn world_extent(&self) -> Option<Rect> {
        match self.projection_type {
            ProjectionType::WebMercator => Some(Rect::new(
                -WEB_MERCATOR_HALF_WORLD,
                -WEB_MERCATOR_HALF_WORLD,
                WEB_MERCATOR_HALF_WORLD,
                WEB_MERCATOR_HALF_WORLD,
            )),
            ProjectionType::Geographic => Some(Rect::new(-180.0, -90.0, 180.0, 90.0)),
            ProjectionType::Other => None,
        }
    }

    /// Number of meters in one unit of the CRS at the equator.
    pub fn meters_per_unit(&self) -> f64 {
        match self.projection_type {
            ProjectionType::Geographic => {
                2.0 * std::f64::consts::PI * self.datum.semimajor() / 360.0
            }
            _ => 1.0,
        }
    }

    /// Projects a geographic point into this CRS.
    pub fn project(&self, point: &GeoPoint2d) -> Result<Point2d, GifwTypesError> {
        let projection = self
            .projection()
            .ok_or_else(|| GifwTypesError::UnsupportedCrs(self.code()))?;
        projection.project(point).ok_or(GifwTypesError::OutOfDomain)
    }

    /// Converts a point in this CRS into geographic coordinates.
    pub fn unproject(&self, point: &Point2d) -> Result<GeoPoint2d, GifwTypesError> {
        let projection = self
            .projection()
            .ok_or_else(|| GifwTypesError::UnsupportedCrs(self.code()))?;
        projection.unproject(point).ok_or(GifwTypesError::OutOfDomain)
    }

    /// Transforms a point from this CRS into the `target` one.
    pub fn transform_point(&self, target: &Crs, point: &Point2d) -> Result<Point2d, GifwTypesError> {
        if self == target {
            return Ok(*point);
        }

        target.project(&self.unproject(point)?)
    }

    /// Transforms an extent by transforming its corners and taking their bounding box.
    pub fn transform_rect(&self, target: &Crs, rect: &Rect) -> Result<Rect, GifwTypesError> {
        if self == target {
            return Ok(*rect);
        }

        let corners = rect
            .into_quadrangle()
            .iter()
            .map(|p| self.transform_point(target, p))
            .collect::<Result<Vec<_>, _>>()?;
        Rect::from_points(corners.iter()).ok_or(GifwTypesError::OutOfDomain)
    }
}
