use super::datum::Datum;
use super::point::GeoPoint2d;
use crate::cartesian::Point2d;

/// Projection from geographic coordinates into a cartesian plane.
pub trait Projection {
    /// Projects a geographic point. Returns `None` if the point is outside of the projection domain.
    fn project(&self, input: &GeoPoint2d) -> Option<Point2d>;
    /// Inverse transformation.
    fn unproject(&self, input: &Point2d) -> Option<GeoPoint2d>;
}

/// Spherical mercator used by most web basemaps (EPSG:3857).
#[derive(Debug, Copy, Clone, Default)]
pub struct WebMercator {
    datum: Datum,
}

impl WebMercator {
    /// Latitude limit of the projection.
    pub const MAX_LAT: f64 = 85.06;

    /// Creates the projection for the given datum.
    pub fn new(datum: Datum) -> Self {
        Self { datum }
    }
}

impl Projection for WebMercator {
    fn project(&self, input: &GeoPoint2d) -> Option<Point2d> {
        if input.lat().abs() >= 90.0 {
            return None;
        }

        let x = self.datum.semimajor() * input.lon_rad();
        let y = self.datum.semimajor()
            * (std::f64::consts::FRAC_PI_4 + input.lat_rad() / 2.0)
                .tan()
                .ln();

        if x.is_finite() && y.is_finite() {
            Some(Point2d::new(x, y))
        } else {
            None
        }
    }

    fn unproject(&self, input: &Point2d) -> Option<GeoPoint2d> {
        let lat = 2.0 * (input.y / self.datum.semimajor()).exp().atan() - std::f64::consts::FRAC_PI_2;
        let lon = input.x / self.datum.semimajor();

        if lat.is_finite() && lon.is_finite() {
            Some(GeoPoint2d::latlon(lat.to_degrees(), lon.to_degrees()))
        } else {
            None
        }
    }
}

/// Plate carrée: longitude and latitude used directly as x and y (EPSG:4326).
#[derive(Debug, Copy, Clone, Default)]
pub struct Geographic;

impl Projection for Geographic {
    fn project(&self, input: &GeoPoint2d) -> Option<Point2d> {
        if input.lat().abs() > 90.0 || input.lon().abs() > 180.0 {
            return None;
        }

        Some(Point2d::new(input.lon(), input.lat()))
    }

    fn unproject(&self, input: &Point2d) -> Option<GeoPoint2d> {
        Some(GeoPoint2d::lonlat(input.x, input.y))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::latlon;

    #[test]
    fn web_mercator_round_trip() {
        let projection = WebMercator::default();
        let point = latlon!(51.8642, -2.2382);
        let projected = projection.project(&point).unwrap();
        assert_abs_diff_eq!(projected.x, -249_155.3, epsilon = 0.1);

        let back = projection.unproject(&projected).unwrap();
        assert_abs_diff_eq!(back.lat(), point.lat(), epsilon = 1e-9);
        assert_abs_diff_eq!(back.lon(), point.lon(), epsilon = 1e-9);
    }

    #[test]
    fn web_mercator_rejects_pole() {
        assert!(WebMercator::default().project(&latlon!(90.0, 0.0)).is_none());
    }
}
