use gifw_types::cartesian::{Point2d, Rect, Size, Vector2d};
use gifw_types::geo::{Crs, GeoPoint2d};

use crate::error::GifwError;

/// Size of a tile in pixels used to convert between zoom levels and resolutions.
pub const TILE_SIZE: f64 = 256.0;

/// Current position and scale of the map.
///
/// The view is 2d: a center point in the map CRS, the size of a map unit in pixels (`resolution`),
/// the rotation around the center and the size of the map element in pixels. Screen coordinates
/// start in the top-left corner with `y` pointing down.
#[derive(Debug, Clone, PartialEq)]
pub struct MapView {
    center: Point2d,
    resolution: f64,
    rotation: f64,
    size: Size,
    crs: Crs,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            center: Point2d::origin(),
            resolution: 1.0,
            rotation: 0.0,
            size: Size::new(0.0, 0.0),
            crs: Crs::EPSG3857,
        }
    }
}

impl MapView {
    /// Creates a new view centered at the projected point.
    pub fn new(center: Point2d, resolution: f64, crs: Crs) -> Self {
        Self {
            center,
            resolution,
            crs,
            ..Default::default()
        }
    }

    /// Creates a new view centered at the geographic point.
    pub fn new_geo(center: &GeoPoint2d, resolution: f64, crs: Crs) -> Result<Self, GifwError> {
        let projected = crs.project(center)?;
        Ok(Self::new(projected, resolution, crs))
    }

    /// Center of the view in the map CRS.
    pub fn center(&self) -> Point2d {
        self.center
    }

    /// Center of the view as a geographic point.
    pub fn geo_center(&self) -> Result<GeoPoint2d, GifwError> {
        Ok(self.crs.unproject(&self.center)?)
    }

    /// Returns a copy of the view with the given center.
    pub fn with_center(&self, center: Point2d) -> Self {
        Self {
            center,
            ..self.clone()
        }
    }

    /// Size of one pixel in map units.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Returns a copy of the view with the given resolution.
    pub fn with_resolution(&self, resolution: f64) -> Self {
        Self {
            resolution,
            ..self.clone()
        }
    }

    /// Rotation of the map in radians, counterclockwise.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Returns a copy of the view with the given rotation.
    pub fn with_rotation(&self, rotation: f64) -> Self {
        Self {
            rotation,
            ..self.clone()
        }
    }

    /// Size of the map element in pixels.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Returns a copy of the view with the given size.
    pub fn with_size(&self, size: Size) -> Self {
        Self {
            size,
            ..self.clone()
        }
    }

    /// Map CRS.
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// Resolution at zoom level `0` for the CRS: the world is one tile wide.
    pub fn base_resolution(crs: &Crs) -> f64 {
        crs.world_extent()
            .map(|extent| extent.width() / TILE_SIZE)
            .unwrap_or(1.0)
    }

    /// Resolution corresponding to the zoom level in the CRS.
    pub fn resolution_for_zoom(crs: &Crs, zoom: f64) -> f64 {
        Self::base_resolution(crs) / 2f64.powf(zoom)
    }

    /// Fractional zoom level of the view.
    pub fn zoom(&self) -> f64 {
        (Self::base_resolution(&self.crs) / self.resolution).log2()
    }

    /// Returns a copy of the view at the given zoom level.
    pub fn with_zoom(&self, zoom: f64) -> Self {
        self.with_resolution(Self::resolution_for_zoom(&self.crs, zoom))
    }

    fn rotate(&self, v: Vector2d, angle: f64) -> Vector2d {
        let (sin, cos) = angle.sin_cos();
        Vector2d::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
    }

    /// Converts a screen position into map coordinates.
    pub fn px_to_map(&self, px: Point2d) -> Point2d {
        let offset = Vector2d::new(
            (px.x - self.size.half_width()) * self.resolution,
            (self.size.half_height() - px.y) * self.resolution,
        );

        self.center + self.rotate(offset, self.rotation)
    }

    /// Converts map coordinates into a screen position.
    pub fn map_to_px(&self, point: Point2d) -> Point2d {
        let offset = self.rotate(point - self.center, -self.rotation);
        Point2d::new(
            offset.x / self.resolution + self.size.half_width(),
            self.size.half_height() - offset.y / self.resolution,
        )
    }

    /// Area of the map covered by the view. Returns `None` if the view has no size.
    pub fn extent(&self) -> Option<Rect> {
        if self.size.is_zero() {
            return None;
        }

        let corners = [
            Point2d::new(0.0, 0.0),
            Point2d::new(self.size.width(), 0.0),
            Point2d::new(0.0, self.size.height()),
            Point2d::new(self.size.width(), self.size.height()),
        ]
        .map(|p| self.px_to_map(p));

        Rect::from_points(corners.iter())
    }

    /// Moves the view so that the map point under `from` ends up under `to`.
    pub fn translate_by_pixels(&self, from: Point2d, to: Point2d) -> Self {
        let delta = self.px_to_map(to) - self.px_to_map(from);
        self.with_center(self.center - delta)
    }

    /// Multiplies the resolution by `zoom` keeping the map point under `base_point` in place.
    pub fn zoom_around(&self, zoom: f64, base_point: Point2d) -> Self {
        let anchor = self.px_to_map(base_point);
        Self {
            center: anchor + (self.center - anchor) * zoom,
            resolution: self.resolution * zoom,
            ..self.clone()
        }
    }

    /// View between `self` (`k = 0`) and `target` (`k = 1`).
    pub fn interpolate(&self, target: &MapView, k: f64) -> Self {
        let resolution = (self.resolution.ln() + (target.resolution.ln() - self.resolution.ln()) * k)
            .exp();
        Self {
            center: self.center + (target.center - self.center) * k,
            resolution,
            rotation: self.rotation + (target.rotation - self.rotation) * k,
            ..target.clone()
        }
    }

    /// View showing the whole extent, zoomed in no further than `max_zoom`.
    pub fn fit(&self, extent: &Rect, max_zoom: f64) -> Self {
        let min_resolution = Self::resolution_for_zoom(&self.crs, max_zoom);
        let resolution = if self.size.is_zero() {
            self.resolution
        } else {
            (extent.width() / self.size.width()).max(extent.height() / self.size.height())
        };

        Self {
            center: extent.center(),
            resolution: resolution.max(min_resolution),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use super::*;

    fn square_view() -> MapView {
        MapView::default().with_size(Size::new(100.0, 100.0))
    }

    #[test]
    fn px_to_map_size() {
        let view = square_view();
        assert_abs_diff_eq!(
            view.px_to_map(Point2d::new(0.0, 0.0)),
            Point2d::new(-50.0, 50.0),
            epsilon = 0.0001,
        );
        assert_abs_diff_eq!(
            view.px_to_map(Point2d::new(50.0, 50.0)),
            Point2d::new(0.0, 0.0),
            epsilon = 0.0001,
        );
    }

    #[test]
    fn px_to_map_resolution_and_center() {
        let view = square_view()
            .with_center(Point2d::new(-100.0, -100.0))
            .with_resolution(2.0);
        assert_abs_diff_eq!(
            view.px_to_map(Point2d::new(100.0, 100.0)),
            Point2d::new(0.0, -200.0),
            epsilon = 0.0001,
        );
    }

    #[test]
    fn rotated_conversion_round_trips() {
        let view = square_view()
            .with_center(Point2d::new(1000.0, 500.0))
            .with_rotation(30f64.to_radians())
            .with_resolution(3.0);
        let px = Point2d::new(12.0, 87.0);
        assert_abs_diff_eq!(view.map_to_px(view.px_to_map(px)), px, epsilon = 1e-9);
    }

    #[test]
    fn zoom_levels() {
        let view = MapView::default().with_zoom(3.0);
        assert_relative_eq!(view.resolution(), 156_543.033_928_041 / 8.0, epsilon = 1e-6);
        assert_relative_eq!(view.zoom(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn zoom_around_keeps_anchor() {
        let view = square_view();
        let anchor = Point2d::new(10.0, 10.0);
        let before = view.px_to_map(anchor);
        let zoomed = view.zoom_around(0.5, anchor);
        assert_abs_diff_eq!(zoomed.px_to_map(anchor), before, epsilon = 1e-9);
        assert_relative_eq!(zoomed.resolution(), 0.5);
    }

    #[test]
    fn fit_respects_max_zoom() {
        let view = square_view();
        let fitted = view.fit(&Rect::new(0.0, 0.0, 1000.0, 500.0), 50.0);
        assert_relative_eq!(fitted.resolution(), 10.0);
        assert_eq!(fitted.center(), Point2d::new(500.0, 250.0));

        let tiny = Rect::new(0.0, 0.0, 0.001, 0.001);
        let fitted = view.fit(&tiny, 10.0);
        assert_relative_eq!(
            fitted.resolution(),
            MapView::resolution_for_zoom(&Crs::EPSG3857, 10.0)
        );
    }
}
