use std::time::Duration;

use gifw_types::cartesian::{Point2d, Rect};
use gifw_types::geo::Crs;

use crate::config::BoundConfig;
use crate::control::{EventPropagation, MouseButton, MouseEvent, UserEvent, UserEventHandler};
use crate::engine::Session;
use crate::error::GifwError;
use crate::event_bus::MapEvent;
use crate::view::MapView;

const WHEEL_ZOOM_DURATION: Duration = Duration::from_millis(250);
const DOUBLE_CLICK_ZOOM_DURATION: Duration = Duration::from_millis(250);
const ROTATION_PER_PIXEL: f64 = 0.005;

/// Limits and speeds of the default pan and zoom interactions.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct MapControllerConfiguration {
    wheel_zoom_duration: Duration,
    zoom_speed: f64,
    min_zoom: f64,
    max_zoom: f64,
    bounds: Option<Rect>,
    rotation: bool,
}

impl Default for MapControllerConfiguration {
    fn default() -> Self {
        Self {
            wheel_zoom_duration: WHEEL_ZOOM_DURATION,
            zoom_speed: 0.2,
            min_zoom: 0.0,
            max_zoom: 28.0,
            bounds: None,
            rotation: true,
        }
    }
}

impl MapControllerConfiguration {
    /// Configuration restricted to the bound area of a version.
    ///
    /// The extent of the bound is given in degrees and is projected into `crs`.
    pub fn from_bound(bound: &BoundConfig, crs: &Crs) -> Result<Self, GifwError> {
        let extent = Crs::EPSG4326.transform_rect(crs, &Rect::from_array(bound.extent))?;
        let default = Self::default();
        Ok(default
            .with_zoom_range(
                bound.min_zoom.unwrap_or(default.min_zoom),
                bound.max_zoom.unwrap_or(default.max_zoom),
            )
            .with_bounds(Some(extent)))
    }

    /// Duration of the animation of one mouse wheel step.
    pub fn wheel_zoom_duration(&self) -> Duration {
        self.wheel_zoom_duration
    }

    /// Sets the duration of the animation of one mouse wheel step.
    pub fn with_wheel_zoom_duration(mut self, duration: Duration) -> Self {
        self.wheel_zoom_duration = duration;
        self
    }

    /// Resolution change of one wheel step. `0.2` zooms by 20% per step.
    pub fn zoom_speed(&self) -> f64 {
        self.zoom_speed
    }

    /// Sets the resolution change of one wheel step.
    pub fn with_zoom_speed(mut self, speed: f64) -> Self {
        self.zoom_speed = speed;
        self
    }

    /// Allowed zoom levels.
    pub fn zoom_range(&self) -> (f64, f64) {
        (self.min_zoom, self.max_zoom)
    }

    /// Sets the allowed zoom levels.
    pub fn with_zoom_range(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom.min(max_zoom);
        self.max_zoom = max_zoom.max(min_zoom);
        self
    }

    /// Area in map coordinates the center of the view must stay in.
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    /// Sets the area the center of the view must stay in.
    pub fn with_bounds(mut self, bounds: Option<Rect>) -> Self {
        self.bounds = bounds;
        self
    }

    /// Allows or forbids rotating the map with Alt+Shift drag.
    pub fn with_rotation(mut self, enabled: bool) -> Self {
        self.rotation = enabled;
        self
    }
}

/// Default handler of the map: drag to pan, wheel and double click to zoom, Alt+Shift drag to
/// rotate.
///
/// The handler runs after the active mode controller, so a mode that consumes clicks or drags
/// disables the matching map gesture. Starting a pan stops the running animation and publishes
/// [`MapEvent::MoveStart`]. Every finished gesture requests a permalink update.
#[derive(Default, Copy, Clone, PartialEq, Debug)]
pub struct MapController {
    config: MapControllerConfiguration,
}

impl MapController {
    /// Creates a controller with the given configuration.
    pub fn new(config: MapControllerConfiguration) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> MapControllerConfiguration {
        self.config
    }

    /// Replaces the configuration.
    pub fn set_config(&mut self, config: MapControllerConfiguration) {
        self.config = config;
    }
}

fn is_rotation_gesture(event: &MouseEvent) -> bool {
    event.modifiers.alt && event.modifiers.shift
}

impl UserEventHandler for MapController {
    fn handle(&mut self, event: &UserEvent, session: &mut Session) -> EventPropagation {
        match event {
            UserEvent::DragStarted(MouseButton::Left | MouseButton::Middle, _) => {
                session.map_mut().stop_animation();
                session.bus_mut().publish(MapEvent::MoveStart);
                EventPropagation::Consume
            }
            UserEvent::Drag(MouseButton::Left, delta, e)
                if self.config.rotation && is_rotation_gesture(e) =>
            {
                let view = session.map().view();
                let rotated = view.with_rotation(view.rotation() + delta.x * ROTATION_PER_PIXEL);
                session.map_mut().set_view(rotated);
                EventPropagation::Stop
            }
            UserEvent::Drag(MouseButton::Left | MouseButton::Middle, delta, e) => {
                let to = e.screen_pointer_position;
                let from = to - *delta;
                let target = session.map().view().translate_by_pixels(from, to);
                let constrained = self.constrain(target);
                session.map_mut().set_view(constrained);
                EventPropagation::Stop
            }
            UserEvent::DragEnded(MouseButton::Left | MouseButton::Middle, _) => {
                session.request_permalink_update();
                EventPropagation::Stop
            }
            UserEvent::DoubleClick(MouseButton::Left, e) => {
                let step = if e.modifiers.shift { -1.0 } else { 1.0 };
                self.zoom_to_level(
                    session,
                    step,
                    e.screen_pointer_position,
                    DOUBLE_CLICK_ZOOM_DURATION,
                );
                EventPropagation::Stop
            }
            UserEvent::Scroll(delta, e) => {
                let factor = (self.config.zoom_speed + 1.0).powf(-delta);
                let target = session
                    .map()
                    .target_view()
                    .zoom_around(factor, e.screen_pointer_position);
                let constrained = self.constrain(target);
                session.animate_view(constrained, self.config.wheel_zoom_duration);
                session.request_permalink_update();
                EventPropagation::Stop
            }
            _ => EventPropagation::Propagate,
        }
    }
}

impl MapController {
    fn zoom_to_level(&self, session: &mut Session, step: f64, anchor: Point2d, duration: Duration) {
        let current = session.map().target_view().clone();
        let zoom = (current.zoom() + step).round();
        let factor = MapView::resolution_for_zoom(current.crs(), zoom) / current.resolution();
        let target = self.constrain(current.zoom_around(factor, anchor));
        session.animate_view(target, duration);
        session.request_permalink_update();
    }

    /// Keeps the view inside the allowed zoom levels and its center inside the bounds.
    fn constrain(&self, mut target: MapView) -> MapView {
        let zoom = target.zoom();
        if zoom < self.config.min_zoom {
            target = target.with_zoom(self.config.min_zoom);
        } else if zoom > self.config.max_zoom {
            target = target.with_zoom(self.config.max_zoom);
        }

        if let Some(bounds) = self.config.bounds {
            let center = target.center();
            let clamped = Point2d::new(
                center.x.clamp(bounds.x_min, bounds.x_max),
                center.y.clamp(bounds.y_min, bounds.y_max),
            );
            if clamped != center {
                target = target.with_center(clamped);
            }
        }

        if !self.config.rotation && target.rotation() != 0.0 {
            target = target.with_rotation(0.0);
        }

        target
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use gifw_types::cartesian::Size;

    use super::*;

    fn view_at_zoom(zoom: f64) -> MapView {
        MapView::new(
            Point2d::origin(),
            MapView::resolution_for_zoom(&Crs::EPSG3857, zoom),
            Crs::EPSG3857,
        )
        .with_size(Size::new(800.0, 600.0))
    }

    #[test]
    fn zoom_is_kept_in_range() {
        let controller =
            MapController::new(MapControllerConfiguration::default().with_zoom_range(5.0, 18.0));

        assert_relative_eq!(controller.constrain(view_at_zoom(2.0)).zoom(), 5.0, epsilon = 1e-9);
        assert_relative_eq!(controller.constrain(view_at_zoom(21.0)).zoom(), 18.0, epsilon = 1e-9);
        assert_relative_eq!(controller.constrain(view_at_zoom(12.5)).zoom(), 12.5, epsilon = 1e-9);
    }

    #[test]
    fn center_stays_inside_bounds() {
        let bound = BoundConfig {
            extent: [-6.5, 49.8, -4.0, 51.3],
            min_zoom: Some(7.0),
            max_zoom: None,
        };
        let config = MapControllerConfiguration::from_bound(&bound, &Crs::EPSG3857).unwrap();
        assert_eq!(config.zoom_range(), (7.0, 28.0));

        let controller = MapController::new(config);
        let bounds = config.bounds().unwrap();
        let outside = view_at_zoom(10.0).with_center(Point2d::new(0.0, 0.0));
        let center = controller.constrain(outside).center();
        assert_relative_eq!(center.x, bounds.x_max);
        assert_relative_eq!(center.y, bounds.y_min);
    }

    #[test]
    fn rotation_can_be_disabled() {
        let controller =
            MapController::new(MapControllerConfiguration::default().with_rotation(false));
        let rotated = view_at_zoom(10.0).with_rotation(0.3);
        assert_relative_eq!(controller.constrain(rotated).rotation(), 0.0);
    }
}
