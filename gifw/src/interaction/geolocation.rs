//! Following the device position.

use std::sync::Arc;
use std::time::Duration;

use futures::future::AbortHandle;
use gifw_types::cartesian::Point2d;
use gifw_types::geo::GeoPoint2d;
use gifw_types::geodesic::{geodesic_circle, CIRCLE_VERTICES};
use gifw_types::geometry::{Geom, Polygon};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::alert::{Alert, Severity};
use crate::color::Color;
use crate::control::{EventPropagation, UserEvent, UserEventHandler};
use crate::engine::{Cursor, Session};
use crate::error::GifwError;
use crate::event_bus::MapEvent;
use crate::interaction::{
    begin_activation, end_activation, InteractionMode, ModeController, ModeKind,
};
use crate::layer::{Feature, FeatureId, FeatureStyle, SystemLayer};
use crate::scheduler::TimerId;

/// Interval between "waiting for a more accurate position" notices.
pub const ACCURACY_NOTICE_INTERVAL: Duration = Duration::from_secs(10);
const FOLLOW_DURATION: Duration = Duration::from_millis(500);

/// Position reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Accuracy radius in metres.
    pub accuracy: f64,
}

impl PositionFix {
    /// Creates a new fix.
    pub fn new(lat: f64, lon: f64, accuracy: f64) -> Self {
        Self { lon, lat, accuracy }
    }

    fn geo_point(&self) -> GeoPoint2d {
        GeoPoint2d::latlon(self.lat, self.lon)
    }
}

/// Controller of the geolocation mode.
///
/// Fixes less accurate than the accuracy threshold setting are ignored. While only inaccurate
/// fixes arrive, a notice is shown every [`ACCURACY_NOTICE_INTERVAL`]. Accurate fixes move the
/// position marker and the accuracy circle, and the map follows them until the user pans.
#[derive(Debug, Default)]
pub struct GeolocationController {
    active: bool,
    keyboard: Option<AbortHandle>,
    notice_timer: Option<TimerId>,
    center_lock: bool,
    has_accurate_fix: bool,
    last_fix: Option<PositionFix>,
    marker: Option<FeatureId>,
    accuracy_circle: Option<FeatureId>,
    track_enabled: bool,
    track: Vec<Point2d>,
    track_feature: Option<FeatureId>,
}

impl GeolocationController {
    /// Returns true while the map follows the position.
    pub fn is_center_locked(&self) -> bool {
        self.center_lock
    }

    /// Locks the map to the position again after the user panned away.
    pub fn lock_center(&mut self, session: &mut Session) {
        self.center_lock = true;
        if let Some(fix) = self.last_fix {
            self.follow(&fix, session);
        }
    }

    /// The timer of the accuracy notice, if one is scheduled.
    pub fn notice_timer(&self) -> Option<TimerId> {
        self.notice_timer
    }

    /// Last accepted fix.
    pub fn last_fix(&self) -> Option<PositionFix> {
        self.last_fix
    }

    /// Id of the position marker feature.
    pub fn marker(&self) -> Option<FeatureId> {
        self.marker
    }

    /// Enables or disables recording of the track.
    pub fn set_track_enabled(&mut self, enabled: bool) {
        self.track_enabled = enabled;
    }

    /// Returns true if accepted positions are recorded into the track.
    pub fn is_track_enabled(&self) -> bool {
        self.track_enabled
    }

    /// Recorded track in map coordinates.
    pub fn track(&self) -> &[Point2d] {
        &self.track
    }

    /// Drops the recorded track.
    pub fn clear_track(&mut self, session: &mut Session) {
        self.track.clear();
        if let Some(id) = self.track_feature.take() {
            if let Some(store) = session.system_features_mut(SystemLayer::Geolocation) {
                store.remove(id);
            }
        }
    }

    /// Returns true if the screen should be kept on.
    pub fn wants_wake_lock(&self, session: &Session) -> bool {
        self.active && session.settings().wake_lock()
    }

    /// Handles a position reported by the device.
    pub fn handle_position(&mut self, fix: PositionFix, session: &mut Session) {
        if !self.active {
            debug!("Ignoring position fix while geolocation is inactive");
            return;
        }

        let threshold = session.settings().accuracy_threshold();
        if fix.accuracy > threshold {
            debug!(
                "Ignoring position with accuracy {} m, threshold is {threshold} m",
                fix.accuracy
            );
            if self.notice_timer.is_none() {
                let now = session.now();
                self.notice_timer = Some(session.scheduler_mut().schedule_recurring(
                    ModeKind::Geolocation,
                    now,
                    ACCURACY_NOTICE_INTERVAL,
                ));
            }
            return;
        }

        if let Some(timer) = self.notice_timer.take() {
            session.scheduler_mut().cancel(timer);
        }

        let crs = session.map().view().crs().clone();
        let position = match crs.project(&fix.geo_point()) {
            Ok(position) => position,
            Err(err) => {
                warn!("Position cannot be shown on the map: {err}");
                return;
            }
        };
        let circle = geodesic_circle(&fix.geo_point(), fix.accuracy, CIRCLE_VERTICES)
            .iter()
            .map(|p| crs.project(p))
            .collect::<Result<Vec<_>, _>>();

        if !self.has_accurate_fix {
            self.has_accurate_fix = true;
            self.center_lock = true;
            info!("First accurate position received");
        }
        self.last_fix = Some(fix);
        if self.track_enabled {
            self.track.push(position);
        }

        let Some(store) = session.system_features_mut(SystemLayer::Geolocation) else {
            return;
        };
        upsert(
            store,
            &mut self.marker,
            Geom::Point(position),
            marker_style,
        );
        match circle {
            Ok(ring) => upsert(
                store,
                &mut self.accuracy_circle,
                Geom::Polygon(Polygon::new(ring, vec![])),
                circle_style,
            ),
            Err(err) => warn!("Failed to build the accuracy circle: {err}"),
        }
        if self.track.len() >= 2 {
            upsert(
                store,
                &mut self.track_feature,
                Geom::LineString(self.track.clone()),
                track_style,
            );
        }

        if self.center_lock {
            self.follow(&fix, session);
        }
    }

    fn follow(&self, fix: &PositionFix, session: &mut Session) {
        let view = session.map().target_view().clone();
        match view.crs().project(&fix.geo_point()) {
            Ok(center) => session.animate_view(view.with_center(center), FOLLOW_DURATION),
            Err(err) => warn!("Cannot center the map on the position: {err}"),
        }
    }
}

fn upsert(
    store: &mut crate::layer::FeatureStore,
    slot: &mut Option<FeatureId>,
    geometry: Geom,
    style: fn() -> FeatureStyle,
) {
    if let Some(feature) = slot.and_then(|id| store.get_mut(id)) {
        feature.set_geometry(geometry);
        return;
    }

    *slot = Some(store.add(Feature::new(geometry).with_style(Arc::new(style()))));
}

fn marker_style() -> FeatureStyle {
    FeatureStyle {
        fill: Color::ACCENT,
        stroke: Color::WHITE,
        stroke_width: 2.0,
        point_radius: 8.0,
        ..Default::default()
    }
}

fn circle_style() -> FeatureStyle {
    FeatureStyle {
        fill: Color::ACCENT.with_opacity(15),
        stroke: Color::ACCENT.with_opacity(50),
        stroke_width: 1.0,
        ..Default::default()
    }
}

fn track_style() -> FeatureStyle {
    FeatureStyle {
        fill: Color::TRANSPARENT,
        stroke: Color::RED,
        stroke_width: 3.0,
        ..Default::default()
    }
}

impl UserEventHandler for GeolocationController {
    fn handle(&mut self, _event: &UserEvent, _session: &mut Session) -> EventPropagation {
        EventPropagation::Propagate
    }
}

impl ModeController for GeolocationController {
    fn kind(&self) -> ModeKind {
        ModeKind::Geolocation
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn activate(&mut self, mode: &InteractionMode, session: &mut Session) -> Result<(), GifwError> {
        if *mode != InteractionMode::Geolocating {
            return Err(GifwError::Generic(format!(
                "geolocation controller cannot run {mode:?}"
            )));
        }
        if self.active {
            return Ok(());
        }

        self.keyboard = Some(begin_activation(
            session,
            ModeKind::Geolocation,
            Some(SystemLayer::Geolocation),
            Cursor::Default,
        ));
        session.ui_mut().context_menu_enabled = true;
        session.ui_mut().active_button = Some("geolocation".to_string());
        self.active = true;
        self.has_accurate_fix = false;
        self.center_lock = false;

        if session.settings().wake_lock() {
            debug!("Keeping the screen on while geolocating");
        }
        Ok(())
    }

    fn deactivate(&mut self, session: &mut Session) {
        if let Some(timer) = self.notice_timer.take() {
            session.scheduler_mut().cancel(timer);
        }
        session.scheduler_mut().cancel_owned_by(ModeKind::Geolocation);

        if let Some(store) = session.system_features_mut(SystemLayer::Geolocation) {
            for id in [self.marker.take(), self.accuracy_circle.take()]
                .into_iter()
                .flatten()
            {
                store.remove(id);
            }
        }

        self.active = false;
        self.center_lock = false;
        self.has_accurate_fix = false;
        self.last_fix = None;
        end_activation(session, self.keyboard.take());
    }

    fn on_map_event(&mut self, event: &MapEvent, session: &mut Session) {
        if *event == MapEvent::MoveStart && self.center_lock && !session.map().is_animating() {
            debug!("Map moved by the user, releasing the center lock");
            self.center_lock = false;
        }
    }

    fn on_timer(&mut self, timer: TimerId, session: &mut Session) {
        if Some(timer) == self.notice_timer {
            session.push_alert(Alert::toast(
                Severity::Warning,
                "Waiting for a more accurate position",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixes_below_threshold_are_ignored() {
        let mut session = Session::default();
        let mut controller = GeolocationController::default();
        controller
            .activate(&InteractionMode::Geolocating, &mut session)
            .unwrap();

        controller.handle_position(PositionFix::new(51.5, -0.1, 25.0), &mut session);
        assert!(controller.marker().is_none());
        assert!(controller.notice_timer().is_some());
        assert_eq!(session.alerts().count(), 0);

        controller.handle_position(PositionFix::new(51.5, -0.1, 15.0), &mut session);
        assert!(controller.marker().is_some());
        assert!(controller.notice_timer().is_none());
        assert!(session.scheduler().is_empty());
        assert!(controller.is_center_locked());
    }

    #[test]
    fn track_is_recorded() {
        let mut session = Session::default();
        let mut controller = GeolocationController::default();
        controller
            .activate(&InteractionMode::Geolocating, &mut session)
            .unwrap();
        controller.set_track_enabled(true);

        controller.handle_position(PositionFix::new(51.5, -0.1, 5.0), &mut session);
        controller.handle_position(PositionFix::new(51.501, -0.1, 5.0), &mut session);
        assert_eq!(controller.track().len(), 2);

        let store = session.system_features(SystemLayer::Geolocation).unwrap();
        assert_eq!(store.len(), 3);

        controller.deactivate(&mut session);
        let store = session.system_features(SystemLayer::Geolocation).unwrap();
        assert_eq!(store.len(), 1);
    }
}
