//! The map engine owning the map, the interaction controllers and the shared session.
//!
//! [`MapEngine`] is the mediator of the client: the UI calls its methods, controllers only see
//! the [`Session`] and publish [`MapEvent`]s, which the engine dispatches in
//! [`MapEngine::process_events`].

use std::sync::Arc;

use futures::future::AbortHandle;
use gifw_types::cartesian::{Point2d, Size};
use gifw_types::geo::GeoPoint2d;
use log::{debug, warn};

use crate::clock::Clock;
use crate::config::VersionConfig;
use crate::control::{
    EventProcessor, MapController, MapControllerConfiguration, RawUserEvent, UserEventHandler,
};
use crate::error::GifwError;
use crate::event_bus::{DeferredTask, MapEvent};
use crate::filter::LayerFilterController;
use crate::interaction::{
    AnnotateController, FeatureQueryController, GeolocationController, InteractionMode,
    MeasureController, ModeController, ModeKind, PositionFix,
};
use crate::layer::SystemLayer;
use crate::map::{GroupType, Map};
use crate::settings::Settings;
use crate::view::MapView;

mod features;
mod layers;
mod legend;
mod session;

pub use layers::LayerOptions;
pub use legend::{LegendUrl, LegendUrls};
pub use session::{
    Cursor, LayerCategory, Session, UiState, SYSTEM_GROUP_NAME, USER_CATEGORY_NAME,
};

/// Name of the group holding the background maps.
pub const BASEMAP_GROUP_NAME: &str = "Basemaps";
/// Name of the group holding the configured overlays.
pub const OVERLAY_GROUP_NAME: &str = "Overlays";

/// Zoom level of the map when the configuration has no start view.
const DEFAULT_ZOOM: f64 = 2.0;

/// Controllers of the interaction modes.
#[derive(Debug, Default)]
struct Controllers {
    annotate: AnnotateController,
    measure: MeasureController,
    geolocation: GeolocationController,
    query: FeatureQueryController,
    filter: LayerFilterController,
}

impl Controllers {
    fn get_mut(&mut self, kind: ModeKind) -> &mut dyn ModeController {
        match kind {
            ModeKind::Annotate => &mut self.annotate,
            ModeKind::Measure => &mut self.measure,
            ModeKind::Geolocation => &mut self.geolocation,
            ModeKind::FeatureQuery => &mut self.query,
            ModeKind::LayerFilter => &mut self.filter,
        }
    }

    fn handler_mut(&mut self, kind: ModeKind) -> &mut dyn UserEventHandler {
        match kind {
            ModeKind::Annotate => &mut self.annotate,
            ModeKind::Measure => &mut self.measure,
            ModeKind::Geolocation => &mut self.geolocation,
            ModeKind::FeatureQuery => &mut self.query,
            ModeKind::LayerFilter => &mut self.filter,
        }
    }

    fn iter_mut(&mut self) -> [&mut dyn ModeController; 5] {
        [
            &mut self.annotate,
            &mut self.measure,
            &mut self.geolocation,
            &mut self.query,
            &mut self.filter,
        ]
    }
}

/// Live map of a client version with its interaction modes.
///
/// The engine is single threaded: every call runs to completion, and the events it publishes are
/// dispatched before it returns. Time based work (animations, timers and the debounced permalink)
/// is carried out in [`MapEngine::tick`], which the host calls every frame.
pub struct MapEngine {
    config: VersionConfig,
    session: Session,
    controllers: Controllers,
    map_controller: MapController,
    event_processor: EventProcessor,
    running_search: Option<(u64, AbortHandle)>,
    search_generation: u64,
}

impl std::fmt::Debug for MapEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapEngine")
            .field("version", &self.config.slug)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl MapEngine {
    /// Creates the map of the version: basemaps, configured overlays and the start view.
    pub fn new(config: VersionConfig, clock: Arc<dyn Clock>) -> Result<Self, GifwError> {
        config.validate()?;
        let crs = config.map_crs();

        let view = match &config.start_view {
            Some(start) => MapView::new_geo(
                &GeoPoint2d::latlon(start.lat, start.lon),
                MapView::resolution_for_zoom(&crs, start.zoom),
                crs.clone(),
            )?,
            None => MapView::new(
                Point2d::origin(),
                MapView::resolution_for_zoom(&crs, DEFAULT_ZOOM),
                crs.clone(),
            ),
        };
        let mut map = Map::new(view);

        let basemaps = map.ensure_group(GroupType::Basemap, BASEMAP_GROUP_NAME);
        for basemap in &config.basemaps {
            basemaps.add_layer(basemap.to_layer(&crs)?, basemap.is_default);
        }

        let overlays = map.ensure_group(GroupType::Overlay, OVERLAY_GROUP_NAME);
        for layer in config.overlays() {
            overlays.add_layer(layer.to_layer(&crs), layer.visible);
        }

        let mut session = Session::new(map, clock);
        session.auth = crate::auth::AuthManager::new(&config.auth_rules)?;
        session.proxy_url = config.endpoints.proxy.clone();
        session.categories.extend(config.categories.iter().map(|c| LayerCategory {
            name: c.name.clone(),
            layer_ids: c.layers.iter().map(|l| l.id.clone()).collect(),
        }));

        debug!(
            "Created map of version {} with {} basemaps and {} overlays",
            config.slug,
            config.basemaps.len(),
            config.overlays().count()
        );

        let map_controller = match &config.bound {
            Some(bound) => MapControllerConfiguration::from_bound(bound, &crs)?,
            None => MapControllerConfiguration::default(),
        };

        Ok(Self {
            config,
            session,
            controllers: Controllers::default(),
            map_controller: MapController::new(map_controller),
            event_processor: EventProcessor::default(),
            running_search: None,
            search_generation: 0,
        })
    }

    /// Sets the settings store of the user.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.session.settings = settings;
        self
    }

    /// Sets the pan and zoom configuration.
    pub fn with_map_controller(mut self, config: MapControllerConfiguration) -> Self {
        self.map_controller.set_config(config);
        self
    }

    /// Configuration of the version.
    pub fn config(&self) -> &VersionConfig {
        &self.config
    }

    /// Shared state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable shared state.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// The map.
    pub fn map(&self) -> &Map {
        &self.session.map
    }

    /// Annotation controller.
    pub fn annotate(&self) -> &AnnotateController {
        &self.controllers.annotate
    }

    /// Mutable annotation controller.
    pub fn annotate_mut(&mut self) -> (&mut AnnotateController, &mut Session) {
        (&mut self.controllers.annotate, &mut self.session)
    }

    /// Measure controller.
    pub fn measure(&self) -> &MeasureController {
        &self.controllers.measure
    }

    /// Geolocation controller.
    pub fn geolocation(&self) -> &GeolocationController {
        &self.controllers.geolocation
    }

    /// Mutable geolocation controller.
    pub fn geolocation_mut(&mut self) -> (&mut GeolocationController, &mut Session) {
        (&mut self.controllers.geolocation, &mut self.session)
    }

    /// Feature query controller.
    pub fn query(&self) -> &FeatureQueryController {
        &self.controllers.query
    }

    /// Layer filter controller.
    pub fn filter(&self) -> &LayerFilterController {
        &self.controllers.filter
    }

    /// Mutable layer filter controller.
    pub fn filter_mut(&mut self) -> &mut LayerFilterController {
        &mut self.controllers.filter
    }

    /// Applies the filter being edited to its layer.
    pub fn apply_filter(&mut self) -> Result<(), GifwError> {
        let result = self.controllers.filter.apply(&mut self.session);
        self.process_events();
        result
    }

    /// Removes the user filter of the layer being edited.
    pub fn clear_filter(&mut self) -> Result<(), GifwError> {
        let result = self.controllers.filter.clear(&mut self.session);
        self.process_events();
        result
    }

    /// Changes the size of the map in pixels.
    pub fn resize(&mut self, size: Size) {
        self.session.map.set_size(size);
    }

    /// Turns view animations off or on.
    pub fn set_reduced_motion(&mut self, reduced: bool) {
        self.session.reduced_motion = reduced;
    }

    /// Switches to the mode. The current mode is fully deactivated first unless the same
    /// controller owns both modes, in which case the controller switches its tool.
    ///
    /// Activating [`InteractionMode::None`] is the same as [`MapEngine::deactivate_interactions`].
    pub fn activate_mode(&mut self, mode: InteractionMode) -> Result<(), GifwError> {
        let Some(kind) = mode.owner() else {
            self.deactivate_interactions();
            return Ok(());
        };

        let current = self.session.mode.owner();
        if current != Some(kind) {
            self.deactivate_current();
        }

        let controller = self.controllers.get_mut(kind);
        if let Err(err) = controller.activate(&mode, &mut self.session) {
            warn!("Failed to activate {mode:?}: {err}");
            if controller.is_active() {
                controller.deactivate(&mut self.session);
                self.record_deactivation(kind);
            }
            self.session.mode = InteractionMode::None;
            self.process_events();
            return Err(err);
        }

        if current != Some(kind) {
            self.session.mode_stats.activations += 1;
            self.session.bus.publish(MapEvent::ModeActivated(kind));
        }
        debug!("Interaction mode is now {mode:?}");
        self.session.mode = mode;
        self.process_events();
        Ok(())
    }

    fn deactivate_current(&mut self) {
        let Some(kind) = self.session.mode.owner() else {
            return;
        };

        let controller = self.controllers.get_mut(kind);
        if controller.is_active() {
            controller.deactivate(&mut self.session);
            self.record_deactivation(kind);
        }
        self.session.scheduler.cancel_owned_by(kind);
        self.session.mode = InteractionMode::None;
        debug!("Deactivated {kind:?}");
    }

    fn record_deactivation(&mut self, kind: ModeKind) {
        self.session.mode_stats.deactivations += 1;
        self.session.bus.publish(MapEvent::ModeDeactivated(kind));
    }

    /// Deactivates the current interaction mode.
    pub fn deactivate_interactions(&mut self) {
        self.session.bus.publish(MapEvent::DeactivateInteractions);
        self.deactivate_current();
        self.process_events();
    }

    /// Deactivates the current mode and returns the UI to its default state, where clicks query
    /// features.
    pub fn reset_interactions_to_default(&mut self) {
        self.deactivate_current();
        self.session.ui = UiState::default();
        self.session.popup.close();
        self.session.bus.publish(MapEvent::ResetInteractions);
        self.process_events();
    }

    /// Dispatches the queued events to the controllers and the subscribers, then runs the
    /// deferred tasks. Repeats until nothing is left.
    pub fn process_events(&mut self) {
        loop {
            while let Some(event) = self.session.bus.next_event() {
                if event == MapEvent::PermalinkRequested {
                    let now = self.session.now();
                    self.session.permalink_debounce.request(now);
                }

                for controller in self.controllers.iter_mut() {
                    controller.on_map_event(&event, &mut self.session);
                }
                self.session.bus.notify(&event);
            }

            let Some(task) = self.session.bus.next_deferred() else {
                break;
            };
            self.run_deferred(task);
        }
    }

    fn run_deferred(&mut self, task: DeferredTask) {
        let (layer_id, feature_id, only_empty_text) = match task {
            DeferredTask::RemoveFeature {
                layer_id,
                feature_id,
            } => (layer_id, feature_id, false),
            DeferredTask::RemoveEmptyText {
                layer_id,
                feature_id,
            } => (layer_id, feature_id, true),
        };

        let Some(store) = self
            .session
            .map
            .layer_mut(&layer_id)
            .and_then(|layer| layer.features_mut())
        else {
            warn!("Layer {layer_id} of a deferred removal does not exist");
            return;
        };

        if only_empty_text {
            let has_text = store
                .get(feature_id)
                .and_then(|f| f.style())
                .and_then(|s| s.label.as_deref())
                .is_some_and(|label| !label.trim().is_empty());
            if has_text {
                return;
            }
        }

        if store.remove(feature_id).is_some() {
            debug!("Removed feature {feature_id} from {layer_id}");
        }
    }

    /// Advances animations and timers to the clock time and regenerates the permalink when its
    /// quiet period has passed. Returns true while the view is animating.
    pub fn tick(&mut self) -> bool {
        let now = self.session.now();
        let animating = self.session.map.animate(now);

        for timer in self.session.scheduler.take_due(now) {
            self.controllers
                .get_mut(timer.owner)
                .on_timer(timer.id, &mut self.session);
        }
        self.process_events();

        if self.session.permalink_debounce.poll(now) {
            let permalink = self.permalink();
            debug!("Permalink updated to {permalink}");
            self.session.permalink = Some(permalink.clone());
            self.session
                .bus
                .publish(MapEvent::PermalinkUpdated(permalink));
            self.process_events();
        }

        animating
    }

    /// Last generated permalink.
    pub fn current_permalink(&self) -> Option<&str> {
        self.session.permalink.as_deref()
    }

    /// Handles user input.
    ///
    /// Keys go to the controllers with a live keyboard listener. Pointer events go to the active
    /// controller, or the passive feature query if no mode is active, and then to the pan and
    /// zoom controller. Input is ignored while a search holds the map.
    pub fn handle_input(&mut self, event: RawUserEvent) {
        if self.session.map_locked_by_search {
            debug!("Ignoring input while the map is locked by a search");
            return;
        }

        let Self {
            session,
            controllers,
            map_controller,
            event_processor,
            ..
        } = self;

        if let RawUserEvent::KeyPressed(key) = event {
            let modifiers = event_processor.modifiers();
            for owner in session.keyboard.live_owners() {
                if controllers.get_mut(owner).on_key(key, modifiers, session) {
                    break;
                }
            }
        } else {
            let active = session.mode.owner();
            let mode_handler: &mut dyn UserEventHandler = match active {
                Some(kind) => controllers.handler_mut(kind),
                None => &mut controllers.query,
            };
            let mut handlers: [&mut dyn UserEventHandler; 2] = [mode_handler, map_controller];
            event_processor.handle(event, session, &mut handlers);
        }

        self.process_events();
    }

    /// Handles a position reported by the device.
    pub fn handle_position(&mut self, fix: PositionFix) {
        self.controllers
            .geolocation
            .handle_position(fix, &mut self.session);
        self.process_events();
    }

    /// Returns the system layer, creating it on first use.
    pub fn ensure_system_layer(&mut self, layer: SystemLayer) -> &mut crate::layer::Layer {
        self.session.ensure_system_layer(layer)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use gifw_types::geometry::GeometryType;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::tests::SAMPLE;
    use crate::control::{Key, MouseButton};
    use crate::interaction::AnnotationTool;

    pub(crate) fn engine() -> (MapEngine, ManualClock) {
        let clock = ManualClock::new();
        let config = VersionConfig::from_json(SAMPLE).unwrap();
        let mut engine = MapEngine::new(config, Arc::new(clock.clone())).unwrap();
        engine.resize(Size::new(800.0, 600.0));
        (engine, clock)
    }

    #[test]
    fn builds_map_from_configuration() {
        let (engine, _) = engine();
        assert_eq!(engine.map().active_basemap().map(|l| l.id()), Some("streets"));
        assert!(engine.map().is_layer_visible("roads"));
        assert!(!engine.map().is_layer_visible("stops"));
        assert_eq!(
            engine
                .session()
                .categories()
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>(),
            vec![USER_CATEGORY_NAME, "Transport"]
        );
        assert!((engine.map().view().zoom() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn switching_modes_deactivates_the_previous_one() {
        let (mut engine, _) = engine();
        engine
            .activate_mode(InteractionMode::Annotating(AnnotationTool::Line))
            .unwrap();
        engine
            .activate_mode(InteractionMode::Annotating(AnnotationTool::Polygon))
            .unwrap();
        engine
            .activate_mode(InteractionMode::Measuring(GeometryType::LineString))
            .unwrap();

        assert!(!engine.annotate().is_active());
        assert!(engine.measure().is_active());
        assert_eq!(engine.session().mode_stats().activations, 2);
        assert_eq!(engine.session().mode_stats().deactivations, 1);
        assert_eq!(engine.session().keyboard().live_owners(), vec![ModeKind::Measure]);

        engine.deactivate_interactions();
        assert_eq!(engine.session().mode(), &InteractionMode::None);
        assert_eq!(engine.session().keyboard().live_count(), 0);
        assert!(engine.session().ui().context_menu_enabled);
    }

    #[test]
    fn failed_activation_leaves_no_mode() {
        let (mut engine, _) = engine();
        assert_matches!(
            engine.activate_mode(InteractionMode::Measuring(GeometryType::Point)),
            Err(GifwError::Validation(_))
        );
        assert_eq!(engine.session().mode(), &InteractionMode::None);
        assert_eq!(engine.session().keyboard().live_count(), 0);
    }

    #[test]
    fn input_is_ignored_while_search_holds_the_map() {
        let (mut engine, _) = engine();
        let center = engine.map().view().center();
        engine.session_mut().map_locked_by_search = true;

        engine.handle_input(RawUserEvent::PointerMoved(Point2d::new(100.0, 100.0)));
        engine.handle_input(RawUserEvent::ButtonPressed(MouseButton::Left));
        engine.handle_input(RawUserEvent::PointerMoved(Point2d::new(300.0, 300.0)));
        engine.handle_input(RawUserEvent::ButtonReleased(MouseButton::Left));
        assert_eq!(engine.map().view().center(), center);

        engine.session_mut().map_locked_by_search = false;
        engine.handle_input(RawUserEvent::KeyPressed(Key::Escape));
        assert_eq!(engine.session().mode(), &InteractionMode::None);
    }

    #[test]
    fn permalink_follows_the_quiet_period() {
        let (mut engine, clock) = engine();
        for opacity in (10..=100).step_by(10) {
            engine.set_layer_opacity("roads", opacity).unwrap();
            clock.advance(Duration::from_millis(100));
            engine.tick();
        }
        assert_eq!(engine.current_permalink(), None);

        clock.advance(Duration::from_millis(500));
        engine.tick();
        let permalink = engine.current_permalink().unwrap();
        assert!(permalink.contains("roads/100/100"));
    }
}
