use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use web_time::Instant;

use crate::alert::Alert;
use crate::auth::AuthManager;
use crate::clock::{Clock, SystemClock};
use crate::debounce::{Debouncer, PERMALINK_DEBOUNCE};
use crate::event_bus::{EventBus, MapEvent};
use crate::interaction::query::QueryBatch;
use crate::interaction::{InteractionMode, KeyboardListeners, ModeStats};
use crate::layer::{layer_class_name, FeatureStore, Layer, LayerSource, SystemLayer};
use crate::map::{GroupType, Map};
use crate::permalink::SearchPin;
use crate::popup::Popup;
use crate::scheduler::Scheduler;
use crate::settings::Settings;
use crate::view::MapView;

/// Name of the group holding the system layers.
pub const SYSTEM_GROUP_NAME: &str = "System layers";
/// Category listing the layers added by the user.
pub const USER_CATEGORY_NAME: &str = "My Layers";

/// Mouse cursor shown over the map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cursor {
    /// Arrow.
    #[default]
    Default,
    /// Crosshair used while drawing.
    Crosshair,
    /// Hand shown over a selectable feature.
    Pointer,
    /// Shown while dragging a vertex.
    Move,
}

/// Parts of the UI controlled by the interaction modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    /// Cursor over the map.
    pub cursor: Cursor,
    /// Whether the browser context menu opens on right click.
    pub context_menu_enabled: bool,
    /// Id of the highlighted toolbar button.
    pub active_button: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            cursor: Cursor::Default,
            context_menu_enabled: true,
            active_button: None,
        }
    }
}

/// Layer category shown in the layer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerCategory {
    /// Category name.
    pub name: String,
    /// Ids of the layers in the category.
    pub layer_ids: Vec<String>,
}

/// State shared by the map engine and the controllers.
///
/// The session is handed to every [`UserEventHandler`](crate::control::UserEventHandler) and
/// [`ModeController`](crate::interaction::ModeController) call. Controllers change the map and
/// publish events through it, they never call each other.
pub struct Session {
    pub(crate) map: Map,
    pub(crate) bus: EventBus,
    pub(crate) scheduler: Scheduler,
    pub(crate) popup: Popup,
    pub(crate) alerts: VecDeque<Alert>,
    pub(crate) keyboard: KeyboardListeners,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: Settings,
    pub(crate) ui: UiState,
    pub(crate) auth: AuthManager,
    pub(crate) mode: InteractionMode,
    pub(crate) mode_stats: ModeStats,
    pub(crate) permalink_debounce: Debouncer,
    pub(crate) permalink: Option<String>,
    pub(crate) reduced_motion: bool,
    pub(crate) map_locked_by_search: bool,
    pub(crate) categories: Vec<LayerCategory>,
    pub(crate) search_pin: Option<SearchPin>,
    pub(crate) pending_query: Option<QueryBatch>,
    pub(crate) proxy_url: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("map", &self.map)
            .field("mode", &self.mode)
            .field("ui", &self.ui)
            .field("permalink", &self.permalink)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Map::default(), Arc::new(SystemClock))
    }
}

impl Session {
    /// Creates a session for the map.
    pub fn new(map: Map, clock: Arc<dyn Clock>) -> Self {
        Self {
            map,
            bus: EventBus::default(),
            scheduler: Scheduler::default(),
            popup: Popup::default(),
            alerts: VecDeque::new(),
            keyboard: KeyboardListeners::default(),
            clock,
            settings: Settings::default(),
            ui: UiState::default(),
            auth: AuthManager::default(),
            mode: InteractionMode::None,
            mode_stats: ModeStats::default(),
            permalink_debounce: Debouncer::new(PERMALINK_DEBOUNCE),
            permalink: None,
            reduced_motion: false,
            map_locked_by_search: false,
            categories: vec![LayerCategory {
                name: USER_CATEGORY_NAME.into(),
                layer_ids: vec![],
            }],
            search_pin: None,
            pending_query: None,
            proxy_url: None,
        }
    }

    /// Current time of the session clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// The map.
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Mutable map.
    pub fn map_mut(&mut self) -> &mut Map {
        &mut self.map
    }

    /// Event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Mutable event bus.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Timers.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Mutable timers.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Popup.
    pub fn popup(&self) -> &Popup {
        &self.popup
    }

    /// Mutable popup.
    pub fn popup_mut(&mut self) -> &mut Popup {
        &mut self.popup
    }

    /// UI state.
    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    /// Mutable UI state.
    pub fn ui_mut(&mut self) -> &mut UiState {
        &mut self.ui
    }

    /// Keyboard listeners.
    pub fn keyboard(&self) -> &KeyboardListeners {
        &self.keyboard
    }

    /// Mutable keyboard listeners.
    pub fn keyboard_mut(&mut self) -> &mut KeyboardListeners {
        &mut self.keyboard
    }

    /// User settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutable user settings.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Auth header rules and token.
    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    /// Current interaction mode.
    pub fn mode(&self) -> &InteractionMode {
        &self.mode
    }

    /// Activation counters of the interaction modes.
    pub fn mode_stats(&self) -> ModeStats {
        self.mode_stats
    }

    /// Proxy endpoint for services that need it.
    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy_url.as_deref()
    }

    /// Returns true while a search holds the map.
    pub fn is_map_locked_by_search(&self) -> bool {
        self.map_locked_by_search
    }

    /// Returns true if view changes are applied without animation.
    pub fn reduced_motion(&self) -> bool {
        self.reduced_motion
    }

    /// Queues an alert for the UI.
    pub fn push_alert(&mut self, alert: Alert) {
        debug!("Alert: {} {}", alert.title, alert.message);
        self.alerts.push_back(alert);
    }

    /// Alerts waiting to be shown.
    pub fn alerts(&self) -> impl Iterator<Item = &Alert> + '_ {
        self.alerts.iter()
    }

    /// Takes all alerts waiting to be shown.
    pub fn take_alerts(&mut self) -> Vec<Alert> {
        self.alerts.drain(..).collect()
    }

    /// Requests a debounced permalink update.
    pub fn request_permalink_update(&mut self) {
        self.bus.publish(MapEvent::PermalinkRequested);
    }

    /// Moves the map to the view, animated unless reduced motion is on or `duration` is zero.
    pub fn animate_view(&mut self, target: MapView, duration: Duration) {
        if self.reduced_motion || duration.is_zero() {
            self.map.set_view(target);
        } else {
            let now = self.now();
            self.map.animate_to(target, duration, now);
            self.bus.publish(MapEvent::MoveStart);
        }
    }

    /// Returns the system layer, creating it in the system group on first use.
    pub fn ensure_system_layer(&mut self, layer: SystemLayer) -> &mut Layer {
        let id = layer.id();
        let (system_layer, added) = self
            .map
            .ensure_group(GroupType::SystemNative, SYSTEM_GROUP_NAME)
            .get_or_add_layer(id, true, || {
                Layer::new(
                    id,
                    layer.name(),
                    LayerSource::Vector(FeatureStore::default()),
                )
                .with_z_index(layer.z_index())
                .with_class_name(Some(layer_class_name(id)))
                .with_queryable(matches!(
                    layer,
                    SystemLayer::Annotations | SystemLayer::Measurements
                ))
            });

        if added {
            debug!("Created system layer {id}");
            self.bus.publish(MapEvent::LayerAdded {
                layer_id: id.to_string(),
            });
        }

        system_layer
    }

    /// Feature store of the system layer, creating the layer on first use. Returns `None` if a
    /// layer without features took the reserved id.
    pub fn system_features_mut(&mut self, layer: SystemLayer) -> Option<&mut FeatureStore> {
        let features = self.ensure_system_layer(layer).features_mut();
        if features.is_none() {
            warn!("Layer {} is not a vector layer", layer.id());
        }
        features
    }

    /// Features of the system layer if it exists.
    pub fn system_features(&self, layer: SystemLayer) -> Option<&FeatureStore> {
        self.map.layer(layer.id())?.features()
    }

    /// Layer categories.
    pub fn categories(&self) -> &[LayerCategory] {
        &self.categories
    }

    /// Point query waiting for its GetFeatureInfo requests.
    pub fn pending_query(&self) -> Option<&QueryBatch> {
        self.pending_query.as_ref()
    }

    /// Current search pin.
    pub fn search_pin(&self) -> Option<&SearchPin> {
        self.search_pin.as_ref()
    }
}
