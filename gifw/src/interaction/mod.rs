//! Interaction modes competing for pointer input.
//!
//! Every mode is driven by a [`ModeController`]. At most one controller is active at a time: the
//! engine deactivates the current controller before activating another one. While no mode is
//! active, clicks go to a passive feature query.

use futures::future::AbortHandle;
use gifw_types::geometry::GeometryType;
use serde::{Deserialize, Serialize};

use crate::control::{Key, Modifiers, UserEventHandler};
use crate::engine::{Cursor, Session};
use crate::error::GifwError;
use crate::event_bus::MapEvent;
use crate::layer::SystemLayer;
use crate::scheduler::TimerId;

pub mod annotate;
mod draw;
pub mod geolocation;
mod keyboard;
pub mod measure;
mod modify;
pub mod query;

pub use annotate::{AnnotateController, AnnotationStyle, AnnotationTool, LineDash};
pub use draw::{Draw, DrawOutcome};
pub use geolocation::{GeolocationController, PositionFix};
pub use keyboard::KeyboardListeners;
pub use measure::MeasureController;
pub use modify::{snap_to_vertex, Modify, ModifyOutcome};
pub use query::{FeatureQueryController, QueryShape};

/// Controller owning an interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModeKind {
    /// Drawing and editing annotations.
    Annotate,
    /// Measuring lengths and areas.
    Measure,
    /// Following the device position.
    Geolocation,
    /// Querying features of the layers.
    FeatureQuery,
    /// Editing the filter of a layer.
    LayerFilter,
}

/// Current interaction of the map.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InteractionMode {
    /// Clicks query features, drags pan the map.
    #[default]
    None,
    /// Measuring a line or an area.
    Measuring(GeometryType),
    /// Drawing an annotation with the tool.
    Annotating(AnnotationTool),
    /// Selecting and modifying annotations.
    Modifying,
    /// Querying the features in a drawn shape.
    QueryingFeatures(QueryShape),
    /// Following the device position.
    Geolocating,
    /// Editing the filter of the layer with the id.
    FilteringLayer(String),
}

impl InteractionMode {
    /// Controller running the mode. `None` for the default mode.
    pub fn owner(&self) -> Option<ModeKind> {
        Some(match self {
            InteractionMode::None => return None,
            InteractionMode::Measuring(_) => ModeKind::Measure,
            InteractionMode::Annotating(_) | InteractionMode::Modifying => ModeKind::Annotate,
            InteractionMode::QueryingFeatures(_) => ModeKind::FeatureQuery,
            InteractionMode::Geolocating => ModeKind::Geolocation,
            InteractionMode::FilteringLayer(_) => ModeKind::LayerFilter,
        })
    }
}

/// Controller of an interaction mode.
///
/// Controllers are `Idle` until [`ModeController::activate`] is called, and return to `Idle` in
/// [`ModeController::deactivate`]. Calling `activate` on an active controller switches its tool.
pub trait ModeController: UserEventHandler + maybe_sync::MaybeSend {
    /// Kind of the controller.
    fn kind(&self) -> ModeKind;

    /// Returns true if the controller is active.
    fn is_active(&self) -> bool;

    /// Activates the controller in the given mode. The mode is owned by this controller.
    fn activate(&mut self, mode: &InteractionMode, session: &mut Session) -> Result<(), GifwError>;

    /// Removes sub-interactions and listeners of the controller.
    fn deactivate(&mut self, session: &mut Session);

    /// Called for every dispatched map event.
    fn on_map_event(&mut self, _event: &MapEvent, _session: &mut Session) {}

    /// Called when a timer scheduled by the controller fires.
    fn on_timer(&mut self, _timer: TimerId, _session: &mut Session) {}

    /// Called when a key is pressed while the controller has a live keyboard listener. Returns
    /// true if the key was used.
    fn on_key(&mut self, _key: Key, _modifiers: Modifiers, _session: &mut Session) -> bool {
        false
    }
}

/// Balanced counters of mode activations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeStats {
    /// Number of activations.
    pub activations: usize,
    /// Number of deactivations.
    pub deactivations: usize,
}

/// Shared activation steps: hides the popup, shows the backing layer, sets the cursor, disables
/// the context menu and registers a keyboard listener.
pub(crate) fn begin_activation(
    session: &mut Session,
    kind: ModeKind,
    layer: Option<SystemLayer>,
    cursor: Cursor,
) -> AbortHandle {
    session.popup_mut().close();
    if let Some(layer) = layer {
        session.ensure_system_layer(layer);
        session.map_mut().set_layer_visible(layer.id(), true);
    }

    let ui = session.ui_mut();
    ui.cursor = cursor;
    ui.context_menu_enabled = false;

    session.keyboard_mut().register(kind)
}

/// Shared deactivation steps, undoing [`begin_activation`].
pub(crate) fn end_activation(session: &mut Session, keyboard: Option<AbortHandle>) {
    if let Some(handle) = keyboard {
        handle.abort();
    }
    session.keyboard_mut().purge();

    let ui = session.ui_mut();
    ui.cursor = Cursor::Default;
    ui.context_menu_enabled = true;
    ui.active_button = None;
}

/// Returns true for the undo shortcut: Ctrl+Z or Cmd+Z.
pub(crate) fn is_undo(key: Key, modifiers: Modifiers) -> bool {
    modifiers.is_command() && key == Key::Character('z')
}
