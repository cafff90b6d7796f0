//! Pointer and keyboard input of the map.
//!
//! The host reports [`RawUserEvent`]s to [`MapEngine::handle_input`](crate::MapEngine::handle_input).
//! The [`EventProcessor`] tracks buttons and modifiers and turns them into [`UserEvent`]s, which
//! go to the active interaction mode first and then to the [`MapController`].

use gifw_types::cartesian::{Point2d, Vector2d};

use crate::engine::Session;

mod event_processor;
mod map;

pub use event_processor::EventProcessor;
pub use map::{MapController, MapControllerConfiguration};

/// Receives user input in the order set by the engine.
pub trait UserEventHandler {
    /// Handles the event and tells the engine whether the next handler sees it too.
    fn handle(&mut self, event: &UserEvent, session: &mut Session) -> EventPropagation;
}

/// Input as the host reports it. The [`EventProcessor`] adds button and modifier state.
#[derive(Debug, Clone, PartialEq)]
pub enum RawUserEvent {
    /// Button down.
    ButtonPressed(MouseButton),
    /// Button up.
    ButtonReleased(MouseButton),
    /// Pointer at a screen pixel.
    PointerMoved(Point2d),
    /// Wheel or touch pad scroll in lines. Positive scrolls towards the user.
    Scroll(f64),
    /// Key down.
    KeyPressed(Key),
    /// Shift, Ctrl, Alt or Meta changed.
    ModifiersChanged(Modifiers),
}

/// Input after click, double click and drag detection.
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    /// Button down.
    ButtonPressed(MouseButton, MouseEvent),
    /// Button up.
    ButtonReleased(MouseButton, MouseEvent),
    /// Press and release close in time without a drag in between. Follows the release.
    Click(MouseButton, MouseEvent),
    /// Second click of the same button within the double click interval. Follows the second
    /// [`UserEvent::Click`].
    DoubleClick(MouseButton, MouseEvent),
    /// Pointer moved with no drag in progress.
    PointerMoved(MouseEvent),
    /// The pointer moved past the drag threshold with one button held down.
    DragStarted(MouseButton, MouseEvent),
    /// Pointer moved during a drag. Carries the pixel offset since the previous drag event.
    /// Only the handler that consumed [`UserEvent::DragStarted`] receives it.
    Drag(MouseButton, Vector2d, MouseEvent),
    /// Button released during a drag.
    DragEnded(MouseButton, MouseEvent),
    /// Scroll in lines. The [`MapController`] turns it into a zoom step.
    Scroll(f64, MouseEvent),
    /// Key down with the modifiers held at that moment.
    KeyPressed(Key, Modifiers),
}

/// What happens to an event after a handler saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPropagation {
    /// Pass to the next handler.
    Propagate,
    /// Handled, the next handler does not see it.
    Stop,
    /// Handled, and the handler owns the drag that started with this event.
    Consume,
}

/// Pointer button.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MouseButton {
    /// Primary button.
    Left,
    /// Wheel button.
    Middle,
    /// Secondary button, opening the context menu.
    Right,
    /// Any other button.
    Other,
}

/// Keys the interaction modes react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Escape
    Escape,
    /// Enter
    Enter,
    /// Backspace
    Backspace,
    /// Delete
    Delete,
    /// A character key, lowercase.
    Character(char),
}

/// State of the modifier keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Shift key.
    pub shift: bool,
    /// Control key.
    pub ctrl: bool,
    /// Alt/option key.
    pub alt: bool,
    /// Command/windows key.
    pub meta: bool,
}

impl Modifiers {
    /// Returns true if the platform shortcut key (Ctrl or Cmd) is pressed.
    pub fn is_command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// State of the mouse at the moment of the event.
#[derive(Debug, Clone, PartialEq)]
pub struct MouseEvent {
    /// Pointer position on the screen in pixels from the top-left corner.
    pub screen_pointer_position: Point2d,
    /// Pointer position in map coordinates.
    pub map_pointer_position: Point2d,
    /// State of the mouse buttons.
    pub buttons: MouseButtonsState,
    /// State of the modifier keys.
    pub modifiers: Modifiers,
}

/// Whether a button is held down.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MouseButtonState {
    /// Held down.
    Pressed,
    /// Up.
    Released,
}

/// Buttons held down at the moment of an event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MouseButtonsState {
    /// Primary.
    pub left: MouseButtonState,
    /// Wheel.
    pub middle: MouseButtonState,
    /// Secondary.
    pub right: MouseButtonState,
}

impl MouseButtonsState {
    pub(crate) fn set_pressed(&mut self, button: MouseButton) {
        self.set_state(button, MouseButtonState::Pressed);
    }

    pub(crate) fn set_released(&mut self, button: MouseButton) {
        self.set_state(button, MouseButtonState::Released);
    }

    fn set_state(&mut self, button: MouseButton, state: MouseButtonState) {
        match button {
            MouseButton::Left => self.left = state,
            MouseButton::Middle => self.middle = state,
            MouseButton::Right => self.right = state,
            MouseButton::Other => {}
        }
    }

    fn single_pressed(&self) -> Option<MouseButton> {
        let mut pressed = [
            (MouseButton::Left, self.left),
            (MouseButton::Middle, self.middle),
            (MouseButton::Right, self.right),
        ]
        .into_iter()
        .filter(|(_, state)| *state == MouseButtonState::Pressed)
        .map(|(button, _)| button);

        match (pressed.next(), pressed.next()) {
            (Some(button), None) => Some(button),
            _ => None,
        }
    }
}

impl Default for MouseButtonsState {
    fn default() -> Self {
        Self {
            left: MouseButtonState::Released,
            middle: MouseButtonState::Released,
            right: MouseButtonState::Released,
        }
    }
}
