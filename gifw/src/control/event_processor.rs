use std::time::Duration;

use gifw_types::cartesian::{CartesianPoint2d, Point2d};
use web_time::Instant;

use crate::control::{
    EventPropagation, Modifiers, MouseButtonsState, MouseEvent, RawUserEvent, UserEvent,
    UserEventHandler,
};
use crate::engine::Session;
use crate::view::MapView;

const DRAG_THRESHOLD: f64 = 3.0;
const CLICK_TIMEOUT: Duration = Duration::from_millis(200);
const DBL_CLICK_TIMEOUT: Duration = Duration::from_millis(500);

/// Converts [`RawUserEvent`]s into [`UserEvent`]s and hands them to the handlers.
#[derive(Debug)]
pub struct EventProcessor {
    pointer_position: Point2d,
    pointer_pressed_position: Point2d,

    buttons_state: MouseButtonsState,
    modifiers: Modifiers,

    last_pressed_time: Option<Instant>,
    last_click_time: Option<Instant>,

    drag_started: bool,
    drag_target: Option<usize>,
}

impl Default for EventProcessor {
    fn default() -> Self {
        Self {
            pointer_position: Point2d::origin(),
            pointer_pressed_position: Point2d::origin(),
            buttons_state: Default::default(),
            modifiers: Default::default(),
            last_pressed_time: None,
            last_click_time: None,
            drag_started: false,
            drag_target: None,
        }
    }
}

impl EventProcessor {
    /// Current state of the modifier keys.
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Returns true if a handler owns the current drag.
    pub fn is_dragging(&self) -> bool {
        self.drag_target.is_some()
    }

    /// Processes the event and gives the produced events to `handlers` in order, until one of
    /// them stops the propagation.
    pub fn handle(
        &mut self,
        event: RawUserEvent,
        session: &mut Session,
        handlers: &mut [&mut dyn UserEventHandler],
    ) {
        let now = session.now();
        let user_events = self.process(event, session.map().view(), now);

        for user_event in user_events {
            let mut drag_start_target = None;

            for (index, handler) in handlers.iter_mut().enumerate() {
                if matches!(user_event, UserEvent::Drag(..) | UserEvent::DragEnded(..))
                    && self.drag_target != Some(index)
                {
                    continue;
                }

                match handler.handle(&user_event, session) {
                    EventPropagation::Propagate => {}
                    EventPropagation::Stop => break,
                    EventPropagation::Consume => {
                        if let UserEvent::DragStarted(button, _) = &user_event {
                            drag_start_target = Some(index);

                            let delta = self.pointer_position - self.pointer_pressed_position;
                            let mouse_event = self.mouse_event(session.map().view());
                            handler.handle(&UserEvent::Drag(*button, delta, mouse_event), session);
                        }

                        break;
                    }
                }
            }

            if drag_start_target.is_some() {
                self.drag_target = drag_start_target;
            }
        }
    }

    fn process(&mut self, event: RawUserEvent, view: &MapView, now: Instant) -> Vec<UserEvent> {
        match event {
            RawUserEvent::ButtonPressed(button) => {
                self.buttons_state.set_pressed(button);
                self.last_pressed_time = Some(now);
                self.pointer_pressed_position = self.pointer_position;
                self.drag_started = false;

                vec![UserEvent::ButtonPressed(button, self.mouse_event(view))]
            }
            RawUserEvent::ButtonReleased(button) => {
                self.buttons_state.set_released(button);
                let mut events = vec![UserEvent::ButtonReleased(button, self.mouse_event(view))];

                if self.drag_started {
                    self.drag_started = false;
                    if self.drag_target.take().is_some() {
                        events.push(UserEvent::DragEnded(button, self.mouse_event(view)));
                    }
                    return events;
                }

                let is_click = self
                    .last_pressed_time
                    .is_some_and(|pressed| now.saturating_duration_since(pressed) < CLICK_TIMEOUT);
                if is_click {
                    events.push(UserEvent::Click(button, self.mouse_event(view)));

                    let is_double = self
                        .last_click_time
                        .is_some_and(|last| now.saturating_duration_since(last) < DBL_CLICK_TIMEOUT);
                    if is_double {
                        events.push(UserEvent::DoubleClick(button, self.mouse_event(view)));
                        self.last_click_time = None;
                    } else {
                        self.last_click_time = Some(now);
                    }
                }

                events
            }
            RawUserEvent::PointerMoved(position) => {
                let prev_position = self.pointer_position;
                self.pointer_position = position;

                let mut events = vec![UserEvent::PointerMoved(self.mouse_event(view))];
                if let Some(button) = self.buttons_state.single_pressed() {
                    if !self.drag_started
                        && position.taxicab_distance(&self.pointer_pressed_position)
                            > DRAG_THRESHOLD
                    {
                        self.drag_started = true;
                        events.push(UserEvent::DragStarted(
                            button,
                            self.mouse_event_at(view, self.pointer_pressed_position),
                        ));
                    } else if self.drag_target.is_some() {
                        events.push(UserEvent::Drag(
                            button,
                            position - prev_position,
                            self.mouse_event(view),
                        ));
                    }
                }

                events
            }
            RawUserEvent::Scroll(delta) => vec![UserEvent::Scroll(delta, self.mouse_event(view))],
            RawUserEvent::KeyPressed(key) => vec![UserEvent::KeyPressed(key, self.modifiers)],
            RawUserEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers;
                vec![]
            }
        }
    }

    fn mouse_event(&self, view: &MapView) -> MouseEvent {
        self.mouse_event_at(view, self.pointer_position)
    }

    fn mouse_event_at(&self, view: &MapView, screen_pointer_position: Point2d) -> MouseEvent {
        MouseEvent {
            screen_pointer_position,
            map_pointer_position: view.px_to_map(screen_pointer_position),
            buttons: self.buttons_state,
            modifiers: self.modifiers,
        }
    }
}
