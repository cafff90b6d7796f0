use gifw_types::cartesian::{CartesianPoint2d, Point2d};

use crate::control::{EventPropagation, MouseButton, UserEvent};
use crate::layer::{FeatureId, FeatureStore};

/// Distance in pixels within which a pointer grabs or snaps to a vertex.
pub const VERTEX_TOLERANCE_PX: f64 = 8.0;

/// Result of giving an event to a [`Modify`] interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOutcome {
    /// The event was not used.
    Ignored,
    /// A vertex of the feature was grabbed.
    Started(FeatureId),
    /// A vertex of the feature was moved.
    Moved(FeatureId),
    /// The vertex was released.
    Ended(FeatureId),
}

/// Dragging of the vertices of selected features.
#[derive(Debug, Clone, Default)]
pub struct Modify {
    dragging: Option<(FeatureId, usize)>,
}

impl Modify {
    /// Returns true while a vertex is being dragged.
    pub fn is_dragging(&self) -> bool {
        self.dragging.is_some()
    }

    /// Handles the event for the `candidates` features of the store. `resolution` converts the
    /// pixel tolerance into map units.
    pub fn handle(
        &mut self,
        event: &UserEvent,
        store: &mut FeatureStore,
        candidates: &[FeatureId],
        resolution: f64,
    ) -> (ModifyOutcome, EventPropagation) {
        match event {
            UserEvent::DragStarted(MouseButton::Left, e) => {
                let tolerance = VERTEX_TOLERANCE_PX * resolution;
                let grabbed = candidates
                    .iter()
                    .filter_map(|id| {
                        let feature = store.get(*id)?;
                        let (index, distance) =
                            feature.geometry().nearest_vertex(&e.map_pointer_position)?;
                        (distance <= tolerance).then_some((*id, index, distance))
                    })
                    .min_by(|a, b| a.2.total_cmp(&b.2));

                match grabbed {
                    Some((id, index, _)) => {
                        self.dragging = Some((id, index));
                        (ModifyOutcome::Started(id), EventPropagation::Consume)
                    }
                    None => (ModifyOutcome::Ignored, EventPropagation::Propagate),
                }
            }
            UserEvent::Drag(_, _, e) => {
                let Some((id, index)) = self.dragging else {
                    return (ModifyOutcome::Ignored, EventPropagation::Propagate);
                };

                let moved = store
                    .get_mut(id)
                    .is_some_and(|f| f.geometry_mut().move_vertex(index, e.map_pointer_position));
                if moved {
                    (ModifyOutcome::Moved(id), EventPropagation::Stop)
                } else {
                    self.dragging = None;
                    (ModifyOutcome::Ignored, EventPropagation::Stop)
                }
            }
            UserEvent::DragEnded(_, _) => match self.dragging.take() {
                Some((id, _)) => (ModifyOutcome::Ended(id), EventPropagation::Stop),
                None => (ModifyOutcome::Ignored, EventPropagation::Propagate),
            },
            _ => (ModifyOutcome::Ignored, EventPropagation::Propagate),
        }
    }
}

/// Nearest vertex of a visible feature within `tolerance` map units of the point.
pub fn snap_to_vertex(store: &FeatureStore, point: &Point2d, tolerance: f64) -> Option<Point2d> {
    store
        .iter_visible()
        .flat_map(|f| f.geometry().vertices().iter())
        .map(|v| (v, v.distance(point)))
        .filter(|(_, distance)| *distance <= tolerance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(v, _)| *v)
}

#[cfg(test)]
mod tests {
    use gifw_types::cartesian::Vector2d;
    use gifw_types::geometry::Geom;

    use super::*;
    use crate::control::{Modifiers, MouseButtonsState, MouseEvent};
    use crate::layer::Feature;

    fn mouse(x: f64, y: f64) -> MouseEvent {
        MouseEvent {
            screen_pointer_position: Point2d::new(x, y),
            map_pointer_position: Point2d::new(x, y),
            buttons: MouseButtonsState::default(),
            modifiers: Modifiers::default(),
        }
    }

    #[test]
    fn drags_nearest_vertex() {
        let mut store = FeatureStore::default();
        let line = store.add(Feature::new(Geom::LineString(vec![
            Point2d::new(0.0, 0.0),
            Point2d::new(100.0, 0.0),
        ])));

        let mut modify = Modify::default();
        let (outcome, propagation) = modify.handle(
            &UserEvent::DragStarted(MouseButton::Left, mouse(98.0, 2.0)),
            &mut store,
            &[line],
            1.0,
        );
        assert_eq!(outcome, ModifyOutcome::Started(line));
        assert_eq!(propagation, EventPropagation::Consume);

        modify.handle(
            &UserEvent::Drag(MouseButton::Left, Vector2d::new(2.0, 8.0), mouse(100.0, 10.0)),
            &mut store,
            &[line],
            1.0,
        );
        let (outcome, _) = modify.handle(
            &UserEvent::DragEnded(MouseButton::Left, mouse(100.0, 10.0)),
            &mut store,
            &[line],
            1.0,
        );
        assert_eq!(outcome, ModifyOutcome::Ended(line));
        assert_eq!(
            store.get(line).map(|f| f.geometry().vertices()[1]),
            Some(Point2d::new(100.0, 10.0))
        );
    }

    #[test]
    fn far_drag_pans_the_map() {
        let mut store = FeatureStore::default();
        let point = store.add(Feature::new(Geom::Point(Point2d::new(0.0, 0.0))));

        let mut modify = Modify::default();
        let (outcome, propagation) = modify.handle(
            &UserEvent::DragStarted(MouseButton::Left, mouse(50.0, 50.0)),
            &mut store,
            &[point],
            1.0,
        );
        assert_eq!(outcome, ModifyOutcome::Ignored);
        assert_eq!(propagation, EventPropagation::Propagate);
    }

    #[test]
    fn snaps_within_tolerance() {
        let mut store = FeatureStore::default();
        store.add(Feature::new(Geom::Point(Point2d::new(10.0, 10.0))));

        assert_eq!(
            snap_to_vertex(&store, &Point2d::new(12.0, 10.0), 5.0),
            Some(Point2d::new(10.0, 10.0))
        );
        assert_eq!(snap_to_vertex(&store, &Point2d::new(20.0, 10.0), 5.0), None);
    }
}
