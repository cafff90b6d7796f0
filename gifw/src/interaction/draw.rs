use gifw_types::cartesian::Point2d;
use gifw_types::geometry::{Geom, GeometryType, Polygon};

use crate::control::{EventPropagation, MouseButton, UserEvent};

/// Result of giving an event to a [`Draw`] interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOutcome {
    /// The event did not change the sketch.
    Ignored,
    /// The sketch changed.
    Updated,
    /// Drawing is finished with the geometry.
    Finished(Geom),
    /// Drawing was cancelled.
    Aborted,
}

/// Multi-step drawing of a point, line or polygon.
///
/// Clicks with the primary button add vertices, a double click or a click with the secondary
/// button finishes the geometry. Dragging with Shift pressed draws freehand until the button is
/// released.
#[derive(Debug, Clone)]
pub struct Draw {
    geometry_type: GeometryType,
    points: Vec<Point2d>,
    freehand: bool,
    pointer: Option<Point2d>,
}

impl Draw {
    /// Creates a new interaction drawing geometries of the given type.
    pub fn new(geometry_type: GeometryType) -> Self {
        Self {
            geometry_type,
            points: vec![],
            freehand: false,
            pointer: None,
        }
    }

    /// Type of the drawn geometry.
    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    /// Returns true if at least one vertex was added.
    pub fn is_drawing(&self) -> bool {
        !self.points.is_empty()
    }

    /// Vertices added so far.
    pub fn points(&self) -> &[Point2d] {
        &self.points
    }

    /// Current sketch: the added vertices followed by the pointer position.
    pub fn sketch(&self) -> Option<Geom> {
        if self.points.is_empty() {
            return None;
        }

        let mut points = self.points.clone();
        if let Some(pointer) = self.pointer {
            if points.last() != Some(&pointer) {
                points.push(pointer);
            }
        }

        Some(match self.geometry_type {
            GeometryType::Point => Geom::Point(points[0]),
            GeometryType::LineString => Geom::LineString(points),
            GeometryType::Polygon => Geom::Polygon(Polygon::new(points, vec![])),
        })
    }

    /// Drops the sketch.
    pub fn abort(&mut self) -> DrawOutcome {
        let was_drawing = self.is_drawing();
        self.points.clear();
        self.freehand = false;

        if was_drawing {
            DrawOutcome::Aborted
        } else {
            DrawOutcome::Ignored
        }
    }

    /// Removes the last added vertex. Returns false if there was none.
    pub fn remove_last_point(&mut self) -> bool {
        self.points.pop().is_some()
    }

    /// Handles the event. `snap` adjusts the clicked map position, for example to the nearest
    /// existing vertex.
    pub fn handle(
        &mut self,
        event: &UserEvent,
        snap: impl Fn(Point2d) -> Point2d,
    ) -> (DrawOutcome, EventPropagation) {
        match event {
            UserEvent::Click(MouseButton::Left, e) => {
                self.points.push(snap(e.map_pointer_position));
                let outcome = if self.geometry_type == GeometryType::Point {
                    self.finish()
                } else {
                    DrawOutcome::Updated
                };
                (outcome, EventPropagation::Stop)
            }
            UserEvent::Click(MouseButton::Right, e) => {
                self.points.push(snap(e.map_pointer_position));
                (self.finish(), EventPropagation::Stop)
            }
            UserEvent::DoubleClick(MouseButton::Left, _) if self.is_drawing() => {
                (self.finish(), EventPropagation::Stop)
            }
            UserEvent::DragStarted(MouseButton::Left, e)
                if e.modifiers.shift && self.geometry_type != GeometryType::Point =>
            {
                self.freehand = true;
                self.points.push(e.map_pointer_position);
                (DrawOutcome::Updated, EventPropagation::Consume)
            }
            UserEvent::Drag(_, _, e) if self.freehand => {
                self.points.push(e.map_pointer_position);
                self.pointer = Some(e.map_pointer_position);
                (DrawOutcome::Updated, EventPropagation::Stop)
            }
            UserEvent::DragEnded(_, _) if self.freehand => {
                self.freehand = false;
                (self.finish(), EventPropagation::Stop)
            }
            UserEvent::PointerMoved(e) => {
                self.pointer = Some(snap(e.map_pointer_position));
                let outcome = if self.is_drawing() {
                    DrawOutcome::Updated
                } else {
                    DrawOutcome::Ignored
                };
                (outcome, EventPropagation::Propagate)
            }
            _ => (DrawOutcome::Ignored, EventPropagation::Propagate),
        }
    }

    fn finish(&mut self) -> DrawOutcome {
        self.points.dedup();
        let required = match self.geometry_type {
            GeometryType::Point => 1,
            GeometryType::LineString => 2,
            GeometryType::Polygon => 3,
        };
        if self.points.len() < required {
            return DrawOutcome::Updated;
        }

        let points = std::mem::take(&mut self.points);
        DrawOutcome::Finished(match self.geometry_type {
            GeometryType::Point => Geom::Point(points[0]),
            GeometryType::LineString => Geom::LineString(points),
            GeometryType::Polygon => Geom::Polygon(Polygon::new(points, vec![])),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use gifw_types::cartesian::Vector2d;

    use super::*;
    use crate::control::{Modifiers, MouseButtonsState, MouseEvent};

    fn mouse(x: f64, y: f64) -> MouseEvent {
        MouseEvent {
            screen_pointer_position: Point2d::new(x, y),
            map_pointer_position: Point2d::new(x, y),
            buttons: MouseButtonsState::default(),
            modifiers: Modifiers::default(),
        }
    }

    fn click(draw: &mut Draw, x: f64, y: f64) -> DrawOutcome {
        draw.handle(&UserEvent::Click(MouseButton::Left, mouse(x, y)), |p| p)
            .0
    }

    #[test]
    fn line_finishes_on_double_click() {
        let mut draw = Draw::new(GeometryType::LineString);
        assert_eq!(click(&mut draw, 0.0, 0.0), DrawOutcome::Updated);
        assert_eq!(click(&mut draw, 10.0, 0.0), DrawOutcome::Updated);
        assert_eq!(click(&mut draw, 10.0, 0.0), DrawOutcome::Updated);

        let (outcome, propagation) = draw.handle(
            &UserEvent::DoubleClick(MouseButton::Left, mouse(10.0, 0.0)),
            |p| p,
        );
        assert_eq!(
            outcome,
            DrawOutcome::Finished(Geom::LineString(vec![
                Point2d::new(0.0, 0.0),
                Point2d::new(10.0, 0.0)
            ]))
        );
        assert_eq!(propagation, EventPropagation::Stop);
        assert!(!draw.is_drawing());
    }

    #[test]
    fn right_click_appends_and_finishes() {
        let mut draw = Draw::new(GeometryType::Polygon);
        click(&mut draw, 0.0, 0.0);
        click(&mut draw, 10.0, 0.0);

        let (outcome, _) = draw.handle(&UserEvent::Click(MouseButton::Right, mouse(10.0, 10.0)), |p| p);
        let DrawOutcome::Finished(Geom::Polygon(polygon)) = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(polygon.exterior().len(), 4);
    }

    #[test]
    fn too_few_points_keep_drawing() {
        let mut draw = Draw::new(GeometryType::Polygon);
        click(&mut draw, 0.0, 0.0);
        let (outcome, _) = draw.handle(&UserEvent::Click(MouseButton::Right, mouse(5.0, 5.0)), |p| p);
        assert_eq!(outcome, DrawOutcome::Updated);
        assert_eq!(draw.points().len(), 2);
    }

    #[test]
    fn undo_and_abort() {
        let mut draw = Draw::new(GeometryType::LineString);
        click(&mut draw, 0.0, 0.0);
        click(&mut draw, 1.0, 0.0);
        assert!(draw.remove_last_point());
        assert_eq!(draw.points().len(), 1);

        assert_eq!(draw.abort(), DrawOutcome::Aborted);
        assert_eq!(draw.abort(), DrawOutcome::Ignored);
    }

    #[test]
    fn shift_drag_draws_freehand() {
        let mut draw = Draw::new(GeometryType::LineString);
        let mut start = mouse(0.0, 0.0);
        assert_eq!(
            draw.handle(&UserEvent::DragStarted(MouseButton::Left, start.clone()), |p| p)
                .1,
            EventPropagation::Propagate
        );

        start.modifiers.shift = true;
        let (_, propagation) = draw.handle(&UserEvent::DragStarted(MouseButton::Left, start), |p| p);
        assert_eq!(propagation, EventPropagation::Consume);
        for x in 1..5 {
            draw.handle(
                &UserEvent::Drag(MouseButton::Left, Vector2d::new(1.0, 0.0), mouse(x as f64, 0.0)),
                |p| p,
            );
        }

        let (outcome, _) = draw.handle(&UserEvent::DragEnded(MouseButton::Left, mouse(4.0, 0.0)), |p| p);
        assert_matches!(outcome, DrawOutcome::Finished(Geom::LineString(points)) if points.len() == 5);
    }

    #[test]
    fn point_finishes_on_click_with_snap() {
        let mut draw = Draw::new(GeometryType::Point);
        let (outcome, _) = draw.handle(
            &UserEvent::Click(MouseButton::Left, mouse(0.4, 0.4)),
            |p| Point2d::new(p.x.round(), p.y.round()),
        );
        assert_eq!(outcome, DrawOutcome::Finished(Geom::Point(Point2d::new(0.0, 0.0))));
    }
}
