//! Drawing and editing of user annotations.

use futures::future::AbortHandle;
use gifw_types::buffer::geodesic_buffer;
use gifw_types::geo::Crs;
use gifw_types::geometry::Geom;
use gifw_types::units::UnitSystem;
use log::{debug, warn};

use crate::control::{EventPropagation, Key, Modifiers, MouseButton, UserEvent, UserEventHandler};
use crate::engine::{Cursor, Session};
use crate::error::GifwError;
use crate::event_bus::{DeferredTask, MapEvent};
use crate::interaction::measure::measure;
use crate::interaction::modify::VERTEX_TOLERANCE_PX;
use crate::interaction::{
    begin_activation, end_activation, is_undo, snap_to_vertex, Draw, DrawOutcome, InteractionMode,
    ModeController, ModeKind, Modify, ModifyOutcome,
};
use crate::layer::{Feature, FeatureId, FeatureMeta, SystemLayer, ANNOTATIONS_LAYER_ID};
use crate::popup::{PopupAction, PopupCommand, PopupOptions};

mod backdrop;
mod select;
mod style;

pub use backdrop::{backdrop_geometry, BACKDROP_PADDING_PX};
pub use select::{pick_feature, Pick, HIT_TOLERANCE_PX};
pub use style::{AnnotationStyle, AnnotationTool, LineDash};

/// Controller of the annotate mode.
///
/// In [`InteractionMode::Annotating`] the controller draws features with the chosen tool into the
/// annotations layer. In [`InteractionMode::Modifying`] clicks select annotations and dragging a
/// vertex of the selected annotation moves it.
#[derive(Debug, Default)]
pub struct AnnotateController {
    active: bool,
    tool: Option<AnnotationTool>,
    style: AnnotationStyle,
    draw: Option<Draw>,
    modify: Option<Modify>,
    selected: Vec<FeatureId>,
    backdrop: Option<Geom>,
    keyboard: Option<AbortHandle>,
}

impl AnnotateController {
    /// Drawing tool, `None` while modifying.
    pub fn tool(&self) -> Option<AnnotationTool> {
        self.tool
    }

    /// Values of the style configurator.
    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    /// Replaces the style used for new drawings and restyles the selected annotations.
    pub fn set_style(&mut self, style: AnnotationStyle, session: &mut Session) {
        self.style = style;

        let crs = session.map().view().crs().clone();
        let units = session.settings().preferred_units();
        let Some(store) = session.system_features_mut(SystemLayer::Annotations) else {
            return;
        };

        for id in &self.selected {
            let Some(feature) = store.get_mut(*id) else {
                continue;
            };
            let Some(tool) = feature.meta().tool.as_deref().and_then(AnnotationTool::from_name)
            else {
                continue;
            };

            feature.set_style(self.style.feature_style(tool));
            if tool == AnnotationTool::Buffer {
                feature.meta_mut().buffer = Some(self.style.buffer());
            }
            refresh_popup(feature, tool, &crs, units);
        }
    }

    /// Selected annotations.
    pub fn selected(&self) -> &[FeatureId] {
        &self.selected
    }

    /// Area dimming the map around the selected annotation.
    pub fn backdrop(&self) -> Option<&Geom> {
        self.backdrop.as_ref()
    }

    /// Geometry being drawn, ending at the pointer.
    pub fn sketch(&self) -> Option<Geom> {
        self.draw.as_ref().and_then(Draw::sketch)
    }

    fn retire_tool(&mut self) {
        self.draw = None;
        self.modify = None;
        self.selected.clear();
        self.backdrop = None;
    }

    fn finish_drawing(&mut self, geometry: Geom, session: &mut Session) {
        let Some(tool) = self.tool else {
            return;
        };

        let crs = session.map().view().crs().clone();
        let units = session.settings().preferred_units();
        let geometry = if tool == AnnotationTool::Buffer {
            match buffer_geometry(&geometry, &crs, self.style.buffer().radius_metres()) {
                Ok(buffer) => buffer,
                Err(err) => {
                    warn!("Failed to buffer annotation: {err}");
                    return;
                }
            }
        } else {
            geometry
        };

        let style = self.style.feature_style(tool);
        let is_empty_text = tool == AnnotationTool::Text && style.label.is_none();
        let mut feature = Feature::new(geometry).with_style(style).with_meta(FeatureMeta {
            popup: None,
            tool: Some(tool.name().to_string()),
            buffer: (tool == AnnotationTool::Buffer).then(|| self.style.buffer()),
        });
        refresh_popup(&mut feature, tool, &crs, units);

        let Some(store) = session.system_features_mut(SystemLayer::Annotations) else {
            return;
        };
        let feature_id = store.add(feature);
        debug!("Added {tool} annotation {feature_id}");

        let bus = session.bus_mut();
        bus.publish(MapEvent::DrawEnd {
            layer_id: ANNOTATIONS_LAYER_ID.to_string(),
            feature_id,
        });
        if is_empty_text {
            bus.defer(DeferredTask::RemoveEmptyText {
                layer_id: ANNOTATIONS_LAYER_ID.to_string(),
                feature_id,
            });
        }
    }

    fn handle_modify(&mut self, event: &UserEvent, session: &mut Session) -> EventPropagation {
        let resolution = session.map().view().resolution();

        if let UserEvent::Click(MouseButton::Left, e) = event {
            let pick = session
                .system_features(SystemLayer::Annotations)
                .and_then(|store| pick_feature(store, &e.map_pointer_position, resolution));
            match pick {
                Some(pick) => session.bus_mut().publish(MapEvent::FeatureSelected {
                    layer_id: ANNOTATIONS_LAYER_ID.to_string(),
                    feature_id: pick.feature_id,
                    synthetic: pick.synthetic,
                }),
                None => {
                    self.selected.clear();
                    self.backdrop = None;
                }
            }
            return EventPropagation::Stop;
        }

        let Some(modify) = self.modify.as_mut() else {
            return EventPropagation::Propagate;
        };
        let Some(store) = session.system_features_mut(SystemLayer::Annotations) else {
            return EventPropagation::Propagate;
        };

        let (outcome, propagation) = modify.handle(event, store, &self.selected, resolution);
        match outcome {
            ModifyOutcome::Started(_) => session.ui_mut().cursor = Cursor::Move,
            ModifyOutcome::Ended(feature_id) => {
                session.ui_mut().cursor = Cursor::Pointer;
                self.update_popup(feature_id, session);
                session.bus_mut().publish(MapEvent::ModifyEnd {
                    layer_id: ANNOTATIONS_LAYER_ID.to_string(),
                    feature_id,
                });
                self.update_backdrop(session);
            }
            ModifyOutcome::Moved(_) | ModifyOutcome::Ignored => {}
        }

        propagation
    }

    fn update_popup(&self, feature_id: FeatureId, session: &mut Session) {
        let crs = session.map().view().crs().clone();
        let units = session.settings().preferred_units();
        let Some(feature) = session
            .system_features_mut(SystemLayer::Annotations)
            .and_then(|store| store.get_mut(feature_id))
        else {
            return;
        };

        if let Some(tool) = feature.meta().tool.as_deref().and_then(AnnotationTool::from_name) {
            refresh_popup(feature, tool, &crs, units);
        }
    }

    fn update_backdrop(&mut self, session: &Session) {
        let view = session.map().view();
        self.backdrop = self.selected.first().and_then(|id| {
            let feature = session.system_features(SystemLayer::Annotations)?.get(*id)?;
            let half_width = feature
                .style()
                .map(|s| s.half_width_px())
                .unwrap_or_default();
            let padding = (BACKDROP_PADDING_PX + half_width) * view.resolution();
            let world = view.crs().world_extent().or_else(|| view.extent())?;
            backdrop_geometry(feature.geometry(), &world, padding)
        });
    }

    fn remove_selected(&mut self, session: &mut Session) -> bool {
        if self.selected.is_empty() {
            return false;
        }

        let selected = std::mem::take(&mut self.selected);
        self.backdrop = None;
        for feature_id in selected {
            session.bus_mut().defer(DeferredTask::RemoveFeature {
                layer_id: ANNOTATIONS_LAYER_ID.to_string(),
                feature_id,
            });
        }

        true
    }
}

impl UserEventHandler for AnnotateController {
    fn handle(&mut self, event: &UserEvent, session: &mut Session) -> EventPropagation {
        if !self.active {
            return EventPropagation::Propagate;
        }

        if let Some(draw) = &mut self.draw {
            let tolerance = VERTEX_TOLERANCE_PX * session.map().view().resolution();
            let store = session.system_features(SystemLayer::Annotations);
            let (outcome, propagation) = draw.handle(event, |point| {
                store
                    .and_then(|store| snap_to_vertex(store, &point, tolerance))
                    .unwrap_or(point)
            });

            if let DrawOutcome::Finished(geometry) = outcome {
                self.finish_drawing(geometry, session);
            }
            return propagation;
        }

        if self.modify.is_some() {
            return self.handle_modify(event, session);
        }

        EventPropagation::Propagate
    }
}

impl ModeController for AnnotateController {
    fn kind(&self) -> ModeKind {
        ModeKind::Annotate
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn activate(&mut self, mode: &InteractionMode, session: &mut Session) -> Result<(), GifwError> {
        let tool = match mode {
            InteractionMode::Annotating(tool) => Some(*tool),
            InteractionMode::Modifying => None,
            other => {
                return Err(GifwError::Generic(format!(
                    "annotate controller cannot run {other:?}"
                )))
            }
        };

        if self.active {
            self.retire_tool();
        } else {
            self.keyboard = Some(begin_activation(
                session,
                ModeKind::Annotate,
                Some(SystemLayer::Annotations),
                Cursor::Crosshair,
            ));
            self.active = true;
        }

        let ui = session.ui_mut();
        match tool {
            Some(tool) => {
                self.draw = Some(Draw::new(tool.geometry_type()));
                ui.cursor = Cursor::Crosshair;
                ui.active_button = Some(format!("annotate-{tool}"));
            }
            None => {
                self.modify = Some(Modify::default());
                ui.cursor = Cursor::Pointer;
                ui.active_button = Some("annotate-modify".to_string());
            }
        }
        self.tool = tool;

        debug!("Annotate controller activated with {mode:?}");
        Ok(())
    }

    fn deactivate(&mut self, session: &mut Session) {
        self.retire_tool();
        self.tool = None;
        self.active = false;
        end_activation(session, self.keyboard.take());
    }

    fn on_map_event(&mut self, event: &MapEvent, session: &mut Session) {
        if let MapEvent::FeatureSelected {
            layer_id,
            feature_id,
            synthetic,
        } = event
        {
            if self.modify.is_none() || layer_id != ANNOTATIONS_LAYER_ID {
                return;
            }

            debug!("Selected annotation {feature_id} (synthetic: {synthetic})");
            self.selected = vec![*feature_id];
            self.update_backdrop(session);
        }
    }

    fn on_key(&mut self, key: Key, modifiers: Modifiers, session: &mut Session) -> bool {
        match key {
            Key::Escape => {
                if let Some(draw) = &mut self.draw {
                    if draw.abort() == DrawOutcome::Aborted {
                        return true;
                    }
                }
                if self.selected.is_empty() {
                    return false;
                }
                self.selected.clear();
                self.backdrop = None;
                true
            }
            Key::Delete | Key::Backspace if self.modify.is_some() => self.remove_selected(session),
            _ if is_undo(key, modifiers) => self
                .draw
                .as_mut()
                .is_some_and(|draw| draw.remove_last_point()),
            _ => false,
        }
    }
}

/// Geodesic buffer around the geometry: the geometry is transformed to geographic coordinates,
/// buffered by `radius` metres and transformed back into `crs`.
pub fn buffer_geometry(geometry: &Geom, crs: &Crs, radius: f64) -> Result<Geom, GifwError> {
    let geographic = geometry.transform(crs, &Crs::EPSG4326)?;
    let buffer = geodesic_buffer(&geographic, radius)
        .ok_or_else(|| GifwError::Generic("cannot buffer an empty geometry".into()))?;

    Ok(buffer.transform(&Crs::EPSG4326, crs)?)
}

fn refresh_popup(feature: &mut Feature, tool: AnnotationTool, crs: &Crs, units: UnitSystem) {
    let content = match tool {
        AnnotationTool::Text => feature
            .style()
            .and_then(|s| s.label.clone())
            .unwrap_or_default(),
        AnnotationTool::Buffer => feature
            .meta()
            .buffer
            .map(|b| format!("Radius: {} {}", b.radius, b.unit.abbreviation()))
            .unwrap_or_default(),
        AnnotationTool::Point => feature
            .geometry()
            .vertices()
            .first()
            .and_then(|p| crs.unproject(p).ok())
            .map(|p| format!("{:.5}, {:.5}", p.lat(), p.lon()))
            .unwrap_or_default(),
        AnnotationTool::Line | AnnotationTool::Polygon => match measure(feature.geometry(), crs) {
            Ok(Some(measurement)) => measurement.format(units),
            Ok(None) => String::new(),
            Err(err) => {
                warn!("Failed to measure annotation: {err}");
                String::new()
            }
        },
    };

    let layer_id = ANNOTATIONS_LAYER_ID.to_string();
    let feature_id = feature.id();
    let options = PopupOptions::new(tool.title(), content)
        .with_action(
            PopupAction::new(
                "Zoom to",
                PopupCommand::ZoomToFeature {
                    layer_id: layer_id.clone(),
                    feature_id,
                },
            )
            .with_closes_popup(true),
        )
        .with_action(
            PopupAction::new(
                "Edit",
                PopupCommand::EditFeature {
                    layer_id: layer_id.clone(),
                    feature_id,
                },
            )
            .with_closes_popup(true),
        )
        .with_action(
            PopupAction::new(
                "Remove",
                PopupCommand::RemoveFeature {
                    layer_id,
                    feature_id,
                },
            )
            .with_closes_popup(true)
            .with_confirmation(true),
        );

    feature.meta_mut().popup = Some(options);
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use gifw_types::cartesian::Point2d;
    use gifw_types::geo::GeoPoint2d;
    use gifw_types::geodesic::geodesic_area;

    use super::*;

    #[test]
    fn buffer_is_geodesic_circle() {
        let crs = Crs::EPSG3857;
        let center = crs
            .project(&GeoPoint2d::latlon(51.5, -0.1))
            .unwrap();
        let Geom::Polygon(polygon) = buffer_geometry(&Geom::Point(center), &crs, 100.0).unwrap()
        else {
            panic!("buffer is not a polygon");
        };

        let ring: Vec<GeoPoint2d> = polygon
            .exterior()
            .iter()
            .map(|p| crs.unproject(p).unwrap())
            .collect();
        assert_relative_eq!(
            geodesic_area(&ring),
            std::f64::consts::PI * 100.0 * 100.0,
            max_relative = 0.01
        );
    }

    #[test]
    fn popup_lists_actions() {
        let mut feature = Feature::new(Geom::Point(Point2d::new(0.0, 0.0)));
        refresh_popup(
            &mut feature,
            AnnotationTool::Point,
            &Crs::EPSG3857,
            UnitSystem::Metric,
        );

        let popup = feature.meta().popup.as_ref().unwrap();
        assert_eq!(popup.title, "Point");
        assert_eq!(popup.content, "0.00000, 0.00000");
        let labels: Vec<&str> = popup.actions.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["Zoom to", "Edit", "Remove"]);
        assert!(popup.actions[2].requires_confirmation);
    }
}
