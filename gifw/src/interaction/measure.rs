//! Measuring lengths and areas on the ellipsoid.

use std::sync::Arc;

use futures::future::AbortHandle;
use gifw_types::geo::Crs;
use gifw_types::geodesic::{geodesic_area, geodesic_length};
use gifw_types::geometry::{Geom, GeometryType};
use gifw_types::units::UnitSystem;
use log::{debug, warn};

use crate::color::Color;
use crate::control::{EventPropagation, Key, Modifiers, UserEvent, UserEventHandler};
use crate::engine::{Cursor, Session};
use crate::error::{GifwError, ValidationIssue};
use crate::event_bus::MapEvent;
use crate::interaction::modify::VERTEX_TOLERANCE_PX;
use crate::interaction::{
    begin_activation, end_activation, is_undo, snap_to_vertex, Draw, DrawOutcome, InteractionMode,
    ModeController, ModeKind,
};
use crate::layer::{Feature, FeatureMeta, FeatureStyle, SystemLayer, MEASUREMENTS_LAYER_ID};
use crate::popup::{PopupAction, PopupCommand, PopupOptions};

/// Geodesic size of a geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// Length of a line in metres.
    Length(f64),
    /// Area and perimeter of a polygon in square metres and metres.
    Area {
        /// Enclosed area.
        area: f64,
        /// Length of the outline.
        perimeter: f64,
    },
}

impl Measurement {
    /// Formats the measurement in the unit system.
    pub fn format(&self, units: UnitSystem) -> String {
        match self {
            Measurement::Length(length) => format!("Length: {}", units.format_length(*length)),
            Measurement::Area { area, perimeter } => format!(
                "Area: {}, Perimeter: {}",
                units.format_area(*area),
                units.format_length(*perimeter)
            ),
        }
    }
}

/// Measures the geometry given in `crs` on the WGS84 ellipsoid. Points have no measurement.
pub fn measure(geometry: &Geom, crs: &Crs) -> Result<Option<Measurement>, GifwError> {
    let to_geo = |points: &[gifw_types::cartesian::Point2d]| {
        points
            .iter()
            .map(|p| crs.unproject(p))
            .collect::<Result<Vec<_>, _>>()
    };

    Ok(match geometry {
        Geom::Point(_) | Geom::MultiPoint(_) => None,
        Geom::LineString(_) | Geom::MultiLineString(_) => {
            let mut length = 0.0;
            for line in geometry.lines() {
                length += geodesic_length(&to_geo(line)?);
            }
            Some(Measurement::Length(length))
        }
        Geom::Polygon(_) | Geom::MultiPolygon(_) => {
            let (mut area, mut perimeter) = (0.0, 0.0);
            for polygon in geometry.polygons() {
                let ring = to_geo(polygon.exterior())?;
                area += geodesic_area(&ring);
                perimeter += geodesic_length(&ring);
            }
            Some(Measurement::Area { area, perimeter })
        }
    })
}

/// Controller of the measure mode.
///
/// Every finished line or polygon is added to the measurements layer labelled with its geodesic
/// length or area in the preferred units. The mode stays active for the next measurement.
#[derive(Debug, Default)]
pub struct MeasureController {
    active: bool,
    draw: Option<Draw>,
    keyboard: Option<AbortHandle>,
}

impl MeasureController {
    /// Type of the measured geometry while active.
    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.draw.as_ref().map(Draw::geometry_type)
    }

    /// Measurement of the geometry being drawn, ending at the pointer.
    pub fn live_measurement(&self, session: &Session) -> Option<String> {
        let sketch = self.draw.as_ref()?.sketch()?;
        let measurement = measure(&sketch, session.map().view().crs()).ok()??;
        Some(measurement.format(session.settings().preferred_units()))
    }

    fn finish(&mut self, geometry: Geom, session: &mut Session) {
        let crs = session.map().view().crs().clone();
        let units = session.settings().preferred_units();
        let measurement = match measure(&geometry, &crs) {
            Ok(Some(measurement)) => measurement,
            Ok(None) => return,
            Err(err) => {
                warn!("Failed to measure geometry: {err}");
                return;
            }
        };

        let text = measurement.format(units);
        let style = FeatureStyle {
            fill: Color::WHITE.with_opacity(30),
            label: Some(text.clone()),
            ..Default::default()
        };
        let mut feature = Feature::new(geometry).with_style(Arc::new(style));
        let feature_id = feature.id();
        let layer_id = MEASUREMENTS_LAYER_ID.to_string();
        let popup = PopupOptions::new("Measurement", text)
            .with_action(
                PopupAction::new(
                    "Remove",
                    PopupCommand::RemoveFeature {
                        layer_id: layer_id.clone(),
                        feature_id,
                    },
                )
                .with_closes_popup(true),
            )
            .with_action(
                PopupAction::new(
                    "Remove all measurements",
                    PopupCommand::RemoveAllFeatures {
                        layer_id: layer_id.clone(),
                    },
                )
                .with_closes_popup(true)
                .with_confirmation(true),
            );
        *feature.meta_mut() = FeatureMeta {
            popup: Some(popup),
            tool: Some("measure".to_string()),
            buffer: None,
        };

        let Some(store) = session.system_features_mut(SystemLayer::Measurements) else {
            return;
        };
        store.add(feature);
        debug!("Added measurement {feature_id}");
        session.bus_mut().publish(MapEvent::DrawEnd {
            layer_id,
            feature_id,
        });
    }
}

impl UserEventHandler for MeasureController {
    fn handle(&mut self, event: &UserEvent, session: &mut Session) -> EventPropagation {
        let Some(draw) = self.draw.as_mut() else {
            return EventPropagation::Propagate;
        };

        let tolerance = VERTEX_TOLERANCE_PX * session.map().view().resolution();
        let store = session.system_features(SystemLayer::Measurements);
        let (outcome, propagation) = draw.handle(event, |point| {
            store
                .and_then(|store| snap_to_vertex(store, &point, tolerance))
                .unwrap_or(point)
        });

        if let DrawOutcome::Finished(geometry) = outcome {
            self.finish(geometry, session);
        }

        propagation
    }
}

impl ModeController for MeasureController {
    fn kind(&self) -> ModeKind {
        ModeKind::Measure
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn activate(&mut self, mode: &InteractionMode, session: &mut Session) -> Result<(), GifwError> {
        let geometry_type = match mode {
            InteractionMode::Measuring(
                geometry_type @ (GeometryType::LineString | GeometryType::Polygon),
            ) => *geometry_type,
            InteractionMode::Measuring(other) => {
                return Err(GifwError::Validation(vec![ValidationIssue::new(
                    "geometryType",
                    format!("{other:?} cannot be measured"),
                )]))
            }
            other => {
                return Err(GifwError::Generic(format!(
                    "measure controller cannot run {other:?}"
                )))
            }
        };

        if !self.active {
            self.keyboard = Some(begin_activation(
                session,
                ModeKind::Measure,
                Some(SystemLayer::Measurements),
                Cursor::Crosshair,
            ));
            self.active = true;
        }

        self.draw = Some(Draw::new(geometry_type));
        session.ui_mut().active_button = Some(match geometry_type {
            GeometryType::Polygon => "measure-area".to_string(),
            _ => "measure-line".to_string(),
        });

        debug!("Measure controller activated with {geometry_type:?}");
        Ok(())
    }

    fn deactivate(&mut self, session: &mut Session) {
        self.draw = None;
        self.active = false;
        end_activation(session, self.keyboard.take());
    }

    fn on_key(&mut self, key: Key, modifiers: Modifiers, _session: &mut Session) -> bool {
        let Some(draw) = self.draw.as_mut() else {
            return false;
        };

        if key == Key::Escape {
            draw.abort() == DrawOutcome::Aborted
        } else if is_undo(key, modifiers) {
            draw.remove_last_point()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use assert_matches::assert_matches;
    use gifw_types::cartesian::Point2d;
    use gifw_types::geo::GeoPoint2d;
    use gifw_types::geometry::Polygon;

    use super::*;

    #[test]
    fn measures_line_on_ellipsoid() {
        let crs = Crs::EPSG4326;
        let line = Geom::LineString(vec![
            crs.project(&GeoPoint2d::latlon(0.0, 0.0)).unwrap(),
            crs.project(&GeoPoint2d::latlon(0.0, 1.0)).unwrap(),
        ]);

        let Some(Measurement::Length(length)) = measure(&line, &crs).unwrap() else {
            panic!("not a length");
        };
        assert_relative_eq!(length, 111_319.49, max_relative = 0.001);
    }

    #[test]
    fn measures_polygon_area_and_perimeter() {
        let crs = Crs::EPSG4326;
        let square = Geom::Polygon(Polygon::new(
            [(0.0, 0.0), (0.0, 0.01), (0.01, 0.01), (0.01, 0.0)]
                .iter()
                .map(|(lat, lon)| crs.project(&GeoPoint2d::latlon(*lat, *lon)).unwrap())
                .collect(),
            vec![],
        ));

        assert_matches!(
            measure(&square, &crs).unwrap(),
            Some(Measurement::Area { area, perimeter })
                if (area - 1_230_900.0).abs() < 2_000.0 && (perimeter - 4_437.9).abs() < 5.0
        );
        assert_eq!(measure(&Geom::Point(Point2d::origin()), &crs).unwrap(), None);
    }

    #[test]
    fn multi_line_length_is_summed() {
        let crs = Crs::EPSG4326;
        let degree = |lat: f64| {
            vec![
                crs.project(&GeoPoint2d::latlon(lat, 0.0)).unwrap(),
                crs.project(&GeoPoint2d::latlon(lat, 1.0)).unwrap(),
            ]
        };
        let lines = Geom::MultiLineString(vec![degree(0.0), degree(0.0)]);

        let Some(Measurement::Length(length)) = measure(&lines, &crs).unwrap() else {
            panic!("not a length");
        };
        assert_relative_eq!(length, 2.0 * 111_319.49, max_relative = 0.001);
    }

    #[test]
    fn formats_in_preferred_units() {
        assert_eq!(
            Measurement::Length(1500.0).format(UnitSystem::Metric),
            "Length: 1.50 km"
        );
    }
}
