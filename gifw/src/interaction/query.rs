//! Querying the features of the map layers.

use futures::future::{join_all, AbortHandle};
use geo::Intersects;
use gifw_types::cartesian::{Point2d, Rect};
use gifw_types::geometry::{Geom, GeometryType, Polygon};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

use crate::alert::{Alert, Severity};
use crate::control::{EventPropagation, Key, Modifiers, MouseButton, UserEvent, UserEventHandler};
use crate::engine::{Cursor, Session};
use crate::error::GifwError;
use crate::interaction::annotate::pick_feature;
use crate::interaction::{
    begin_activation, end_activation, Draw, DrawOutcome, InteractionMode, ModeController, ModeKind,
};
use crate::layer::Layer;
use crate::platform::{send_checked, HttpRequest, HttpService};
use crate::popup::PopupOptions;

/// Format requested from WMS GetFeatureInfo.
pub const INFO_FORMAT: &str = "application/json";
/// Maximum number of features returned by one GetFeatureInfo request.
pub const FEATURE_COUNT: u32 = 10;
/// Distance in pixels around the click within which vector features are found.
pub const QUERY_TOLERANCE_PX: f64 = 6.0;

/// Shape drawn to query the features inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryShape {
    /// Rectangle drawn by dragging.
    Box,
    /// Polygon drawn vertex by vertex.
    Polygon,
}

/// Features of one layer found by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Id of the layer.
    pub layer_id: String,
    /// Name of the layer shown to the user.
    pub layer_name: String,
    /// Properties of the found features.
    pub features: Vec<JsonMap<String, Value>>,
}

/// GetFeatureInfo request waiting to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuery {
    /// Id of the queried layer.
    pub layer_id: String,
    /// Name of the queried layer.
    pub layer_name: String,
    /// Request with auth headers applied.
    pub request: HttpRequest,
}

/// Results of a point query collected so far and the requests still to run.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBatch {
    /// Point the results popup is anchored to.
    pub anchor: Point2d,
    /// Results of the client-side layers.
    pub results: Vec<QueryResult>,
    /// Requests to the WMS layers.
    pub requests: Vec<PendingQuery>,
}

/// Sends all requests and waits for every one of them. Returns the non-empty results and the
/// number of failed requests.
pub async fn run_queries(
    requests: Vec<PendingQuery>,
    http: &dyn HttpService,
) -> (Vec<QueryResult>, usize) {
    let responses = join_all(requests.into_iter().map(|query| async move {
        let result = send_checked(http, query.request)
            .await
            .and_then(|response| response.text())
            .and_then(|text| feature_properties(&text));
        (query.layer_id, query.layer_name, result)
    }))
    .await;

    let mut results = vec![];
    let mut failures = 0;
    for (layer_id, layer_name, result) in responses {
        match result {
            Ok(features) if features.is_empty() => {}
            Ok(features) => results.push(QueryResult {
                layer_id,
                layer_name,
                features,
            }),
            Err(err) => {
                warn!("Query of layer {layer_id} failed: {err}");
                failures += 1;
            }
        }
    }

    (results, failures)
}

fn feature_properties(document: &str) -> Result<Vec<JsonMap<String, Value>>, GifwError> {
    let geojson: geojson::GeoJson = document
        .parse()
        .map_err(|err: geojson::Error| GifwError::Decoding(err.to_string()))?;

    Ok(match geojson {
        geojson::GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .map(|f| f.properties.unwrap_or_default())
            .collect(),
        geojson::GeoJson::Feature(feature) => vec![feature.properties.unwrap_or_default()],
        geojson::GeoJson::Geometry(_) => vec![],
    })
}

/// Html body of the results popup.
pub fn format_results(results: &[QueryResult], failures: usize) -> String {
    let mut content = String::new();
    for result in results {
        content.push_str(&format!("<h5>{}</h5>", result.layer_name));
        for properties in &result.features {
            content.push_str("<table>");
            for (key, value) in properties {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                content.push_str(&format!("<tr><th>{key}</th><td>{value}</td></tr>"));
            }
            content.push_str("</table>");
        }
    }

    if failures > 0 {
        let layers = if failures == 1 { "layer" } else { "layers" };
        content.push_str(&format!("<p>{failures} {layers} could not be queried</p>"));
    }

    content
}

/// Controller of the feature query mode.
///
/// While no mode is active the controller answers clicks with a point query. In
/// [`InteractionMode::QueryingFeatures`] it queries the client-side features inside a drawn box or
/// polygon.
#[derive(Debug, Default)]
pub struct FeatureQueryController {
    active: bool,
    shape: Option<QueryShape>,
    draw: Option<Draw>,
    box_corners: Option<(Point2d, Point2d)>,
    keyboard: Option<AbortHandle>,
    last_results: Vec<QueryResult>,
}

impl FeatureQueryController {
    /// Shape drawn in the active mode.
    pub fn shape(&self) -> Option<QueryShape> {
        self.shape
    }

    /// Results shown in the last results popup.
    pub fn last_results(&self) -> &[QueryResult] {
        &self.last_results
    }

    /// Box or polygon being drawn.
    pub fn sketch(&self) -> Option<Geom> {
        if let Some((start, end)) = self.box_corners {
            return Some(box_polygon(start, end));
        }
        self.draw.as_ref().and_then(Draw::sketch)
    }

    /// Queries the layers at the map point.
    ///
    /// A feature with its own popup, such as an annotation, opens that popup. Otherwise the
    /// client-side results are collected and GetFeatureInfo requests are prepared for the WMS
    /// layers. The results popup opens right away if there is nothing to request.
    pub fn query_point(&mut self, point: Point2d, session: &mut Session) {
        let view = session.map().view().clone();
        let resolution = view.resolution();
        let proxy = session.proxy_url().map(str::to_string);

        let mut layers: Vec<&Layer> = session
            .map()
            .layers()
            .filter(|(layer, visible)| {
                *visible && layer.is_queryable() && layer.is_in_zoom_range(view.zoom())
            })
            .map(|(layer, _)| layer)
            .collect();
        layers.reverse();

        let own_popup = layers.iter().find_map(|layer| {
            let store = layer.features()?;
            let pick = pick_feature(store, &point, resolution)?;
            let feature = store.get(pick.feature_id)?;
            let popup = feature.meta().popup.clone()?;
            Some((popup, feature.anchor().unwrap_or(point)))
        });
        if let Some((popup, anchor)) = own_popup {
            session.popup_mut().open(popup, anchor);
            return;
        }

        let mut batch = QueryBatch {
            anchor: point,
            results: vec![],
            requests: vec![],
        };
        for layer in layers {
            if let Some(store) = layer.features() {
                let features: Vec<_> = store
                    .features_at(&point, QUERY_TOLERANCE_PX * resolution, false)
                    .into_iter()
                    .filter(|f| f.meta().popup.is_none())
                    .map(|f| f.properties().clone())
                    .collect();
                if !features.is_empty() {
                    batch.results.push(QueryResult {
                        layer_id: layer.id().to_string(),
                        layer_name: layer.name().to_string(),
                        features,
                    });
                }
            } else if let Some(wms) = layer.source().wms() {
                match wms.feature_info_url(&view, &point, INFO_FORMAT, FEATURE_COUNT, proxy.as_deref())
                {
                    Ok(url) => batch.requests.push(PendingQuery {
                        layer_id: layer.id().to_string(),
                        layer_name: layer.name().to_string(),
                        request: session.auth().authorize(HttpRequest::get(url)),
                    }),
                    Err(err) => warn!("Cannot query layer {}: {err}", layer.id()),
                }
            }
        }

        if batch.requests.is_empty() {
            self.show_results(batch.anchor, batch.results, 0, session);
        } else {
            debug!("Prepared {} feature info requests", batch.requests.len());
            session.pending_query = Some(batch);
        }
    }

    /// Queries the client-side features intersecting the shape.
    pub fn query_shape(&mut self, shape: &Geom, session: &mut Session) {
        let Some(anchor) = shape.centroid() else {
            return;
        };
        let zoom = session.map().view().zoom();
        let shape_geo = shape.to_geo();

        let mut results = vec![];
        for (layer, visible) in session.map().layers() {
            if !visible || !layer.is_queryable() || !layer.is_in_zoom_range(zoom) {
                continue;
            }
            let Some(store) = layer.features() else {
                debug!("Skipping layer {} in shape query", layer.id());
                continue;
            };

            let features: Vec<_> = store
                .iter_visible()
                .filter(|f| f.meta().popup.is_none())
                .filter(|f| shape_geo.intersects(&f.geometry().to_geo()))
                .map(|f| f.properties().clone())
                .collect();
            if !features.is_empty() {
                results.push(QueryResult {
                    layer_id: layer.id().to_string(),
                    layer_name: layer.name().to_string(),
                    features,
                });
            }
        }

        self.show_results(anchor, results, 0, session);
    }

    /// Opens the results popup, or a notice if nothing was found.
    pub fn show_results(
        &mut self,
        anchor: Point2d,
        results: Vec<QueryResult>,
        failures: usize,
        session: &mut Session,
    ) {
        if results.is_empty() && failures == 0 {
            self.last_results.clear();
            session.popup_mut().close();
            session.push_alert(Alert::toast(Severity::Info, "No features found"));
            return;
        }

        let content = format_results(&results, failures);
        session
            .popup_mut()
            .open(PopupOptions::new("Query results", content), anchor);
        self.last_results = results;
    }

    fn handle_box(&mut self, event: &UserEvent, session: &mut Session) -> EventPropagation {
        match event {
            UserEvent::DragStarted(MouseButton::Left, e) => {
                self.box_corners = Some((e.map_pointer_position, e.map_pointer_position));
                EventPropagation::Consume
            }
            UserEvent::Drag(_, _, e) => match &mut self.box_corners {
                Some((_, end)) => {
                    *end = e.map_pointer_position;
                    EventPropagation::Stop
                }
                None => EventPropagation::Propagate,
            },
            UserEvent::DragEnded(_, _) => match self.box_corners.take() {
                Some((start, end)) => {
                    self.query_shape(&box_polygon(start, end), session);
                    EventPropagation::Stop
                }
                None => EventPropagation::Propagate,
            },
            UserEvent::Click(MouseButton::Left, e) => {
                self.query_point(e.map_pointer_position, session);
                EventPropagation::Stop
            }
            _ => EventPropagation::Propagate,
        }
    }
}

fn box_polygon(start: Point2d, end: Point2d) -> Geom {
    let rect = Rect::new(
        start.x.min(end.x),
        start.y.min(end.y),
        start.x.max(end.x),
        start.y.max(end.y),
    );
    Geom::Polygon(Polygon::new(rect.into_quadrangle().to_vec(), vec![]))
}

impl UserEventHandler for FeatureQueryController {
    fn handle(&mut self, event: &UserEvent, session: &mut Session) -> EventPropagation {
        if !self.active {
            if let UserEvent::Click(MouseButton::Left, e) = event {
                self.query_point(e.map_pointer_position, session);
            }
            return EventPropagation::Propagate;
        }

        if let Some(draw) = &mut self.draw {
            let (outcome, propagation) = draw.handle(event, |p| p);
            if let DrawOutcome::Finished(shape) = outcome {
                self.query_shape(&shape, session);
            }
            return propagation;
        }

        self.handle_box(event, session)
    }
}

impl ModeController for FeatureQueryController {
    fn kind(&self) -> ModeKind {
        ModeKind::FeatureQuery
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn activate(&mut self, mode: &InteractionMode, session: &mut Session) -> Result<(), GifwError> {
        let InteractionMode::QueryingFeatures(shape) = mode else {
            return Err(GifwError::Generic(format!(
                "feature query controller cannot run {mode:?}"
            )));
        };

        if !self.active {
            self.keyboard = Some(begin_activation(
                session,
                ModeKind::FeatureQuery,
                None,
                Cursor::Crosshair,
            ));
            self.active = true;
        }

        self.shape = Some(*shape);
        self.box_corners = None;
        self.draw = match shape {
            QueryShape::Box => None,
            QueryShape::Polygon => Some(Draw::new(GeometryType::Polygon)),
        };
        session.ui_mut().active_button = Some(match shape {
            QueryShape::Box => "query-box".to_string(),
            QueryShape::Polygon => "query-polygon".to_string(),
        });

        Ok(())
    }

    fn deactivate(&mut self, session: &mut Session) {
        self.active = false;
        self.shape = None;
        self.draw = None;
        self.box_corners = None;
        end_activation(session, self.keyboard.take());
    }

    fn on_key(&mut self, key: Key, _modifiers: Modifiers, _session: &mut Session) -> bool {
        if key != Key::Escape {
            return false;
        }
        if self.box_corners.take().is_some() {
            return true;
        }
        self.draw
            .as_mut()
            .is_some_and(|draw| draw.abort() == DrawOutcome::Aborted)
    }
}
