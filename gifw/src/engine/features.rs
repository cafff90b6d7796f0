use std::sync::Arc;

use chrono::Utc;
use gifw_types::cartesian::Rect;
use gifw_types::geometry::Geom;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::alert::{Alert, AlertKind, Severity};
use crate::async_runtime;
use crate::auth::TOKEN_REFRESH_INTERVAL;
use crate::bookmark::{self, Bookmark, BookmarkClient};
use crate::broadcast;
use crate::engine::layers::{LayerOptions, DEFAULT_FIT_MAX_ZOOM, FIT_DURATION};
use crate::engine::MapEngine;
use crate::error::GifwError;
use crate::event_bus::{DeferredTask, MapEvent};
use crate::export::{
    export_features, ExportFormat, ExportedFile, PrintConfiguration, PrintContext, PrintOutput,
    PrintRequest, PrintTask,
};
use crate::interaction::query::{run_queries, QueryBatch};
use crate::interaction::InteractionMode;
use crate::layer::{Feature, LegendOptions, SystemLayer};
use crate::platform::HttpService;
use crate::popup::{ActionRequest, PopupCommand};
use crate::search::{
    self, SearchDefinition, SearchResult, SearchResultCategory, SearchTarget, SearchTask,
};
use crate::upload::{read_uploads, UploadFile};
use crate::web_layer_service::{ServiceLayer, WebLayerServiceClient, WebLayerServiceDefinition};

/// Zoom level a point search result is shown at if the result gives none.
pub const DEFAULT_RESULT_ZOOM: f64 = 16.0;
/// Zoom level `ZoomToFeature` zooms in to at most.
const FEATURE_MAX_ZOOM: f64 = 18.0;

impl MapEngine {
    /// Chooses the action of the open popup. Returns the confirmation question if the action
    /// must be confirmed through [`MapEngine::confirm_popup_action`] first.
    pub fn choose_popup_action(&mut self, index: usize) -> Result<Option<String>, GifwError> {
        match self.session.popup.request_action(index) {
            None => Err(GifwError::NotFound(format!("popup action {index}"))),
            Some(ActionRequest::NeedsConfirmation(question)) => Ok(Some(question)),
            Some(ActionRequest::Execute {
                command,
                closes_popup,
            }) => self.execute_popup_command(command, closes_popup).map(|_| None),
        }
    }

    /// Runs the action waiting for confirmation.
    pub fn confirm_popup_action(&mut self) -> Result<(), GifwError> {
        match self.session.popup.confirm() {
            Some(ActionRequest::Execute {
                command,
                closes_popup,
            }) => self.execute_popup_command(command, closes_popup),
            _ => Err(GifwError::NotFound("action awaiting confirmation".into())),
        }
    }

    /// Drops the action waiting for confirmation.
    pub fn cancel_popup_action(&mut self) {
        self.session.popup.cancel_confirmation();
    }

    fn execute_popup_command(
        &mut self,
        command: PopupCommand,
        closes_popup: bool,
    ) -> Result<(), GifwError> {
        debug!("Running popup command {command:?}");
        if closes_popup {
            self.session.popup.close();
        }

        match command {
            PopupCommand::RemoveFeature {
                layer_id,
                feature_id,
            } => self.session.bus.defer(DeferredTask::RemoveFeature {
                layer_id,
                feature_id,
            }),
            PopupCommand::RemoveAllFeatures { layer_id } => {
                let store = self
                    .session
                    .map
                    .layer_mut(&layer_id)
                    .and_then(|layer| layer.features_mut())
                    .ok_or_else(|| GifwError::NotFound(format!("vector layer {layer_id}")))?;
                store.clear();
                debug!("Removed all features of {layer_id}");
            }
            PopupCommand::ZoomToFeature {
                layer_id,
                feature_id,
            } => {
                let extent = self
                    .session
                    .map
                    .layer(&layer_id)
                    .and_then(|layer| layer.features())
                    .and_then(|store| store.get(feature_id))
                    .and_then(|feature| feature.geometry().extent())
                    .ok_or_else(|| GifwError::NotFound(format!("feature {feature_id}")))?;
                self.zoom_to_extent(&extent, FEATURE_MAX_ZOOM)?;
            }
            PopupCommand::EditFeature {
                layer_id,
                feature_id,
            } => {
                self.activate_mode(InteractionMode::Modifying)?;
                self.session.bus.publish(MapEvent::FeatureSelected {
                    layer_id,
                    feature_id,
                    synthetic: false,
                });
            }
        }

        self.process_events();
        Ok(())
    }

    /// Sends the GetFeatureInfo requests of the last point query and shows all results in one
    /// popup once every request has finished.
    pub async fn run_pending_queries(&mut self, http: &dyn HttpService) {
        let Some(QueryBatch {
            anchor,
            mut results,
            requests,
        }) = self.session.pending_query.take()
        else {
            return;
        };

        let (remote, failures) = run_queries(requests, http).await;
        results.extend(remote);
        self.controllers
            .query
            .show_results(anchor, results, failures, &mut self.session);
        self.process_events();
    }

    /// Prepares the search of `query` with the configured search definitions.
    pub fn start_search(&mut self, query: &str) -> Result<SearchTask, GifwError> {
        let definitions = self.config.search_definitions.clone();
        self.start_search_with(query, &definitions)
    }

    /// Prepares the search of `query` and locks the map until [`MapEngine::finish_search`] is
    /// called with the id of the returned task. A search still running is aborted.
    pub fn start_search_with(
        &mut self,
        query: &str,
        definitions: &[SearchDefinition],
    ) -> Result<SearchTask, GifwError> {
        let Some(endpoint) = self.config.endpoints.search.clone() else {
            self.session.push_alert(Alert::feature_unavailable("Search"));
            return Err(GifwError::Configuration("no search endpoint".into()));
        };

        let task = search::search_task(&endpoint, query, definitions, &self.session.auth)?;
        self.cancel_search();
        self.search_generation += 1;
        let task = task.with_id(self.search_generation);
        self.running_search = Some((task.id(), task.abort_handle()));
        self.session.map_locked_by_search = true;
        debug!("Searching for {query:?} (search {})", task.id());
        Ok(task)
    }

    /// Unlocks the map after the search `id`. Errors are turned into alerts, an aborted search is
    /// silently dropped.
    ///
    /// Results of a search that is no longer the running one are ignored, so a superseded search
    /// finishing late neither unlocks the map nor shows alerts.
    pub fn finish_search(
        &mut self,
        id: u64,
        result: Result<Vec<SearchResultCategory>, GifwError>,
    ) -> Option<Vec<SearchResultCategory>> {
        match &self.running_search {
            Some((running, _)) if *running == id => {}
            _ => {
                debug!("Ignoring the result of superseded search {id}");
                return None;
            }
        }

        self.running_search = None;
        self.session.map_locked_by_search = false;

        match result {
            Ok(categories) => Some(categories),
            Err(GifwError::Aborted) => {
                debug!("Search was aborted");
                None
            }
            Err(GifwError::Timeout) => {
                warn!("Search timed out");
                self.session.push_alert(Alert::toast(
                    Severity::Warning,
                    "The search took too long. Try a more specific search.",
                ));
                None
            }
            Err(err) => {
                warn!("Search failed: {err}");
                self.session.push_alert(Alert::generic_error());
                None
            }
        }
    }

    /// Runs the search of `query` to completion.
    pub async fn search(
        &mut self,
        query: &str,
        http: &dyn HttpService,
    ) -> Result<Option<Vec<SearchResultCategory>>, GifwError> {
        let task = self.start_search(query)?;
        let id = task.id();
        let result = task.run(http).await;
        Ok(self.finish_search(id, result))
    }

    /// Aborts the running search.
    pub fn cancel_search(&mut self) {
        if let Some((id, handle)) = self.running_search.take() {
            debug!("Cancelling search {id}");
            handle.abort();
            self.session.map_locked_by_search = false;
        }
    }

    /// Moves the map to the search result and pins it.
    pub fn apply_search_result(&mut self, result: &SearchResult) -> Result<(), GifwError> {
        let crs = self.session.map.view().crs().clone();
        match result.target(&crs)? {
            Some(SearchTarget::Point(position)) => {
                if !self.is_extent_available_in_current_map(&Rect::from_point(&position))? {
                    self.session.push_alert(Alert::extent_unavailable());
                    return Err(GifwError::ExtentUnavailable);
                }

                self.session.map.stop_animation();
                let target = self
                    .session
                    .map
                    .view()
                    .with_center(position)
                    .with_zoom(result.zoom.unwrap_or(DEFAULT_RESULT_ZOOM));
                self.session.animate_view(target, FIT_DURATION);
                self.session.request_permalink_update();
            }
            Some(SearchTarget::Extent(extent)) => {
                self.zoom_to_extent(&extent, DEFAULT_FIT_MAX_ZOOM)?;
            }
            None => return Err(GifwError::NotFound(format!("location of {}", result.title))),
        }

        if let Some(pin) = result.pin() {
            self.place_search_pin(pin)?;
        }
        self.process_events();
        Ok(())
    }

    /// Client of the bookmark collection. Shows an alert if the version has no bookmarks.
    pub fn bookmark_client(&mut self) -> Result<BookmarkClient, GifwError> {
        match &self.config.endpoints.bookmarks {
            Some(endpoint) => Ok(BookmarkClient::new(endpoint, self.session.auth.clone())),
            None => {
                self.session.push_alert(Alert::feature_unavailable("Bookmarks"));
                Err(GifwError::Configuration("no bookmark endpoint".into()))
            }
        }
    }

    /// Bookmark of the current view named `name`, checked against the existing bookmarks.
    pub fn bookmark_current_view(
        &self,
        name: &str,
        existing: &[Bookmark],
    ) -> Result<Bookmark, GifwError> {
        let issues = bookmark::validate_name(name, existing);
        if !issues.is_empty() {
            return Err(GifwError::Validation(issues));
        }

        let view = self.session.map.view();
        let extent = view
            .extent()
            .ok_or_else(|| GifwError::Generic("map has no size".into()))?;
        Ok(Bookmark::new(name.trim(), &extent, view.crs()))
    }

    /// Fits the map to the bookmark.
    pub fn zoom_to_bookmark(&mut self, bookmark: &Bookmark) -> Result<(), GifwError> {
        let extent = bookmark.extent(self.session.map.view().crs())?;
        self.zoom_to_extent(&extent, DEFAULT_FIT_MAX_ZOOM)
    }

    /// Adds the uploaded files as layers, fits the map to them and reports the files that
    /// could not be read. Returns the ids of the new layers.
    pub fn add_uploads(&mut self, files: &[UploadFile]) -> Vec<String> {
        let report = read_uploads(files, self.session.map.view().crs());
        let extent = report.extent();
        let alert = report.summary_alert();

        let mut ids = vec![];
        for layer in report.layers {
            let added =
                self.add_native_layer_to_map(layer.features, &layer.layer_name, LayerOptions::default());
            match added {
                Ok(id) => ids.push(id),
                Err(err) => warn!("Cannot add layer of {}: {err}", layer.file_name),
            }
        }

        if let Some(extent) = extent.filter(|_| !ids.is_empty()) {
            if let Err(err) = self.zoom_to_extent(&extent, DEFAULT_FIT_MAX_ZOOM) {
                debug!("Not zooming to the uploads: {err}");
            }
        }
        if let Some(alert) = alert {
            self.session.push_alert(alert);
        }

        info!("Added {} of {} uploaded files", ids.len(), files.len());
        ids
    }

    /// Client of the web layer service definitions. Shows an alert if the version offers none.
    pub fn web_layer_service_client(&mut self) -> Result<WebLayerServiceClient, GifwError> {
        match &self.config.endpoints.web_layer_services {
            Some(endpoint) => Ok(WebLayerServiceClient::new(
                endpoint,
                self.config.endpoints.proxy.clone(),
                self.session.auth.clone(),
            )),
            None => {
                self.session
                    .push_alert(Alert::feature_unavailable("Web layer services"));
                Err(GifwError::Configuration("no web layer service endpoint".into()))
            }
        }
    }

    /// Adds the layer of the service as a WMS layer. Returns the id of the new layer.
    pub fn add_service_layer(
        &mut self,
        service: &WebLayerServiceDefinition,
        layer: &ServiceLayer,
    ) -> Result<String, GifwError> {
        let extent = layer.extent(self.session.map.view().crs())?;
        let options = LayerOptions::default()
            .with_queryable(layer.queryable)
            .with_extent(extent)
            .with_attribution(service.attribution.clone())
            .with_proxy(service.proxy_meta_requests, service.proxy_map_requests);
        self.add_web_layer_to_map(layer.to_source(service), layer.display_name(), options)
    }

    /// Fetches a new access token. Does nothing if the version has no token endpoint.
    pub async fn refresh_token(&self, http: &dyn HttpService) -> Result<(), GifwError> {
        match &self.config.endpoints.token {
            Some(url) => self.session.auth.refresh(http, url).await,
            None => Ok(()),
        }
    }

    /// Starts refreshing the access token every [`TOKEN_REFRESH_INTERVAL`] on the tokio runtime.
    /// `None` if the version has no token endpoint.
    pub fn start_token_refresh(&self, http: Arc<dyn HttpService>) -> Option<JoinHandle<()>> {
        let url = self.config.endpoints.token.clone()?;
        let auth = self.session.auth.clone();
        debug!("Refreshing the access token from {url}");
        Some(async_runtime::spawn(auth.refresh_loop(
            http,
            url,
            TOKEN_REFRESH_INTERVAL,
        )))
    }

    /// Shows a message received on the broadcast channel if it is meant for this version.
    pub fn receive_broadcast(&mut self, payload: &str) {
        match broadcast::receive(payload, &self.config.slug) {
            Ok(Some(alert)) => self.session.push_alert(alert),
            Ok(None) => {}
            Err(err) => warn!("Invalid broadcast message: {err}"),
        }
    }

    /// Exports the features of the system layer.
    pub fn export_user_features(
        &self,
        layer: SystemLayer,
        format: ExportFormat,
    ) -> Result<ExportedFile, GifwError> {
        let store = self
            .session
            .system_features(layer)
            .ok_or_else(|| GifwError::NotFound(format!("layer {}", layer.id())))?;
        export_features(
            store.iter(),
            self.session.map.view().crs(),
            format,
            layer.name(),
            Utc::now(),
        )
    }

    /// Exports the recorded geolocation track as a line.
    pub fn export_track(&self, format: ExportFormat) -> Result<ExportedFile, GifwError> {
        let track = self.controllers.geolocation.track();
        if track.len() < 2 {
            return Err(GifwError::Generic(
                "the track has fewer than two positions".into(),
            ));
        }

        let feature = Feature::new(Geom::LineString(track.to_vec())).with_property("name", "Track");
        export_features(
            [&feature],
            self.session.map.view().crs(),
            format,
            "Track",
            Utc::now(),
        )
    }

    /// Loads the print configuration. Shows an alert if it cannot be loaded.
    pub async fn fetch_print_configuration(
        &mut self,
        http: &dyn HttpService,
    ) -> Result<PrintConfiguration, GifwError> {
        let result = match &self.config.endpoints.print_config {
            Some(endpoint) => PrintConfiguration::fetch(http, endpoint, &self.session.auth).await,
            None => Err(GifwError::Configuration("no print endpoint".into())),
        };

        if let Err(err) = &result {
            warn!("Print configuration is unavailable: {err}");
            self.session.push_alert(Alert::feature_unavailable("Print"));
        }
        result
    }

    /// Prepares the print of the current map with the legends of the visible overlays.
    pub fn prepare_print(
        &self,
        request: PrintRequest,
        config: PrintConfiguration,
    ) -> Result<PrintTask, GifwError> {
        let legends = if request.include_legend {
            self.legend_urls(&LegendOptions::default()).legends
        } else {
            vec![]
        };
        PrintTask::new(request, config, legends)
    }

    /// Prints the map. The view is restored afterwards. Failures are shown as alerts, an
    /// aborted print is dropped silently.
    pub async fn print(
        &mut self,
        task: PrintTask,
        ctx: PrintContext<'_>,
    ) -> Result<PrintOutput, GifwError> {
        let result = task.run(&mut self.session, ctx).await;
        match &result {
            Ok(_) | Err(GifwError::Aborted) => {}
            Err(GifwError::Timeout) => self.session.push_alert(Alert::new(
                AlertKind::Popup,
                Severity::Warning,
                "Print timed out",
                "Your print took too long to complete. Try a smaller paper size or a lower \
                 resolution.",
            )),
            Err(_) => self.session.push_alert(Alert::generic_error()),
        }

        self.process_events();
        result
    }
}
