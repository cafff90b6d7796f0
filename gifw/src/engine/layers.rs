use std::sync::Arc;
use std::time::Duration;

use gifw_types::cartesian::{Point2d, Rect};
use gifw_types::geo::{Crs, GeoPoint2d};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::alert::Alert;
use crate::engine::legend::{legend_urls, LegendUrls};
use crate::engine::{
    MapEngine, BASEMAP_GROUP_NAME, OVERLAY_GROUP_NAME, SYSTEM_GROUP_NAME, USER_CATEGORY_NAME,
};
use crate::error::{GifwError, ValidationIssue};
use crate::event_bus::MapEvent;
use crate::interaction::InteractionMode;
use crate::layer::{
    layer_class_name, Attribution, Feature, FeatureMeta, FeatureStore, FeatureStyle, Layer,
    LayerSource, LegendOptions, SystemLayer, WmsSource,
};
use crate::map::GroupType;
use crate::permalink::{self, BasemapState, LayerState, PermalinkState, SearchPin, ViewState};
use crate::popup::PopupOptions;
use crate::view::MapView;

/// Zoom level `fit_map_to_extent` zooms in to at most by default.
pub const DEFAULT_FIT_MAX_ZOOM: f64 = 50.0;
/// Duration of the animation of `fit_map_to_extent`.
pub const FIT_DURATION: Duration = Duration::from_millis(1000);

/// Options of a layer added at runtime.
#[derive(Debug, Clone)]
pub struct LayerOptions {
    /// Layer id. A new uuid if not set.
    pub layer_id: Option<String>,
    /// Whether the layer is shown.
    pub visible: bool,
    /// Group the layer is added to.
    pub group_type: GroupType,
    /// Drawing order in the group.
    pub z_index: i32,
    /// Whether clicks query the layer.
    pub queryable: bool,
    /// Style of features without their own style. Vector layers only.
    pub style: Option<Arc<FeatureStyle>>,
    /// Extent covered by the layer.
    pub extent: Option<Rect>,
    /// Attribution shown while the layer is visible.
    pub attribution: Option<Attribution>,
    /// Whether legend and feature info requests go through the proxy. WMS layers only.
    pub proxy_meta_requests: bool,
    /// Whether map requests go through the proxy. WMS layers only.
    pub proxy_map_requests: bool,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            layer_id: None,
            visible: true,
            group_type: GroupType::UserNative,
            z_index: 0,
            queryable: true,
            style: None,
            extent: None,
            attribution: None,
            proxy_meta_requests: false,
            proxy_map_requests: false,
        }
    }
}

impl LayerOptions {
    /// Sets the layer id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.layer_id = Some(id.into());
        self
    }

    /// Sets the initial visibility.
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Sets the group of the layer.
    pub fn with_group_type(mut self, group_type: GroupType) -> Self {
        self.group_type = group_type;
        self
    }

    /// Sets the drawing order.
    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    /// Sets whether clicks query the layer.
    pub fn with_queryable(mut self, queryable: bool) -> Self {
        self.queryable = queryable;
        self
    }

    /// Sets the default feature style.
    pub fn with_style(mut self, style: Arc<FeatureStyle>) -> Self {
        self.style = Some(style);
        self
    }

    /// Sets the extent.
    pub fn with_extent(mut self, extent: Option<Rect>) -> Self {
        self.extent = extent;
        self
    }

    /// Sets the attribution.
    pub fn with_attribution(mut self, attribution: Option<Attribution>) -> Self {
        self.attribution = attribution;
        self
    }

    /// Sets which requests of a WMS layer go through the proxy.
    pub fn with_proxy(mut self, meta_requests: bool, map_requests: bool) -> Self {
        self.proxy_meta_requests = meta_requests;
        self.proxy_map_requests = map_requests;
        self
    }
}

fn group_name(group_type: GroupType) -> &'static str {
    match group_type {
        GroupType::Basemap => BASEMAP_GROUP_NAME,
        GroupType::Overlay => OVERLAY_GROUP_NAME,
        GroupType::UserNative => USER_CATEGORY_NAME,
        GroupType::SystemNative => SYSTEM_GROUP_NAME,
    }
}

impl MapEngine {
    fn add_layer(&mut self, layer: Layer, options: &LayerOptions) -> Result<String, GifwError> {
        let id = layer.id().to_string();
        if SystemLayer::from_id(&id).is_some() {
            return Err(GifwError::Validation(vec![ValidationIssue::new(
                "layerId",
                format!("{id} is reserved for a system layer"),
            )]));
        }

        self.session
            .map
            .ensure_group(options.group_type, group_name(options.group_type))
            .add_layer(layer, options.visible);

        if let Some(category) = self
            .session
            .categories
            .iter_mut()
            .find(|c| c.name == USER_CATEGORY_NAME)
        {
            category.layer_ids.push(id.clone());
        }

        info!("Added layer {id} to {:?}", options.group_type);
        self.session.bus.publish(MapEvent::LayerAdded {
            layer_id: id.clone(),
        });
        self.process_events();
        Ok(id)
    }

    fn layer_from_options(&self, source: LayerSource, name: &str, options: &LayerOptions) -> Layer {
        let id = options
            .layer_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut layer = Layer::new(&id, name, source)
            .with_z_index(options.z_index)
            .with_queryable(options.queryable)
            .with_removable(options.group_type == GroupType::UserNative)
            .with_class_name(Some(layer_class_name(&id)))
            .with_extent(options.extent)
            .with_attribution(options.attribution.clone())
            .with_crs(self.session.map.view().crs().clone());
        if let Some(style) = &options.style {
            layer = layer.with_style(style.clone());
        }
        layer
    }

    /// Adds a vector layer with the features. Returns the id of the layer.
    ///
    /// The layer is listed in the "My Layers" category. Ids are not checked for duplicates, but
    /// the reserved ids of the system layers are rejected.
    pub fn add_native_layer_to_map(
        &mut self,
        features: FeatureStore,
        name: &str,
        options: LayerOptions,
    ) -> Result<String, GifwError> {
        let layer = self.layer_from_options(LayerSource::Vector(features), name, &options);
        self.add_layer(layer, &options)
    }

    /// Adds a WMS image layer. Returns the id of the layer.
    pub fn add_web_layer_to_map(
        &mut self,
        source: WmsSource,
        name: &str,
        options: LayerOptions,
    ) -> Result<String, GifwError> {
        let source = source
            .with_proxy_meta_requests(options.proxy_meta_requests)
            .with_proxy_map_requests(options.proxy_map_requests);
        let layer = self.layer_from_options(LayerSource::Wms(source), name, &options);
        self.add_layer(layer, &options)
    }

    /// Removes the layer from the map, its group and the layer categories.
    pub fn remove_layer_by_id(&mut self, id: &str) -> Result<Layer, GifwError> {
        let (group_type, layer) = self
            .session
            .map
            .remove_layer(id)
            .ok_or_else(|| GifwError::NotFound(format!("layer {id}")))?;

        for category in &mut self.session.categories {
            category.layer_ids.retain(|layer_id| layer_id != id);
        }
        if self.session.mode == InteractionMode::FilteringLayer(id.to_string()) {
            self.deactivate_interactions();
        }

        info!("Removed layer {id} from {group_type:?}");
        self.session.bus.publish(MapEvent::LayerRemoved {
            layer_id: id.to_string(),
        });
        self.session.request_permalink_update();
        self.process_events();
        Ok(layer)
    }

    /// Shows or hides the layer. Showing a basemap hides the other basemaps.
    pub fn set_layer_visibility(&mut self, id: &str, visible: bool) -> Result<(), GifwError> {
        if !self.session.map.set_layer_visible(id, visible) {
            warn!("Cannot change visibility of missing layer {id}");
            return Err(GifwError::NotFound(format!("layer {id}")));
        }

        self.session.bus.publish(MapEvent::LayerVisibilityChanged {
            layer_id: id.to_string(),
            visible,
        });
        self.session.request_permalink_update();
        self.process_events();
        Ok(())
    }

    /// Sets the saturation of the layer, 0-100. Unless `quiet`, a permalink update is requested.
    ///
    /// Saturation is applied through the class name of the layer, see
    /// [`MapEngine::saturation_rules`].
    pub fn set_layer_saturation(
        &mut self,
        id: &str,
        saturation: u8,
        quiet: bool,
    ) -> Result<(), GifwError> {
        let layer = self
            .session
            .map
            .layer_mut(id)
            .ok_or_else(|| GifwError::NotFound(format!("layer {id}")))?;
        if layer.class_name().is_none() {
            warn!("Layer {id} has no class name, saturation cannot be applied");
            return Err(GifwError::Generic(format!(
                "layer {id} has no class name"
            )));
        }

        layer.set_saturation(saturation.min(100));
        if !quiet {
            self.session.request_permalink_update();
            self.process_events();
        }
        Ok(())
    }

    /// Sets the opacity of the layer, 0-100.
    pub fn set_layer_opacity(&mut self, id: &str, opacity: u8) -> Result<(), GifwError> {
        self.session
            .map
            .layer_mut(id)
            .ok_or_else(|| GifwError::NotFound(format!("layer {id}")))?
            .set_opacity(opacity.min(100));
        self.session.request_permalink_update();
        self.process_events();
        Ok(())
    }

    /// Sets the server style of a WMS layer.
    pub fn set_layer_style(&mut self, id: &str, style: Option<String>) -> Result<(), GifwError> {
        self.session
            .map
            .layer_mut(id)
            .ok_or_else(|| GifwError::NotFound(format!("layer {id}")))?
            .set_style_name(style);
        self.session.request_permalink_update();
        self.process_events();
        Ok(())
    }

    /// Grayscale CSS rules of the layers that are not fully saturated.
    pub fn saturation_rules(&self) -> Vec<String> {
        self.session
            .map
            .layers()
            .filter(|(layer, _)| layer.saturation() < 100)
            .filter_map(|(layer, _)| layer.saturation_rule())
            .collect()
    }

    /// Fits the view to the extent, zooming in no further than `max_zoom`.
    ///
    /// The move is animated over `duration` only if the extent is already inside the current
    /// view and reduced motion is off. Otherwise the view jumps.
    pub fn fit_map_to_extent(&mut self, extent: &Rect, max_zoom: f64, duration: Duration) {
        let map = &mut self.session.map;
        map.stop_animation();
        let view = map.view().clone();
        let target = view.fit(extent, max_zoom);

        let inside = view
            .extent()
            .is_some_and(|current| current.contains_rect(extent));
        if inside {
            self.session.animate_view(target, duration);
        } else {
            self.session.map.set_view(target);
        }

        self.session.request_permalink_update();
        self.process_events();
    }

    /// Returns true if the extent is covered by the active basemap and the world extent of the
    /// map projection. Layers without a declared extent cover the world.
    pub fn is_extent_available_in_current_map(&self, extent: &Rect) -> Result<bool, GifwError> {
        let basemap = self
            .session
            .map
            .active_basemap()
            .ok_or_else(|| GifwError::NotFound("active basemap".into()))?;

        let in_basemap = basemap
            .extent()
            .map_or(true, |bounds| bounds.contains_rect(extent));
        let in_world = self
            .session
            .map
            .view()
            .crs()
            .world_extent()
            .map_or(true, |world| world.contains_rect(extent));

        Ok(in_basemap && in_world)
    }

    /// Fits the map to the extent if the current map can show it. Otherwise an alert asking to
    /// choose a different background map is shown and [`GifwError::ExtentUnavailable`] returned.
    pub fn zoom_to_extent(&mut self, extent: &Rect, max_zoom: f64) -> Result<(), GifwError> {
        if !self.is_extent_available_in_current_map(extent)? {
            warn!("Extent {extent:?} is outside of the current map");
            self.session.push_alert(Alert::extent_unavailable());
            return Err(GifwError::ExtentUnavailable);
        }

        self.fit_map_to_extent(extent, max_zoom, FIT_DURATION);
        Ok(())
    }

    /// Legend requests of the visible overlays.
    pub fn legend_urls(&self, options: &LegendOptions) -> LegendUrls {
        legend_urls(&self.session, options)
    }

    /// State stored in the permalink.
    pub fn permalink_state(&self) -> PermalinkState {
        let map = &self.session.map;
        let view = map.target_view();

        let view_state = match view.geo_center() {
            Ok(center) => Some(ViewState {
                zoom: view.zoom(),
                lon: center.lon(),
                lat: center.lat(),
                rotation: view.rotation(),
            }),
            Err(err) => {
                warn!("Cannot store the view in the permalink: {err}");
                None
            }
        };

        let layers = map
            .group(GroupType::Overlay)
            .into_iter()
            .flat_map(|group| group.visible_layers())
            .map(|layer| LayerState {
                id: layer.id().to_string(),
                opacity: layer.opacity(),
                saturation: layer.saturation(),
                style: layer.style_name().map(str::to_string),
                filter: layer.permalink_filter(),
            })
            .collect();

        let basemap = map.active_basemap().map(|layer| BasemapState {
            id: layer.id().to_string(),
            opacity: layer.opacity(),
            saturation: layer.saturation(),
        });

        PermalinkState {
            view: view_state,
            layers,
            basemap,
            search_pin: self.session.search_pin.clone(),
        }
    }

    /// Permalink fragment of the current state.
    pub fn permalink(&self) -> String {
        permalink::encode(&self.permalink_state())
    }

    /// Restores the state stored in a permalink fragment.
    ///
    /// A fragment with a view replaces the visible overlays with the listed ones. Unknown layer
    /// ids are skipped with a warning.
    pub fn apply_permalink(&mut self, fragment: &str) -> Result<(), GifwError> {
        let state = permalink::decode(fragment)?;

        if let Some(view) = state.view {
            let current = self.session.map.view().clone();
            let crs = current.crs().clone();
            let target = MapView::new_geo(
                &GeoPoint2d::latlon(view.lat, view.lon),
                MapView::resolution_for_zoom(&crs, view.zoom),
                crs,
            )?
            .with_rotation(view.rotation)
            .with_size(current.size());
            self.session.map.set_view(target);
        }

        // Listed layers replace the overlay visibility.
        if !state.layers.is_empty() {
            if let Some(overlays) = self.session.map.group_mut(GroupType::Overlay) {
                let ids: Vec<String> = overlays.layers().iter().map(|l| l.id().to_string()).collect();
                for id in ids {
                    overlays.set_visible(&id, false);
                }
            }
        }

        for layer_state in &state.layers {
            let Some(layer) = self.session.map.layer_mut(&layer_state.id) else {
                warn!("Permalink layer {} does not exist", layer_state.id);
                continue;
            };
            layer.set_opacity(layer_state.opacity);
            layer.set_saturation(layer_state.saturation);
            if layer_state.style.is_some() {
                layer.set_style_name(layer_state.style.clone());
            }
            if layer.is_filterable() {
                layer.set_user_filter(layer_state.filter.clone());
            }
            self.session.map.set_layer_visible(&layer_state.id, true);
        }

        if let Some(basemap_state) = &state.basemap {
            match self
                .session
                .map
                .group_mut(GroupType::Basemap)
                .and_then(|group| group.layer_mut(&basemap_state.id))
            {
                Some(basemap) => {
                    basemap.set_opacity(basemap_state.opacity);
                    basemap.set_saturation(basemap_state.saturation);
                    self.session.map.set_layer_visible(&basemap_state.id, true);
                }
                None => warn!("Permalink basemap {} does not exist", basemap_state.id),
            }
        }

        if let Some(pin) = state.search_pin {
            self.place_search_pin(pin)?;
        }

        debug!("Applied permalink {fragment}");
        self.session.request_permalink_update();
        self.process_events();
        Ok(())
    }

    /// Shows the pin in the search results layer, replacing the previous one.
    pub fn place_search_pin(&mut self, pin: SearchPin) -> Result<(), GifwError> {
        let map_crs = self.session.map.view().crs().clone();
        let position =
            Crs::from_epsg(pin.epsg).transform_point(&map_crs, &Point2d::new(pin.x, pin.y))?;

        let store = self
            .session
            .system_features_mut(SystemLayer::SearchResults)
            .ok_or_else(|| GifwError::NotFound("search results layer".into()))?;
        store.clear();
        store.add(
            Feature::new(gifw_types::geometry::Geom::Point(position))
                .with_style(Arc::new(pin_style()))
                .with_meta(FeatureMeta {
                    popup: Some(PopupOptions::new(&pin.title, &pin.content)),
                    ..Default::default()
                }),
        );

        self.session.search_pin = Some(pin);
        self.session.request_permalink_update();
        self.process_events();
        Ok(())
    }

    /// Removes the search pin.
    pub fn clear_search_pin(&mut self) {
        if let Some(store) = self.session.system_features_mut(SystemLayer::SearchResults) {
            store.clear();
        }
        if self.session.search_pin.take().is_some() {
            self.session.request_permalink_update();
            self.process_events();
        }
    }
}

fn pin_style() -> FeatureStyle {
    FeatureStyle {
        point_radius: 10.0,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::engine::tests::engine;

    fn store_with_point(x: f64, y: f64) -> FeatureStore {
        let mut store = FeatureStore::default();
        store.add(Feature::new(gifw_types::geometry::Geom::Point(Point2d::new(x, y))));
        store
    }

    #[test]
    fn native_layers_go_to_my_layers() {
        let (mut engine, _) = engine();
        let id = engine
            .add_native_layer_to_map(store_with_point(0.0, 0.0), "Sites", LayerOptions::default())
            .unwrap();

        let layer = engine.map().layer(&id).unwrap();
        assert!(layer.is_removable());
        assert_eq!(layer.class_name(), Some(format!("layer-{id}").as_str()));
        assert_eq!(engine.map().layer_group_type(&id), Some(GroupType::UserNative));
        assert!(engine.session().categories()[0].layer_ids.contains(&id));

        assert_matches!(
            engine.add_native_layer_to_map(
                FeatureStore::default(),
                "Clash",
                LayerOptions::default().with_id("__annotations__")
            ),
            Err(GifwError::Validation(_))
        );

        engine.remove_layer_by_id(&id).unwrap();
        assert!(engine.session().categories()[0].layer_ids.is_empty());
        assert_matches!(engine.remove_layer_by_id(&id), Err(GifwError::NotFound(_)));
    }

    #[test]
    fn extent_must_be_inside_basemap_and_world() {
        let (mut engine, _) = engine();
        let crs = engine.map().view().crs().clone();
        let degrees = |west, south, east, north| {
            Crs::EPSG4326
                .transform_rect(&crs, &Rect::new(west, south, east, north))
                .unwrap()
        };

        assert!(engine
            .is_extent_available_in_current_map(&degrees(-5.0, 50.0, -4.0, 51.0))
            .unwrap());
        assert!(!engine
            .is_extent_available_in_current_map(&degrees(10.0, 50.0, 11.0, 51.0))
            .unwrap());

        engine.set_layer_visibility("aerial", true).unwrap();
        assert!(engine
            .is_extent_available_in_current_map(&degrees(10.0, 50.0, 11.0, 51.0))
            .unwrap());
        assert!(!engine
            .is_extent_available_in_current_map(&Rect::new(-3.0e7, 0.0, -2.9e7, 1.0))
            .unwrap());

        engine.set_layer_visibility("streets", true).unwrap();
        assert_matches!(
            engine.zoom_to_extent(&degrees(10.0, 50.0, 11.0, 51.0), 18.0),
            Err(GifwError::ExtentUnavailable)
        );
        assert_eq!(engine.session().alerts().count(), 1);
    }

    fn inner_extent(engine: &MapEngine) -> Rect {
        let center = engine.map().view().center();
        Rect::new(center.x - 10.0, center.y - 10.0, center.x + 10.0, center.y + 10.0)
    }

    #[test]
    fn fit_animates_only_inside_the_view() {
        let (mut engine, _) = engine();
        engine.fit_map_to_extent(&inner_extent(&engine), 18.0, FIT_DURATION);
        assert!(engine.map().is_animating());

        let far = Rect::new(0.0, 0.0, 1000.0, 1000.0);
        engine.fit_map_to_extent(&far, DEFAULT_FIT_MAX_ZOOM, FIT_DURATION);
        assert!(!engine.map().is_animating());
        assert_eq!(engine.map().view().center(), far.center());

        engine.set_reduced_motion(true);
        engine.fit_map_to_extent(&inner_extent(&engine), 18.0, FIT_DURATION);
        assert!(!engine.map().is_animating());
    }

    #[test]
    fn saturation_needs_class_name() {
        let (mut engine, _) = engine();
        engine.set_layer_saturation("roads", 40, true).unwrap();
        assert_eq!(
            engine.saturation_rules(),
            vec![
                ".layer-aerial { filter: grayscale(50%); }".to_string(),
                ".layer-roads { filter: grayscale(60%); }".to_string()
            ]
        );
        assert_matches!(
            engine.set_layer_saturation("missing", 40, false),
            Err(GifwError::NotFound(_))
        );
    }

    #[test]
    fn listed_layers_replace_overlay_visibility() {
        let (mut layers_only, _) = engine();
        assert!(layers_only.map().is_layer_visible("roads"));

        layers_only.apply_permalink("#layers=stops").unwrap();
        assert!(layers_only.map().is_layer_visible("stops"));
        assert!(!layers_only.map().is_layer_visible("roads"));

        let (mut view_only, _) = engine();
        view_only.apply_permalink("#map=10/-4.1/50.4/0").unwrap();
        assert!(view_only.map().is_layer_visible("roads"));
        assert!(!view_only.map().is_layer_visible("stops"));
    }

    #[test]
    fn permalink_restores_layers_and_pin() {
        let (mut source, _) = engine();
        source.set_layer_visibility("stops", true).unwrap();
        source.set_layer_opacity("roads", 60).unwrap();
        source.set_layer_visibility("aerial", true).unwrap();
        source
            .place_search_pin(SearchPin {
                x: -4.1,
                y: 50.4,
                epsg: 4326,
                title: "Harbour".into(),
                content: "Main quay".into(),
            })
            .unwrap();
        let fragment = source.permalink();

        let (mut restored, _) = engine();
        restored.apply_permalink(&fragment).unwrap();
        assert_eq!(restored.permalink(), fragment);
        assert!(restored.map().is_layer_visible("stops"));
        assert_eq!(restored.map().layer("roads").map(Layer::opacity), Some(60));
        assert_eq!(restored.map().active_basemap().map(Layer::id), Some("aerial"));
        assert_eq!(
            restored
                .session()
                .system_features(SystemLayer::SearchResults)
                .map(FeatureStore::len),
            Some(1)
        );
    }
}
