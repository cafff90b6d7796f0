//! Layers of the map and the data sources behind them.
//!
//! A [`Layer`] carries the state the user controls (visibility lives in the owning
//! [`LayerGroup`](crate::map::LayerGroup)), opacity, saturation and filters, and a [`LayerSource`]
//! that is either a set of features owned by the client or a WMS/WFS service.

use std::sync::Arc;

use gifw_types::cartesian::Rect;
use gifw_types::geo::Crs;
use serde::{Deserialize, Serialize};

mod feature;
mod feature_store;
mod style;
mod wfs;
pub mod wms;

pub use feature::{BufferSpec, Feature, FeatureId, FeatureMeta};
pub use feature_store::FeatureStore;
pub use style::{FeatureStyle, PointShape};
pub use wfs::{parse_feature_collection, WfsSource};
pub use wms::{LegendOptions, WmsSource};

use crate::filter::cql::combine_filters;
use crate::filter::FilterProperty;

/// Id of the layer holding user annotations.
pub const ANNOTATIONS_LAYER_ID: &str = "__annotations__";
/// Id of the layer holding measurements.
pub const MEASUREMENTS_LAYER_ID: &str = "__measurements__";
/// Id of the layer holding the geolocation marker and track.
pub const GEOLOCATION_LAYER_ID: &str = "__geolocation__";
/// Id of the layer holding search result pins.
pub const SEARCH_RESULTS_LAYER_ID: &str = "__searchresults__";

/// Reserved system layers, created on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemLayer {
    /// User annotations.
    Annotations,
    /// Measurements.
    Measurements,
    /// Geolocation marker, accuracy circle and track.
    Geolocation,
    /// Search result pins.
    SearchResults,
}

impl SystemLayer {
    /// Reserved id of the layer.
    pub fn id(&self) -> &'static str {
        match self {
            SystemLayer::Annotations => ANNOTATIONS_LAYER_ID,
            SystemLayer::Measurements => MEASUREMENTS_LAYER_ID,
            SystemLayer::Geolocation => GEOLOCATION_LAYER_ID,
            SystemLayer::SearchResults => SEARCH_RESULTS_LAYER_ID,
        }
    }

    /// Display name of the layer.
    pub fn name(&self) -> &'static str {
        match self {
            SystemLayer::Annotations => "Annotations",
            SystemLayer::Measurements => "Measurements",
            SystemLayer::Geolocation => "Geolocation",
            SystemLayer::SearchResults => "Search results",
        }
    }

    /// Z-index keeping system layers above data layers.
    pub fn z_index(&self) -> i32 {
        match self {
            SystemLayer::Annotations => 1000,
            SystemLayer::Measurements => 1001,
            SystemLayer::Geolocation => 1002,
            SystemLayer::SearchResults => 1003,
        }
    }

    /// Returns the system layer with the given id.
    pub fn from_id(id: &str) -> Option<Self> {
        [
            SystemLayer::Annotations,
            SystemLayer::Measurements,
            SystemLayer::Geolocation,
            SystemLayer::SearchResults,
        ]
        .into_iter()
        .find(|layer| layer.id() == id)
    }
}

/// Attribution of a layer's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    /// Attribution text.
    pub text: String,
    /// Optional link to the data owner.
    pub url: Option<String>,
}

impl Attribution {
    /// Creates a new `Attribution` with the given text and optional URL.
    pub fn new(text: impl Into<String>, url: Option<String>) -> Self {
        Self {
            text: text.into(),
            url,
        }
    }
}

/// Data behind a layer.
#[derive(Debug, Clone)]
pub enum LayerSource {
    /// Features owned by the client.
    Vector(FeatureStore),
    /// Images rendered by a WMS server.
    Wms(WmsSource),
    /// Features loaded from a WFS server.
    Wfs(WfsSource),
}

impl LayerSource {
    /// Features of vector and WFS sources.
    pub fn features(&self) -> Option<&FeatureStore> {
        match self {
            LayerSource::Vector(store) => Some(store),
            LayerSource::Wfs(source) => Some(source.features()),
            LayerSource::Wms(_) => None,
        }
    }

    /// Mutable features of vector and WFS sources.
    pub fn features_mut(&mut self) -> Option<&mut FeatureStore> {
        match self {
            LayerSource::Vector(store) => Some(store),
            LayerSource::Wfs(source) => Some(source.features_mut()),
            LayerSource::Wms(_) => None,
        }
    }

    /// WMS source, if this is one.
    pub fn wms(&self) -> Option<&WmsSource> {
        match self {
            LayerSource::Wms(source) => Some(source),
            _ => None,
        }
    }
}

/// Map layer.
#[derive(Debug, Clone)]
pub struct Layer {
    id: String,
    name: String,
    z_index: i32,
    opacity: u8,
    saturation: u8,
    queryable: bool,
    filterable: bool,
    removable: bool,
    default_filter: Option<String>,
    default_filter_editable: bool,
    user_filter: Option<String>,
    class_name: Option<String>,
    min_zoom: Option<f64>,
    max_zoom: Option<f64>,
    style_name: Option<String>,
    style: Option<Arc<FeatureStyle>>,
    attribution: Option<Attribution>,
    extent: Option<Rect>,
    filter_properties: Vec<FilterProperty>,
    crs: Crs,
    source: LayerSource,
}

/// Returns the CSS class of the layer with the given id.
pub fn layer_class_name(id: &str) -> String {
    format!("layer-{id}")
}

impl Layer {
    /// Creates a new fully opaque, fully saturated layer without a class name.
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: LayerSource) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            z_index: 0,
            opacity: 100,
            saturation: 100,
            queryable: true,
            filterable: false,
            removable: false,
            default_filter: None,
            default_filter_editable: false,
            user_filter: None,
            class_name: None,
            min_zoom: None,
            max_zoom: None,
            style_name: None,
            style: None,
            attribution: None,
            extent: None,
            filter_properties: vec![],
            crs: Crs::EPSG3857,
            source,
        }
    }

    /// Sets the z-index.
    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    /// Sets the opacity (0-100).
    pub fn with_opacity(mut self, opacity: u8) -> Self {
        self.opacity = opacity.min(100);
        self
    }

    /// Sets the saturation (0-100).
    pub fn with_saturation(mut self, saturation: u8) -> Self {
        self.saturation = saturation.min(100);
        self
    }

    /// Sets whether features of the layer can be queried.
    pub fn with_queryable(mut self, queryable: bool) -> Self {
        self.queryable = queryable;
        self
    }

    /// Sets whether the user can filter the layer.
    pub fn with_filterable(mut self, filterable: bool) -> Self {
        self.filterable = filterable;
        self
    }

    /// Sets whether the user can remove the layer.
    pub fn with_removable(mut self, removable: bool) -> Self {
        self.removable = removable;
        self
    }

    /// Sets the filter configured by the administrator and whether the user may edit it.
    pub fn with_default_filter(mut self, filter: Option<String>, editable: bool) -> Self {
        self.default_filter = filter.filter(|f| !f.trim().is_empty());
        self.default_filter_editable = editable;
        self.sync_source_filter();
        self
    }

    /// Sets the CSS class used for saturation rules.
    pub fn with_class_name(mut self, class_name: Option<String>) -> Self {
        self.class_name = class_name;
        self
    }

    /// Sets the zoom range in which the layer is drawn.
    pub fn with_zoom_range(mut self, min_zoom: Option<f64>, max_zoom: Option<f64>) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    /// Sets the name of the server style.
    pub fn with_style_name(mut self, style_name: Option<String>) -> Self {
        self.style_name = style_name;
        self
    }

    /// Sets the style of vector features without their own style.
    pub fn with_style(mut self, style: Arc<FeatureStyle>) -> Self {
        self.style = Some(style);
        self
    }

    /// Sets the attribution.
    pub fn with_attribution(mut self, attribution: Option<Attribution>) -> Self {
        self.attribution = attribution;
        self
    }

    /// Sets the area covered by the layer data, in map coordinates.
    pub fn with_extent(mut self, extent: Option<Rect>) -> Self {
        self.extent = extent;
        self
    }

    /// Sets the properties offered by the filter builder.
    pub fn with_filter_properties(mut self, properties: Vec<FilterProperty>) -> Self {
        self.filter_properties = properties;
        self
    }

    /// Sets the CRS of vector features.
    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = crs;
        self
    }

    /// Layer id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Z-index.
    pub fn z_index(&self) -> i32 {
        self.z_index
    }

    /// Opacity in percent.
    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    /// Sets the opacity in percent. Values above 100 are clamped.
    pub fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity.min(100);
    }

    /// Saturation in percent.
    pub fn saturation(&self) -> u8 {
        self.saturation
    }

    /// Sets the saturation in percent. Values above 100 are clamped.
    pub fn set_saturation(&mut self, saturation: u8) {
        self.saturation = saturation.min(100);
    }

    /// Whether features of the layer can be queried.
    pub fn is_queryable(&self) -> bool {
        self.queryable
    }

    /// Whether the user can filter the layer.
    pub fn is_filterable(&self) -> bool {
        self.filterable
    }

    /// Whether the user can remove the layer.
    pub fn is_removable(&self) -> bool {
        self.removable
    }

    /// Filter configured by the administrator.
    pub fn default_filter(&self) -> Option<&str> {
        self.default_filter.as_deref()
    }

    /// Whether the user may edit the default filter.
    pub fn is_default_filter_editable(&self) -> bool {
        self.default_filter_editable
    }

    /// Filter set by the user.
    pub fn user_filter(&self) -> Option<&str> {
        self.user_filter.as_deref()
    }

    /// Sets the user filter and updates the filter sent to the server.
    ///
    /// A non-editable default filter is always applied together with the user filter. An editable
    /// default filter is replaced by the user filter.
    pub fn set_user_filter(&mut self, filter: Option<String>) {
        self.user_filter = filter.filter(|f| !f.trim().is_empty());
        self.sync_source_filter();
    }

    fn sync_source_filter(&mut self) {
        let effective = self.effective_filter();
        if let LayerSource::Wms(source) = &mut self.source {
            source.set_param("cql_filter", effective);
        }
    }

    /// Filter sent to the server.
    pub fn effective_filter(&self) -> Option<String> {
        match (&self.default_filter, &self.user_filter) {
            (Some(default), user) if !self.default_filter_editable => {
                combine_filters(Some(default.as_str()), user.as_deref())
            }
            (_, Some(user)) => Some(user.clone()),
            (default, None) => default.clone(),
        }
    }

    /// Filter stored in permalinks: the effective filter without a non-editable default part.
    pub fn permalink_filter(&self) -> Option<String> {
        if self.default_filter_editable {
            self.effective_filter()
        } else {
            self.user_filter.clone()
        }
    }

    /// CSS class of the layer.
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// Returns true if the layer is drawn at the zoom level.
    pub fn is_in_zoom_range(&self, zoom: f64) -> bool {
        self.min_zoom.map_or(true, |min| zoom >= min) && self.max_zoom.map_or(true, |max| zoom <= max)
    }

    /// Name of the server style.
    pub fn style_name(&self) -> Option<&str> {
        self.style_name.as_deref()
    }

    /// Sets the name of the server style, updating the map requests of WMS sources.
    pub fn set_style_name(&mut self, style_name: Option<String>) {
        if let LayerSource::Wms(source) = &mut self.source {
            source.set_param("styles", style_name.clone());
        }
        self.style_name = style_name;
    }

    /// Style of features without their own style.
    pub fn style(&self) -> Option<&Arc<FeatureStyle>> {
        self.style.as_ref()
    }

    /// Attribution of the layer data.
    pub fn attribution(&self) -> Option<&Attribution> {
        self.attribution.as_ref()
    }

    /// Area covered by the layer data.
    pub fn extent(&self) -> Option<Rect> {
        self.extent
    }

    /// Properties offered by the filter builder.
    pub fn filter_properties(&self) -> &[FilterProperty] {
        &self.filter_properties
    }

    /// CRS of vector features.
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// Data source.
    pub fn source(&self) -> &LayerSource {
        &self.source
    }

    /// Mutable data source.
    pub fn source_mut(&mut self) -> &mut LayerSource {
        &mut self.source
    }

    /// Features of vector and WFS layers.
    pub fn features(&self) -> Option<&FeatureStore> {
        self.source.features()
    }

    /// Mutable features of vector and WFS layers.
    pub fn features_mut(&mut self) -> Option<&mut FeatureStore> {
        self.source.features_mut()
    }

    /// CSS rule turning the layer gray according to its saturation. Returns `None` for layers
    /// without a class name.
    pub fn saturation_rule(&self) -> Option<String> {
        let class_name = self.class_name.as_ref()?;
        Some(format!(
            ".{class_name} {{ filter: grayscale({}%); }}",
            100 - self.saturation
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wms_layer() -> Layer {
        Layer::new(
            "roads",
            "Roads",
            LayerSource::Wms(WmsSource::new("https://maps.example.com/wms", "roads")),
        )
    }

    #[test]
    fn locked_default_filter_wraps_user_filter() {
        let mut layer = wms_layer().with_default_filter(Some("owner = 'council'".into()), false);
        layer.set_user_filter(Some("type = 'A'".into()));

        assert_eq!(
            layer.effective_filter().as_deref(),
            Some("(owner = 'council') AND (type = 'A')")
        );
        assert_eq!(layer.permalink_filter().as_deref(), Some("type = 'A'"));
        assert_eq!(
            layer.source().wms().and_then(|s| s.param("CQL_FILTER")),
            Some("(owner = 'council') AND (type = 'A')")
        );

        layer.set_user_filter(None);
        assert_eq!(layer.effective_filter().as_deref(), Some("owner = 'council'"));
        assert_eq!(layer.permalink_filter(), None);
    }

    #[test]
    fn editable_default_filter_is_replaced() {
        let mut layer = wms_layer().with_default_filter(Some("a = 1".into()), true);
        assert_eq!(layer.effective_filter().as_deref(), Some("a = 1"));
        assert_eq!(layer.permalink_filter().as_deref(), Some("a = 1"));

        layer.set_user_filter(Some("b = 2".into()));
        assert_eq!(layer.effective_filter().as_deref(), Some("b = 2"));
    }

    #[test]
    fn saturation_rule_needs_class_name() {
        let layer = wms_layer().with_saturation(30);
        assert_eq!(layer.saturation_rule(), None);

        let layer = layer.with_class_name(Some(layer_class_name("roads")));
        assert_eq!(
            layer.saturation_rule().as_deref(),
            Some(".layer-roads { filter: grayscale(70%); }")
        );
    }

    #[test]
    fn zoom_range() {
        let layer = wms_layer().with_zoom_range(Some(10.0), Some(15.0));
        assert!(!layer.is_in_zoom_range(9.9));
        assert!(layer.is_in_zoom_range(10.0));
        assert!(layer.is_in_zoom_range(15.0));
        assert!(!layer.is_in_zoom_range(15.1));
    }
}
