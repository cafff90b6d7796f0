//! Version configuration document served by the backend.

use std::collections::{BTreeMap, HashSet};

use gifw_types::cartesian::Rect;
use gifw_types::geo::Crs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthManager, AuthRuleConfig};
use crate::error::GifwError;
use crate::filter::FilterProperty;
use crate::layer::{Attribution, Layer, LayerSource, SystemLayer, WfsSource, WmsSource};
use crate::search::SearchDefinition;

/// Configuration of one version of the map client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionConfig {
    /// Display name of the version.
    pub name: String,
    /// Url slug of the version, used to scope local settings.
    pub slug: String,
    /// Background maps. Exactly one of them must be the default.
    pub basemaps: Vec<BasemapConfig>,
    /// Categories of overlay layers.
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
    /// Projections available in the version.
    #[serde(default)]
    pub projections: Vec<ProjectionConfig>,
    /// Colours and branding.
    #[serde(default)]
    pub theme: ThemeConfig,
    /// Area the map is restricted to.
    #[serde(default)]
    pub bound: Option<BoundConfig>,
    /// Initial view.
    #[serde(default)]
    pub start_view: Option<StartViewConfig>,
    /// Rules deciding which requests carry the bearer token.
    #[serde(default)]
    pub auth_rules: Vec<AuthRuleConfig>,
    /// Backend endpoints.
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    /// Searches offered in the search box.
    #[serde(default)]
    pub search_definitions: Vec<SearchDefinition>,
}

/// Background map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasemapConfig {
    /// Unique layer id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// WMS service url.
    pub url: String,
    /// Name of the layer on the service.
    pub layer_name: String,
    /// Whether the basemap is shown on load.
    #[serde(default)]
    pub is_default: bool,
    /// Initial opacity, 0-100.
    #[serde(default = "full")]
    pub opacity: u8,
    /// Initial saturation, 0-100.
    #[serde(default = "full")]
    pub saturation: u8,
    /// Extent covered by the basemap as `[west, south, east, north]` in degrees.
    #[serde(default)]
    pub extent: Option<[f64; 4]>,
    /// Lowest zoom level the basemap is shown at.
    #[serde(default)]
    pub min_zoom: Option<f64>,
    /// Highest zoom level the basemap is shown at.
    #[serde(default)]
    pub max_zoom: Option<f64>,
    /// Attribution shown while the basemap is visible.
    #[serde(default)]
    pub attribution: Option<Attribution>,
    /// Extra request parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Whether map requests go through the proxy.
    #[serde(default)]
    pub proxy_map_requests: bool,
}

/// Category of the layer list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryConfig {
    /// Category name.
    pub name: String,
    /// Layers of the category.
    pub layers: Vec<LayerConfig>,
}

/// Source of an overlay layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerSourceConfig {
    /// WMS image layer.
    #[serde(rename_all = "camelCase")]
    Wms {
        /// Service url.
        url: String,
        /// Name of the layer on the service.
        layer_name: String,
        /// Extra request parameters.
        #[serde(default)]
        params: BTreeMap<String, String>,
        /// Whether capabilities, legend and feature info requests go through the proxy.
        #[serde(default)]
        proxy_meta_requests: bool,
        /// Whether map requests go through the proxy.
        #[serde(default)]
        proxy_map_requests: bool,
        /// Whether the server renders a legend for the layer.
        #[serde(default = "enabled")]
        legend: bool,
    },
    /// Vector layer loaded from WFS.
    #[serde(rename_all = "camelCase")]
    Wfs {
        /// Service url.
        url: String,
        /// Feature type name.
        type_name: String,
        /// Whether requests go through the proxy.
        #[serde(default)]
        proxy_requests: bool,
    },
}

/// Overlay layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    /// Unique layer id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Backing source.
    pub source: LayerSourceConfig,
    /// Whether the layer is shown on load.
    #[serde(default)]
    pub visible: bool,
    /// Drawing order among overlays.
    #[serde(default)]
    pub z_index: i32,
    /// Initial opacity, 0-100.
    #[serde(default = "full")]
    pub opacity: u8,
    /// Initial saturation, 0-100.
    #[serde(default = "full")]
    pub saturation: u8,
    /// Whether clicks query the layer.
    #[serde(default = "enabled")]
    pub queryable: bool,
    /// Whether the user may filter the layer.
    #[serde(default)]
    pub filterable: bool,
    /// Filter set by the administrator.
    #[serde(default)]
    pub default_filter: Option<String>,
    /// Whether the user may change or remove `default_filter`.
    #[serde(default)]
    pub default_filter_editable: bool,
    /// Properties offered in the filter builder.
    #[serde(default)]
    pub filter_properties: Vec<FilterProperty>,
    /// Server style.
    #[serde(default)]
    pub style_name: Option<String>,
    /// Lowest zoom level the layer is shown at.
    #[serde(default)]
    pub min_zoom: Option<f64>,
    /// Highest zoom level the layer is shown at.
    #[serde(default)]
    pub max_zoom: Option<f64>,
    /// Attribution shown while the layer is visible.
    #[serde(default)]
    pub attribution: Option<Attribution>,
}

/// Projection offered by the version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionConfig {
    /// EPSG code.
    pub epsg: u32,
    /// Whether the map is rendered in this projection.
    #[serde(default)]
    pub default_render: bool,
    /// Whether coordinates are shown in this projection.
    #[serde(default)]
    pub default_view: bool,
    /// Decimal places of shown coordinates.
    #[serde(default)]
    pub decimals: u8,
}

/// Branding of the version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeConfig {
    /// Primary colour as a CSS hex value.
    pub primary_colour: String,
    /// Logo placed on exported maps.
    #[serde(default)]
    pub logo_url: Option<String>,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            primary_colour: "#05476d".into(),
            logo_url: None,
        }
    }
}

/// Area the map is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundConfig {
    /// `[west, south, east, north]` in degrees.
    pub extent: [f64; 4],
    /// Lowest allowed zoom level.
    #[serde(default)]
    pub min_zoom: Option<f64>,
    /// Highest allowed zoom level.
    #[serde(default)]
    pub max_zoom: Option<f64>,
}

/// Initial view of the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartViewConfig {
    /// Longitude of the center.
    pub lon: f64,
    /// Latitude of the center.
    pub lat: f64,
    /// Zoom level.
    pub zoom: f64,
}

/// Backend endpoints used by the features of the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointsConfig {
    /// Proxy for services without CORS support.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Returns the bearer token as text.
    #[serde(default)]
    pub token: Option<String>,
    /// Bookmark REST collection.
    #[serde(default)]
    pub bookmarks: Option<String>,
    /// Search endpoint.
    #[serde(default)]
    pub search: Option<String>,
    /// Print configuration of the version.
    #[serde(default)]
    pub print_config: Option<String>,
    /// Web layer service definitions.
    #[serde(default)]
    pub web_layer_services: Option<String>,
}

fn full() -> u8 {
    100
}

fn enabled() -> bool {
    true
}

fn degrees_extent(extent: &[f64; 4], crs: &Crs) -> Result<Rect, GifwError> {
    let [west, south, east, north] = *extent;
    Ok(Crs::EPSG4326.transform_rect(crs, &Rect::new(west, south, east, north))?)
}

impl VersionConfig {
    /// Parses and validates the configuration document.
    pub fn from_json(document: &str) -> Result<Self, GifwError> {
        let config: Self = serde_json::from_str(document)
            .map_err(|err| GifwError::Configuration(err.to_string()))?;
        config.validate()?;
        debug!(
            "Loaded configuration of version {} with {} categories",
            config.slug,
            config.categories.len()
        );
        Ok(config)
    }

    /// Checks the rules a configuration has to follow.
    ///
    /// There must be at least one basemap and exactly one default basemap, layer ids must be
    /// unique and must not take the ids of the system layers, and every auth rule regex must
    /// compile.
    pub fn validate(&self) -> Result<(), GifwError> {
        if self.basemaps.is_empty() {
            return Err(GifwError::Configuration("no basemaps configured".into()));
        }

        let defaults = self.basemaps.iter().filter(|b| b.is_default).count();
        if defaults != 1 {
            return Err(GifwError::Configuration(format!(
                "expected exactly one default basemap, found {defaults}"
            )));
        }

        let mut ids = HashSet::new();
        let layer_ids = self
            .basemaps
            .iter()
            .map(|b| b.id.as_str())
            .chain(self.overlays().map(|l| l.id.as_str()));
        for id in layer_ids {
            if SystemLayer::from_id(id).is_some() {
                return Err(GifwError::Configuration(format!(
                    "layer id {id} is reserved"
                )));
            }
            if !ids.insert(id) {
                return Err(GifwError::Configuration(format!("duplicate layer id {id}")));
            }
        }

        AuthManager::new(&self.auth_rules)?;
        Ok(())
    }

    /// All overlay layers in category order.
    pub fn overlays(&self) -> impl Iterator<Item = &LayerConfig> + '_ {
        self.categories.iter().flat_map(|c| c.layers.iter())
    }

    /// Projection the map is rendered in. Web Mercator unless a projection is marked as the
    /// default render projection.
    pub fn map_crs(&self) -> Crs {
        match self.projections.iter().find(|p| p.default_render) {
            Some(projection) => {
                let crs = Crs::from_epsg(projection.epsg);
                if crs.is_supported() {
                    crs
                } else {
                    warn!(
                        "Projection EPSG:{} is not supported, using Web Mercator",
                        projection.epsg
                    );
                    Crs::EPSG3857
                }
            }
            None => Crs::EPSG3857,
        }
    }

    /// Projection coordinates are shown in.
    pub fn view_crs(&self) -> Crs {
        self.projections
            .iter()
            .find(|p| p.default_view)
            .map(|p| Crs::from_epsg(p.epsg))
            .unwrap_or(Crs::EPSG4326)
    }

    /// Restricting extent in the map projection.
    pub fn bound_extent(&self, crs: &Crs) -> Result<Option<Rect>, GifwError> {
        self.bound
            .as_ref()
            .map(|bound| degrees_extent(&bound.extent, crs))
            .transpose()
    }
}

impl BasemapConfig {
    /// Builds the basemap layer.
    pub fn to_layer(&self, crs: &Crs) -> Result<Layer, GifwError> {
        let source = self
            .params
            .iter()
            .fold(WmsSource::new(&self.url, &self.layer_name), |source, (k, v)| {
                source.with_param(k, v)
            })
            .with_proxy_map_requests(self.proxy_map_requests)
            .with_legend(false);
        let extent = self
            .extent
            .as_ref()
            .map(|extent| degrees_extent(extent, crs))
            .transpose()?;

        Ok(Layer::new(&self.id, &self.name, LayerSource::Wms(source))
            .with_opacity(self.opacity)
            .with_saturation(self.saturation)
            .with_queryable(false)
            .with_class_name(Some(crate::layer::layer_class_name(&self.id)))
            .with_zoom_range(self.min_zoom, self.max_zoom)
            .with_extent(extent)
            .with_attribution(self.attribution.clone())
            .with_crs(crs.clone()))
    }
}

impl LayerConfig {
    /// Builds the overlay layer.
    pub fn to_layer(&self, crs: &Crs) -> Layer {
        let source = match &self.source {
            LayerSourceConfig::Wms {
                url,
                layer_name,
                params,
                proxy_meta_requests,
                proxy_map_requests,
                legend,
            } => {
                let mut source = params
                    .iter()
                    .fold(WmsSource::new(url, layer_name), |source, (k, v)| {
                        source.with_param(k, v)
                    })
                    .with_proxy_meta_requests(*proxy_meta_requests)
                    .with_proxy_map_requests(*proxy_map_requests)
                    .with_legend(*legend);
                if let Some(style) = &self.style_name {
                    source = source.with_param("styles", style);
                }
                LayerSource::Wms(source)
            }
            LayerSourceConfig::Wfs {
                url,
                type_name,
                proxy_requests,
            } => LayerSource::Wfs(WfsSource::new(url, type_name).with_proxy_requests(*proxy_requests)),
        };

        let mut layer = Layer::new(&self.id, &self.name, source)
            .with_z_index(self.z_index)
            .with_opacity(self.opacity)
            .with_saturation(self.saturation)
            .with_queryable(self.queryable)
            .with_filterable(self.filterable)
            .with_default_filter(self.default_filter.clone(), self.default_filter_editable)
            .with_filter_properties(self.filter_properties.clone())
            .with_style_name(self.style_name.clone())
            .with_class_name(Some(crate::layer::layer_class_name(&self.id)))
            .with_zoom_range(self.min_zoom, self.max_zoom)
            .with_attribution(self.attribution.clone())
            .with_crs(crs.clone());
        layer.set_user_filter(None);
        layer
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use assert_matches::assert_matches;

    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "name": "Demo",
        "slug": "demo",
        "basemaps": [
            {"id": "streets", "name": "Streets", "url": "https://maps.example.com/wms",
             "layerName": "streets", "isDefault": true, "extent": [-10.0, 49.0, 2.0, 61.0]},
            {"id": "aerial", "name": "Aerial", "url": "https://maps.example.com/wms",
             "layerName": "aerial", "saturation": 50}
        ],
        "categories": [
            {"name": "Transport", "layers": [
                {"id": "roads", "name": "Roads", "visible": true, "filterable": true,
                 "defaultFilter": "lanes > 1",
                 "source": {"type": "wms", "url": "https://data.example.com/wms",
                            "layerName": "transport:roads"},
                 "filterProperties": [{"name": "lanes", "propertyType": "int"}]},
                {"id": "stops", "name": "Bus stops",
                 "source": {"type": "wfs", "url": "https://data.example.com/wfs",
                            "typeName": "transport:stops"}}
            ]}
        ],
        "startView": {"lon": -4.1, "lat": 50.4, "zoom": 8.0},
        "authRules": [
            {"name": "data", "urlRegex": "^https://data\\.example\\.com", "priority": 1,
             "authorizationType": "Bearer"}
        ],
        "endpoints": {"token": "https://app.example.com/token"}
    }"#;

    #[test]
    fn parses_sample() {
        let config = VersionConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.basemaps[1].opacity, 100);
        assert_eq!(config.basemaps[1].saturation, 50);
        assert_eq!(config.overlays().count(), 2);
        assert_eq!(config.map_crs(), Crs::EPSG3857);
        assert_matches!(
            config.overlays().next().map(|l| &l.source),
            Some(LayerSourceConfig::Wms { legend: true, .. })
        );

        let roads = config.overlays().next().unwrap().to_layer(&config.map_crs());
        assert_eq!(roads.effective_filter().as_deref(), Some("lanes > 1"));
        assert_eq!(roads.class_name(), Some("layer-roads"));
    }

    #[test]
    fn rejects_invalid_documents() {
        let mut config = VersionConfig::from_json(SAMPLE).unwrap();
        config.basemaps[1].is_default = true;
        assert_matches!(config.validate(), Err(GifwError::Configuration(_)));

        let mut config = VersionConfig::from_json(SAMPLE).unwrap();
        config.categories[0].layers[1].id = "roads".into();
        assert_matches!(config.validate(), Err(GifwError::Configuration(_)));

        let mut config = VersionConfig::from_json(SAMPLE).unwrap();
        config.categories[0].layers[1].id = "__annotations__".into();
        assert_matches!(config.validate(), Err(GifwError::Configuration(_)));

        let mut config = VersionConfig::from_json(SAMPLE).unwrap();
        config.auth_rules[0].url_regex = "(".into();
        assert_matches!(config.validate(), Err(GifwError::Configuration(_)));

        assert_matches!(
            VersionConfig::from_json("{}"),
            Err(GifwError::Configuration(_))
        );
    }
}
