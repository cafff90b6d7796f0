use std::collections::BTreeMap;

use gifw_types::cartesian::Point2d;
use reqwest::Url;

use crate::error::GifwError;
use crate::view::MapView;

/// Source parameters copied from the map request into legend requests.
pub const LEGEND_SOURCE_PARAMS: [&str; 7] = [
    "time",
    "cql_filter",
    "filter",
    "featureid",
    "elevation",
    "styles",
    "authkey",
];

/// Pixel size of the area sent with GetFeatureInfo requests.
const FEATURE_INFO_BOX: u32 = 101;

/// Options of GetLegendGraphic requests.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendOptions {
    /// Image format.
    pub format: String,
    /// Value of the `LEGEND_OPTIONS` vendor parameter.
    pub legend_options: String,
    /// Requested legend symbol width.
    pub width: u32,
    /// Requested legend symbol height.
    pub height: u32,
}

impl Default for LegendOptions {
    fn default() -> Self {
        Self {
            format: "image/png".into(),
            legend_options: "fontAntiAliasing:true;forceLabels:on;countMatched:false".into(),
            width: 20,
            height: 20,
        }
    }
}

/// Image source served by a WMS server.
#[derive(Debug, Clone, PartialEq)]
pub struct WmsSource {
    url: String,
    layer_name: String,
    version: String,
    params: BTreeMap<String, String>,
    proxy_meta_requests: bool,
    proxy_map_requests: bool,
    legend_capable: bool,
}

impl WmsSource {
    /// Creates a new source for the layer of the service.
    pub fn new(url: impl Into<String>, layer_name: impl Into<String>) -> Self {
        let mut params = BTreeMap::new();
        params.insert("format".to_string(), "image/png".to_string());
        params.insert("transparent".to_string(), "true".to_string());

        Self {
            url: url.into(),
            layer_name: layer_name.into(),
            version: "1.1.1".into(),
            params,
            proxy_meta_requests: false,
            proxy_map_requests: false,
            legend_capable: true,
        }
    }

    /// Sets a map request parameter. Keys are case insensitive.
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_param(key, Some(value.into()));
        self
    }

    /// Sets whether metadata requests (legends, feature info) go through the proxy.
    pub fn with_proxy_meta_requests(mut self, proxy: bool) -> Self {
        self.proxy_meta_requests = proxy;
        self
    }

    /// Sets whether map requests go through the proxy.
    pub fn with_proxy_map_requests(mut self, proxy: bool) -> Self {
        self.proxy_map_requests = proxy;
        self
    }

    /// Sets whether the server can draw legends for the layer.
    pub fn with_legend(mut self, legend_capable: bool) -> Self {
        self.legend_capable = legend_capable;
        self
    }

    /// Sets the WMS version of map and feature info requests.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// WMS version of map and feature info requests.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Service url.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Name of the layer on the server.
    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    /// Map request parameters with lowercase keys.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Value of a map request parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Sets or removes a map request parameter.
    pub fn set_param(&mut self, key: &str, value: Option<String>) {
        let key = key.to_lowercase();
        match value {
            Some(value) => {
                self.params.insert(key, value);
            }
            None => {
                self.params.remove(&key);
            }
        }
    }

    /// Whether metadata requests go through the proxy.
    pub fn proxy_meta_requests(&self) -> bool {
        self.proxy_meta_requests
    }

    /// Whether map requests go through the proxy.
    pub fn proxy_map_requests(&self) -> bool {
        self.proxy_map_requests
    }

    /// Whether the server can draw legends for the layer.
    pub fn is_legend_capable(&self) -> bool {
        self.legend_capable
    }

    /// Url of the legend image.
    ///
    /// Fixed request parameters are merged with the whitelisted source parameters. `styles` is
    /// sent as `style`.
    pub fn legend_url(
        &self,
        options: &LegendOptions,
        proxy: Option<&str>,
    ) -> Result<String, GifwError> {
        let mut params: Vec<(String, String)> = vec![
            ("REQUEST".into(), "GetLegendGraphic".into()),
            ("SERVICE".into(), "WMS".into()),
            ("VERSION".into(), "1.1.0".into()),
            ("FORMAT".into(), options.format.clone()),
            ("WIDTH".into(), options.width.to_string()),
            ("HEIGHT".into(), options.height.to_string()),
            ("LEGEND_OPTIONS".into(), options.legend_options.clone()),
            ("LAYER".into(), self.layer_name.clone()),
            ("TRANSPARENT".into(), "true".into()),
        ];

        for key in LEGEND_SOURCE_PARAMS {
            if let Some(value) = self.params.get(key) {
                let name = if key == "styles" { "style" } else { key };
                params.push((name.to_uppercase(), value.clone()));
            }
        }

        let url = build_url(&self.url, &params)?;
        Ok(self.proxied(url, proxy, self.proxy_meta_requests))
    }

    /// Url of the GetFeatureInfo request at the map point.
    pub fn feature_info_url(
        &self,
        view: &MapView,
        point: &Point2d,
        info_format: &str,
        feature_count: u32,
        proxy: Option<&str>,
    ) -> Result<String, GifwError> {
        let half = FEATURE_INFO_BOX as f64 / 2.0 * view.resolution();
        let bbox = format!(
            "{},{},{},{}",
            point.x - half,
            point.y - half,
            point.x + half,
            point.y + half
        );
        let center = (FEATURE_INFO_BOX / 2).to_string();

        let mut params: Vec<(String, String)> = vec![
            ("SERVICE".into(), "WMS".into()),
            ("VERSION".into(), self.version.clone()),
            ("REQUEST".into(), "GetFeatureInfo".into()),
            ("LAYERS".into(), self.layer_name.clone()),
            ("QUERY_LAYERS".into(), self.layer_name.clone()),
            ("INFO_FORMAT".into(), info_format.into()),
            ("FEATURE_COUNT".into(), feature_count.to_string()),
            ("SRS".into(), view.crs().code()),
            ("BBOX".into(), bbox),
            ("WIDTH".into(), FEATURE_INFO_BOX.to_string()),
            ("HEIGHT".into(), FEATURE_INFO_BOX.to_string()),
            ("X".into(), center.clone()),
            ("Y".into(), center),
        ];
        for (key, value) in &self.params {
            if matches!(key.as_str(), "cql_filter" | "time" | "styles" | "authkey") {
                params.push((key.to_uppercase(), value.clone()));
            }
        }

        let url = build_url(&self.url, &params)?;
        Ok(self.proxied(url, proxy, self.proxy_meta_requests))
    }

    /// Url of the GetMap request covering the view.
    pub fn map_url(&self, view: &MapView, proxy: Option<&str>) -> Result<String, GifwError> {
        let extent = view
            .extent()
            .ok_or_else(|| GifwError::Generic("map view has no size".into()))?;
        let mut params: Vec<(String, String)> = vec![
            ("SERVICE".into(), "WMS".into()),
            ("VERSION".into(), self.version.clone()),
            ("REQUEST".into(), "GetMap".into()),
            ("LAYERS".into(), self.layer_name.clone()),
            ("SRS".into(), view.crs().code()),
            (
                "BBOX".into(),
                format!(
                    "{},{},{},{}",
                    extent.x_min, extent.y_min, extent.x_max, extent.y_max
                ),
            ),
            ("WIDTH".into(), (view.size().width().round() as u32).to_string()),
            ("HEIGHT".into(), (view.size().height().round() as u32).to_string()),
        ];
        params.extend(
            self.params
                .iter()
                .map(|(key, value)| (key.to_uppercase(), value.clone())),
        );

        let url = build_url(&self.url, &params)?;
        Ok(self.proxied(url, proxy, self.proxy_map_requests))
    }

    fn proxied(&self, url: String, proxy: Option<&str>, enabled: bool) -> String {
        match proxy {
            Some(proxy) if enabled => proxy_url(proxy, &url).unwrap_or(url),
            _ => url,
        }
    }
}

/// Appends the parameters to the url query.
pub fn build_url(base: &str, params: &[(String, String)]) -> Result<String, GifwError> {
    let url = Url::parse_with_params(base, params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .map_err(|err| GifwError::Configuration(format!("invalid url {base}: {err}")))?;
    Ok(url.into())
}

/// Wraps the url into a request to the proxy endpoint.
pub fn proxy_url(proxy: &str, url: &str) -> Result<String, GifwError> {
    build_url(proxy, &[("url".to_string(), url.to_string())])
}
