//! Layers of external web map services added by the user.

use gifw_types::cartesian::Rect;
use gifw_types::geo::Crs;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::auth::AuthManager;
use crate::error::GifwError;
use crate::layer::wms::{build_url, proxy_url};
use crate::layer::{Attribution, WmsSource};
use crate::platform::{fetch_json, HttpRequest, HttpService};

/// Web map service offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebLayerServiceDefinition {
    /// Id of the definition.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Description shown in the service list.
    #[serde(default)]
    pub description: Option<String>,
    /// Service url.
    pub url: String,
    /// WMS version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Whether the layer listing and other metadata are fetched through the proxy.
    #[serde(default)]
    pub proxy_meta_requests: bool,
    /// Whether map images are fetched through the proxy.
    #[serde(default)]
    pub proxy_map_requests: bool,
    /// Attribution of the layers of the service.
    #[serde(default)]
    pub attribution: Option<Attribution>,
}

fn default_version() -> String {
    "1.1.1".into()
}

/// Layer listed by a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLayer {
    /// Name used in map requests.
    pub name: String,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Description.
    #[serde(default, rename = "abstract")]
    pub description: Option<String>,
    /// `[west, south, east, north]` in degrees.
    #[serde(default)]
    pub extent: Option<[f64; 4]>,
    /// Whether the layer answers GetFeatureInfo.
    #[serde(default)]
    pub queryable: bool,
    /// Style names.
    #[serde(default)]
    pub styles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LayerListing {
    #[serde(default)]
    layers: Vec<ServiceLayer>,
}

impl ServiceLayer {
    /// Title of the layer, or its name if the service gives no title.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    /// Extent of the layer in `crs`.
    pub fn extent(&self, crs: &Crs) -> Result<Option<Rect>, GifwError> {
        self.extent
            .map(|[west, south, east, north]| -> Result<Rect, GifwError> {
                Ok(Crs::EPSG4326.transform_rect(crs, &Rect::new(west, south, east, north))?)
            })
            .transpose()
    }

    /// Source showing the layer from the service.
    pub fn to_source(&self, service: &WebLayerServiceDefinition) -> WmsSource {
        let mut source = WmsSource::new(&service.url, &self.name)
            .with_version(&service.version)
            .with_proxy_meta_requests(service.proxy_meta_requests)
            .with_proxy_map_requests(service.proxy_map_requests);
        if let Some(style) = self.styles.first() {
            source = source.with_param("styles", style);
        }
        source
    }

    /// Returns true if the name, title or description contains `text`, ignoring case.
    pub fn matches(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        [Some(&self.name), self.title.as_ref(), self.description.as_ref()]
            .into_iter()
            .flatten()
            .any(|value| value.to_lowercase().contains(&text))
    }
}

/// Fetches service definitions and their layer listings.
#[derive(Debug, Clone)]
pub struct WebLayerServiceClient {
    endpoint: String,
    proxy: Option<String>,
    auth: AuthManager,
}

impl WebLayerServiceClient {
    /// Creates a client of the definitions endpoint.
    pub fn new(endpoint: impl Into<String>, proxy: Option<String>, auth: AuthManager) -> Self {
        Self {
            endpoint: endpoint.into(),
            proxy,
            auth,
        }
    }

    /// Services available to the user.
    pub async fn services(
        &self,
        http: &dyn HttpService,
    ) -> Result<Vec<WebLayerServiceDefinition>, GifwError> {
        fetch_json(http, self.auth.authorize(HttpRequest::get(&self.endpoint))).await
    }

    /// Url of the layer listing of the service.
    pub fn listing_url(&self, service: &WebLayerServiceDefinition) -> Result<String, GifwError> {
        let url = build_url(
            &service.url,
            &[
                ("service".into(), "WMS".into()),
                ("request".into(), "GetCapabilities".into()),
                ("version".into(), service.version.clone()),
                ("format".into(), "application/json".into()),
            ],
        )?;

        match (&self.proxy, service.proxy_meta_requests) {
            (Some(proxy), true) => proxy_url(proxy, &url),
            _ => Ok(url),
        }
    }

    /// Layers of the service sorted by their display name.
    pub async fn layers(
        &self,
        http: &dyn HttpService,
        service: &WebLayerServiceDefinition,
    ) -> Result<Vec<ServiceLayer>, GifwError> {
        let url = self.listing_url(service)?;
        let listing: LayerListing = fetch_json(http, self.auth.authorize(HttpRequest::get(url))).await?;
        let mut layers = listing.layers;
        layers.sort_by_cached_key(|l| l.display_name().to_lowercase());
        debug!("Service {} lists {} layers", service.name, layers.len());
        Ok(layers)
    }
}
