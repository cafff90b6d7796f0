#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use gifw::clock::ManualClock;
use gifw::gifw_types::cartesian::Size;
use gifw::platform::{HttpRequest, HttpResponse, HttpService};
use gifw::{GifwError, MapEngine, VersionConfig};
use parking_lot::Mutex;

pub const CONFIG: &str = r#"{
    "name": "Cornwall Explorer",
    "slug": "cornwall",
    "basemaps": [
        {"id": "os", "name": "OS Road", "url": "https://maps.example.com/wms",
         "layerName": "os-road", "isDefault": true, "extent": [-6.5, 49.8, -4.0, 51.3]},
        {"id": "world", "name": "World", "url": "https://maps.example.com/wms",
         "layerName": "world"}
    ],
    "categories": [
        {"name": "Heritage", "layers": [
            {"id": "listed", "name": "Listed buildings", "visible": true,
             "source": {"type": "wms", "url": "https://data.example.com/wms",
                        "layerName": "heritage:listed"}}
        ]}
    ],
    "startView": {"lon": -5.05, "lat": 50.26, "zoom": 10.0},
    "searchDefinitions": [{"id": "places", "name": "Places", "zoomLevel": 15.0}],
    "endpoints": {
        "search": "https://app.example.com/api/search",
        "printConfig": "https://app.example.com/api/print/cornwall"
    }
}"#;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn engine() -> (MapEngine, ManualClock) {
    init_logger();
    let clock = ManualClock::new();
    let config = VersionConfig::from_json(CONFIG).expect("valid configuration");
    let mut engine = MapEngine::new(config, Arc::new(clock.clone())).expect("engine is created");
    engine.resize(Size::new(1024.0, 768.0));
    (engine, clock)
}

/// Answers requests with the body of the first route whose url part matches.
#[derive(Default)]
pub struct FakeHttp {
    routes: Vec<(String, u16, String)>,
    sent: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn route(mut self, url_part: &str, status: u16, body: &str) -> Self {
        self.routes.push((url_part.into(), status, body.into()));
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl HttpService for FakeHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GifwError> {
        self.sent.lock().push(request.url.clone());
        self.routes
            .iter()
            .find(|(part, _, _)| request.url.contains(part.as_str()))
            .map(|(_, status, body)| HttpResponse::new(*status, body.clone()))
            .ok_or_else(|| GifwError::Network(format!("unreachable: {}", request.url)))
    }
}
