use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::GifwError;
use crate::platform::{HttpRequest, HttpResponse, HttpService};

/// Answers requests with canned responses chosen by url substring.
#[derive(Default)]
pub(crate) struct ScriptedHttp {
    routes: Vec<(String, u16, String)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    pub(crate) fn with_route(mut self, url_part: &str, status: u16, body: &str) -> Self {
        self.routes.push((url_part.into(), status, body.into()));
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpService for ScriptedHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GifwError> {
        let route = self
            .routes
            .iter()
            .find(|(part, _, _)| request.url.contains(part.as_str()))
            .cloned();
        self.requests.lock().push(request.clone());

        match route {
            Some((_, status, body)) => Ok(HttpResponse::new(status, body)),
            None => Err(GifwError::Network(format!("no route for {}", request.url))),
        }
    }
}
