use async_trait::async_trait;
use log::debug;

use crate::error::GifwError;
use crate::platform::{HttpRequest, HttpResponse, HttpService, Method};

/// [`HttpService`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct NativeHttpService {
    http_client: reqwest::Client,
}

impl NativeHttpService {
    /// Creates a new service.
    pub fn new() -> Result<Self, GifwError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("gifw/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http_client })
    }

    /// Creates a service sharing the given client.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl HttpService for NativeHttpService {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GifwError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        debug!("{method} {}", request.url);
        let mut builder = self.http_client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(HttpResponse { status, body })
    }
}
