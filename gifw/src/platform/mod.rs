//! Access to the network through the [`HttpService`] trait.

use async_trait::async_trait;
use bytes::Bytes;
use maybe_sync::{MaybeSend, MaybeSync};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::GifwError;

pub mod native;
#[cfg(test)]
pub(crate) mod testing;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

/// Request sent through an [`HttpService`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute url.
    pub url: String,
    /// Header names and values.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Creates a request without headers and body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: vec![],
            body: None,
        }
    }

    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Creates a DELETE request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    /// Creates a request with a JSON body.
    pub fn json<T: Serialize + ?Sized>(
        method: Method,
        url: impl Into<String>,
        body: &T,
    ) -> Result<Self, GifwError> {
        Ok(Self::new(method, url)
            .with_header("Content-Type", "application/json")
            .with_body(serde_json::to_vec(body)?))
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds several headers.
    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Value of the header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response received from an [`HttpService`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8.
    pub fn text(&self) -> Result<String, GifwError> {
        String::from_utf8(self.body.to_vec()).map_err(|err| GifwError::Decoding(err.to_string()))
    }

    /// Body decoded as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GifwError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Service sending HTTP requests.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait HttpService: MaybeSend + MaybeSync {
    /// Sends the request. Unsuccessful statuses are returned as responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GifwError>;
}

/// Sends the request and fails on unsuccessful statuses.
pub async fn send_checked(
    http: &dyn HttpService,
    request: HttpRequest,
) -> Result<HttpResponse, GifwError> {
    let url = request.url.clone();
    let response = http.send(request).await?;
    if !response.is_success() {
        log::info!("Request to {url} failed with status {}", response.status);
        return Err(GifwError::Status {
            url,
            status: response.status,
        });
    }

    Ok(response)
}

/// Sends the request and decodes the JSON response.
pub async fn fetch_json<T: DeserializeOwned>(
    http: &dyn HttpService,
    request: HttpRequest,
) -> Result<T, GifwError> {
    send_checked(http, request).await?.json()
}
