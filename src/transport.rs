//! HTTP transport seam.
//!
//! The gateway never talks to an HTTP library directly. It builds an
//! [`HttpRequest`] and hands it to an [`HttpTransport`]. [`ReqwestTransport`]
//! is the production implementation; tests plug in an in-memory one.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::TransportError;

/// HTTP method of a gateway request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Read a collection or an entity.
    Get,
    /// Create an entity.
    Post,
    /// Update an entity.
    Put,
    /// Delete an entity.
    Delete,
}

impl HttpMethod {
    /// Uppercase method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built request, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Absolute URL including the query string.
    pub url: String,
    /// JSON body, sent for `POST` and `PUT`.
    pub body: Option<Value>,
}

/// A received response.
///
/// Non-2xx responses are still responses: the transport returns them and
/// the gateway classifies them.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded JSON body. `null` for empty bodies; non-JSON bodies are kept
    /// as a JSON string.
    pub body: Value,
}

impl HttpResponse {
    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Boxed future returned by [`HttpTransport::fetch`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;

/// Capability to execute HTTP requests.
///
/// Implementations must be cheap to share: the registry wraps the transport
/// in an `Arc` and every entity store calls it concurrently.
pub trait HttpTransport: Send + Sync + 'static {
    /// Send `request` and return the response, whatever its status code.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] when no response was received.
    fn fetch(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// [`HttpTransport`] backed by a [`reqwest::Client`].
///
/// `Clone` is cheap: `reqwest::Client` keeps its connection pool behind an
/// `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport around a pre-configured client (timeouts, default
    /// headers, proxies).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(HttpResponse {
            status,
            body: decode_body(&bytes),
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn fetch(&self, request: HttpRequest) -> TransportFuture<'_> {
        Box::pin(self.send(request))
    }
}

/// Decode a response body: JSON if possible, `null` when empty, the raw
/// text otherwise.
pub(crate) fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
