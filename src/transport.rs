//! Per-request transport seam.
//!
//! The executor only needs `send(request) -> response`; [`Transport`] is that
//! seam and [`ReqwestTransport`] is the production implementation on a shared,
//! connection-pooling [`reqwest::Client`]. Transport failures never surface
//! as `Err`: they come back as an [`HttpResponse`] whose `error` is set.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// A fully resolved request, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

/// Outcome of one request.
///
/// `status` is `0` when no HTTP response was received.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub duration: Duration,
    pub body_size: u64,
    pub body: Bytes,
    pub error: Option<TransportError>,
}

impl HttpResponse {
    /// A response that never got an HTTP status.
    pub fn failed(error: TransportError, duration: Duration) -> Self {
        Self {
            status: 0,
            duration,
            body_size: 0,
            body: Bytes::new(),
            error: Some(error),
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// Sends a request and reports what happened.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> HttpResponse;
}

/// [`Transport`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> HttpResponse {
        let start = Instant::now();
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                return HttpResponse::failed(TransportError::classify_reqwest(&err), start.elapsed())
            }
        };

        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => HttpResponse {
                status,
                duration: start.elapsed(),
                body_size: body.len() as u64,
                body,
                error: None,
            },
            Err(err) => HttpResponse {
                status,
                duration: start.elapsed(),
                body_size: 0,
                body: Bytes::new(),
                error: Some(TransportError::classify_reqwest(&err)),
            },
        }
    }
}
