//! HTTP transport seam.
//!
//! The `Transport` trait abstracts the two verbs the client needs so the
//! request engine and uploader can run against the real server or an
//! in-memory script (see `testing::ScriptedTransport`).

use std::time::Duration;

use crate::config::LimConfig;
use crate::error::{LimError, Result};

pub const CONTENT_TYPE_XML: &str = "application/xml";
pub const CONTENT_TYPE_TEXT_XML: &str = "text/xml";

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Turn a non-200 response into the fatal transport error.
    pub fn require_ok(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            tracing::error!(status = self.status, body = %self.body, "unexpected HTTP status");
            Err(LimError::Transport {
                status: self.status,
                body: self.body,
            })
        }
    }
}

pub trait Transport: Send + Sync {
    fn post(&self, url: &str, content_type: &str, body: &str) -> Result<HttpResponse>;

    fn get(&self, url: &str) -> Result<HttpResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post(&self, url: &str, content_type: &str, body: &str) -> Result<HttpResponse> {
        (**self).post(url, content_type, body)
    }

    fn get(&self, url: &str) -> Result<HttpResponse> {
        (**self).get(url)
    }
}

/// Blocking reqwest transport with basic auth and optional proxies.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    username: String,
    password: String,
}

impl HttpTransport {
    pub fn new(config: &LimConfig) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder().timeout(Duration::from_secs(120));

        if let Some(proxy) = &config.http_proxy {
            let proxy = reqwest::Proxy::http(proxy)
                .map_err(|e| LimError::Network(format!("http proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }
        if let Some(proxy) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(proxy)
                .map_err(|e| LimError::Network(format!("https proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| LimError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<HttpResponse> {
        let resp = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .map_err(|e| LimError::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| LimError::Network(format!("read response body: {e}")))?;
        Ok(HttpResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn post(&self, url: &str, content_type: &str, body: &str) -> Result<HttpResponse> {
        tracing::debug!(url, bytes = body.len(), "POST");
        self.send(
            self.client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body.to_string()),
        )
    }

    fn get(&self, url: &str) -> Result<HttpResponse> {
        tracing::debug!(url, "GET");
        self.send(
            self.client
                .get(url)
                .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_XML),
        )
    }
}
