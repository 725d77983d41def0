//! HTTP client utilities.
//!
//! Provides the production [`HttpTransport`] backed by `reqwest`.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, ClientBuilder, Method};

use crate::error::{Result, TelltaleError};
use crate::host::http::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("telltale/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TelltaleError::Network(e.to_string()))
}

/// Transport that sends requests with a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns error if client construction fails.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            timeout,
        })
    }

    /// Wrap an existing client.
    #[must_use]
    pub const fn from_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn map_error(&self, err: &reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, std::result::Result<HttpResponse, TransportError>> {
        let this = self.clone();
        Box::pin(async move {
            let method = Method::from_bytes(request.method.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

            let mut builder = this.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|e| this.map_error(&e))?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|e| this.map_error(&e))?
                .to_vec();

            tracing::debug!(status, url = %request.url, "http response received");
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}
