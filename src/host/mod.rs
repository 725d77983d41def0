//! Host primitives the capture pipeline observes.
//!
//! A [`Host`] bundles one [`Hook`] per primitive: outbound HTTP, console
//! output, global error reporting, durable key-value storage and cookie
//! writes. Application code calls through the host so that whatever
//! implementation is currently installed (original or decorated) is used.

pub mod console;
pub mod cookies;
pub mod errors;
pub mod hook;
pub mod http;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::http::{DEFAULT_TIMEOUT, ReqwestTransport};
use crate::error::Result;

pub use console::{Console, TracingConsole};
pub use cookies::{CookieJar, MemoryCookieJar};
pub use errors::{DefaultErrorHandler, ErrorHandler, ErrorReport};
pub use hook::{Hook, Restore};
pub use http::{HttpRequest, HttpResponse, HttpTransport, TransportError};
pub use storage::{KeyValueStore, MemoryStore};

/// The set of swappable primitives.
#[derive(Debug, Clone)]
pub struct Host {
    pub http: Hook<dyn HttpTransport>,
    pub console: Hook<dyn Console>,
    pub errors: Hook<dyn ErrorHandler>,
    pub storage: Hook<dyn KeyValueStore>,
    pub cookies: Hook<dyn CookieJar>,
}

impl Host {
    /// Start building a host. Unset primitives get defaults.
    #[must_use]
    pub fn builder() -> HostBuilder {
        HostBuilder::default()
    }

    /// Send a request through the current transport.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn fetch(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let transport = self.http.current();
        transport.send(request).await
    }

    /// Current console.
    #[must_use]
    pub fn console(&self) -> Arc<dyn Console> {
        self.console.current()
    }

    /// Current key-value store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.storage.current()
    }

    /// Current cookie jar.
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<dyn CookieJar> {
        self.cookies.current()
    }

    /// Report an uncaught error. Returns whether a handler claimed it.
    pub fn report_error(&self, report: &ErrorReport) -> bool {
        self.errors.current().on_error(report)
    }

    /// Report an unhandled asynchronous failure.
    pub fn report_rejection(&self, reason: &Value) -> bool {
        self.errors.current().on_unhandled_rejection(reason)
    }

    /// Whether any primitive is currently decorated.
    #[must_use]
    pub fn is_decorated(&self) -> bool {
        self.http.is_decorated()
            || self.console.is_decorated()
            || self.errors.is_decorated()
            || self.storage.is_decorated()
            || self.cookies.is_decorated()
    }
}

/// Builder for [`Host`].
#[derive(Default)]
pub struct HostBuilder {
    http: Option<Arc<dyn HttpTransport>>,
    console: Option<Arc<dyn Console>>,
    errors: Option<Arc<dyn ErrorHandler>>,
    storage: Option<Arc<dyn KeyValueStore>>,
    cookies: Option<Arc<dyn CookieJar>>,
    timeout: Option<Duration>,
}

impl HostBuilder {
    #[must_use]
    pub fn http(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.http = Some(transport);
        self
    }

    #[must_use]
    pub fn console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = Some(console);
        self
    }

    #[must_use]
    pub fn errors(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.errors = Some(handler);
        self
    }

    #[must_use]
    pub fn storage(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(store);
        self
    }

    #[must_use]
    pub fn cookies(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.cookies = Some(jar);
        self
    }

    /// Timeout for the default `reqwest` transport.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the host.
    ///
    /// # Errors
    ///
    /// Returns error if the default HTTP client cannot be constructed.
    pub fn build(self) -> Result<Host> {
        let http: Arc<dyn HttpTransport> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestTransport::new(
                self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            )?),
        };
        Ok(Host {
            http: Hook::new("http", http),
            console: Hook::new(
                "console",
                self.console.unwrap_or_else(|| Arc::new(TracingConsole)),
            ),
            errors: Hook::new(
                "errors",
                self.errors.unwrap_or_else(|| Arc::new(DefaultErrorHandler)),
            ),
            storage: Hook::new(
                "storage",
                self.storage.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            ),
            cookies: Hook::new(
                "cookies",
                self.cookies.unwrap_or_else(|| Arc::new(MemoryCookieJar::new())),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_host_is_undecorated() {
        let host = Host::builder().build().expect("host");
        assert!(!host.is_decorated());
        assert_eq!(host.http.name(), "http");
        assert_eq!(host.cookies.name(), "cookies");
    }

    #[test]
    fn store_goes_through_current_slot() {
        let store = Arc::new(MemoryStore::new());
        let host = Host::builder()
            .storage(store.clone())
            .build()
            .expect("host");
        host.store().set("k", "v", None).expect("set");
        assert_eq!(store.get("k").expect("get").as_deref(), Some("v"));
    }

    #[test]
    fn default_error_handler_does_not_claim() {
        let host = Host::builder().build().expect("host");
        assert!(!host.report_error(&ErrorReport::new("boom")));
        assert!(!host.report_rejection(&Value::String("nope".into())));
    }
}
