//! Process-level infrastructure: HTTP client and diagnostics logging.

pub mod http;
pub mod logging;

pub use http::{DEFAULT_TIMEOUT, ReqwestTransport, build_client};
