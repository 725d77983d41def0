//! Debug-event capture.
//!
//! While enabled, a [`DebugCapture`] decorates the host primitives and turns
//! every network call, console line, uncaught error and storage write into a
//! [`LogEntry`]. Entries land in a bounded [`RetentionBuffer`] and are pushed
//! synchronously to subscribers.

pub mod buffer;
pub mod entry;
pub mod fanout;
pub mod filter;
pub mod interceptors;
pub mod lifecycle;
pub mod truncate;

pub use buffer::RetentionBuffer;
pub use entry::{LogCategory, LogEntry, LogLevel};
pub use fanout::{SubscriberRegistry, Subscription};
pub use filter::LogFilter;
pub use lifecycle::{CaptureSettings, DEBUG_MODE_KEY, DebugCapture};
pub use truncate::{prepare, truncate};
