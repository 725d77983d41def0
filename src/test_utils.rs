//! Test utilities for telltale.
//!
//! Provides fake host primitives, test data factories and filesystem helpers
//! for use across unit and integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use telltale::test_utils::*;
//!
//! let transport = Arc::new(FakeTransport::ok(200, r#"{"ok":true}"#));
//! let console = Arc::new(RecordingConsole::new());
//! let dir = TestDir::new();
//! dir.create_file("config.toml", &make_test_config_toml());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures::future::BoxFuture;
use serde_json::Value;

use crate::capture::LogLevel;
use crate::error::{Result, TelltaleError};
use crate::host::{
    Console, HttpRequest, HttpResponse, HttpTransport, KeyValueStore, TransportError,
};
use crate::usage::{TokenCounter, UsageEvent};

// =============================================================================
// Fake Host Primitives
// =============================================================================

/// Transport that answers every request with a canned result and remembers
/// what it was asked.
pub struct FakeTransport {
    result: std::result::Result<HttpResponse, TransportError>,
    delay: Option<Duration>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    /// Always respond with `status` and `body`.
    #[must_use]
    pub fn ok(status: u16, body: &str) -> Self {
        Self::with_result(Ok(HttpResponse::new(status, body.as_bytes())))
    }

    /// Always fail with `error`.
    #[must_use]
    pub fn failing(error: TransportError) -> Self {
        Self::with_result(Err(error))
    }

    fn with_result(result: std::result::Result<HttpResponse, TransportError>) -> Self {
        Self {
            result,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before settling, so durations are measurable.
    #[must_use]
    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests seen so far, oldest first.
    ///
    /// # Panics
    ///
    /// Never in practice; a poisoned lock is recovered.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HttpTransport for FakeTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> BoxFuture<'static, std::result::Result<HttpResponse, TransportError>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let result = self.result.clone();
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

/// Console that keeps every line as `"{level}: {message}"`.
#[derive(Default)]
pub struct RecordingConsole {
    lines: Mutex<Vec<String>>,
}

impl RecordingConsole {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far, oldest first.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Console for RecordingConsole {
    fn write(&self, level: LogLevel, message: &str, data: Option<&Value>) {
        let line = match data {
            Some(data) => format!("{level}: {message} {data}"),
            None => format!("{level}: {message}"),
        };
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}

/// Store whose every operation fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Err(TelltaleError::StorageRead {
            key: key.to_string(),
            message: "store unavailable".to_string(),
        })
    }

    fn set(&self, key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
        Err(TelltaleError::StorageWrite {
            key: key.to_string(),
            message: "quota exceeded".to_string(),
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        Err(TelltaleError::StorageWrite {
            key: key.to_string(),
            message: "store unavailable".to_string(),
        })
    }
}

/// Counter that reports the same count for any non-empty text.
#[derive(Debug, Clone, Copy)]
pub struct FixedCounter {
    per_text: u64,
}

impl FixedCounter {
    #[must_use]
    pub const fn new(per_text: u64) -> Self {
        Self { per_text }
    }
}

impl TokenCounter for FixedCounter {
    fn count(&self, text: &str) -> u64 {
        if text.is_empty() { 0 } else { self.per_text }
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

// =============================================================================
// Test Data Factories
// =============================================================================

/// A usage event `hours_ago` in the past, split 3:1 prompt to completion.
#[must_use]
pub fn make_test_event(provider: &str, tokens: u64, hours_ago: i64) -> UsageEvent {
    let completion = tokens / 4;
    UsageEvent::new(provider, "test-model", tokens - completion, completion)
        .at(Utc::now() - TimeDelta::hours(hours_ago))
}

/// A config file touching every section.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[general]
timeout_seconds = 5

[capture]
max_logs = 50
max_age_minutes = 30
prune_interval_seconds = 10
max_data_bytes = 2000

[usage]
retention_days = 14

[limits]
openai = 100000
anthropic = 50000

[output]
color = false
"#
    .to_string()
}

/// A chat transcript as accepted by `telltale count`.
#[must_use]
pub fn make_test_transcript_json() -> String {
    r#"[
  {"role": "system", "content": "You are terse."},
  {"role": "user", "content": "Say hello."},
  {"role": "assistant", "content": "Hello."}
]"#
    .to_string()
}

// =============================================================================
// Filesystem Helpers
// =============================================================================

/// Isolated temporary directory removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file with the given content, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&path, content).expect("Failed to write test file");
    }

    /// Read a file from the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> std::io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Test Helpers
// =============================================================================

/// Check if a string contains ANSI escape sequences.
#[must_use]
pub fn has_ansi_codes(text: &str) -> bool {
    text.contains('\x1b')
}

/// Strip ANSI CSI sequences from a string.
#[must_use]
pub fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                for next in chars.by_ref() {
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}
