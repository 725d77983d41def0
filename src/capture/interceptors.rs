//! Decorators that mirror host primitive calls into the capture buffer.

use std::panic::PanicHookInfo;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use rand::Rng;
use serde_json::{Value, json};

use super::entry::{LogCategory, LogEntry, LogLevel};
use super::lifecycle::Recorder;
use super::truncate::truncate;
use crate::error::Result;
use crate::host::errors::reason_text;
use crate::host::http::{body_to_value, headers_to_value};
use crate::host::{
    Console, CookieJar, ErrorHandler, ErrorReport, Host, HttpRequest, HttpResponse,
    HttpTransport, KeyValueStore, Restore, TransportError,
};

const CORRELATION_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a request correlation id.
pub const CORRELATION_ID_LEN: usize = 9;

/// Random lowercase alphanumeric id tying a request to its outcome.
#[must_use]
pub fn correlation_id() -> String {
    let mut rng = rand::thread_rng();
    (0..CORRELATION_ID_LEN)
        .map(|_| char::from(CORRELATION_ALPHABET[rng.gen_range(0..CORRELATION_ALPHABET.len())]))
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Decorate every host primitive. Dropping the returned guards restores them.
pub(crate) fn install(host: &Host, recorder: &Arc<Recorder>) -> Vec<Restore> {
    let (_, http) = host.http.decorate(|inner| {
        Arc::new(CapturingTransport {
            inner,
            recorder: Arc::clone(recorder),
        })
    });
    let (_, console) = host.console.decorate(|inner| {
        Arc::new(CapturingConsole {
            inner,
            recorder: Arc::clone(recorder),
        })
    });
    let (_, errors) = host.errors.decorate(|inner| {
        Arc::new(CapturingErrorHandler {
            inner,
            recorder: Arc::clone(recorder),
        })
    });
    let (_, storage) = host.storage.decorate(|inner| {
        Arc::new(CapturingStore {
            inner,
            recorder: Arc::clone(recorder),
        })
    });
    let (_, cookies) = host.cookies.decorate(|inner| {
        Arc::new(CapturingCookieJar {
            inner,
            recorder: Arc::clone(recorder),
        })
    });
    vec![http, console, errors, storage, cookies]
}

struct CapturingTransport {
    inner: Arc<dyn HttpTransport>,
    recorder: Arc<Recorder>,
}

impl HttpTransport for CapturingTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, std::result::Result<HttpResponse, TransportError>> {
        let inner = Arc::clone(&self.inner);
        let recorder = Arc::clone(&self.recorder);
        Box::pin(async move {
            let id = correlation_id();
            let method = request.method.clone();
            let url = request.url.clone();
            let budget = recorder.max_data_bytes();

            let body = request
                .body
                .as_deref()
                .map_or(Value::Null, |b| truncate(&body_to_value(b), budget));
            recorder.record(
                LogEntry::new(LogLevel::Info, LogCategory::Network, format!("→ {method} {url}"))
                    .with_data(recorder.bound(&json!({
                        "id": id,
                        "method": method,
                        "url": url,
                        "headers": headers_to_value(&request.headers),
                        "body": body,
                    }))),
            );

            let started = Instant::now();
            let result = inner.send(request).await;
            let duration_ms = elapsed_ms(started);

            match &result {
                Ok(response) => {
                    recorder.record(
                        LogEntry::new(
                            LogLevel::Info,
                            LogCategory::Network,
                            format!("← {} {url} ({duration_ms} ms)", response.status),
                        )
                        .with_data(recorder.bound(&json!({
                            "id": id,
                            "status": response.status,
                            "duration_ms": duration_ms,
                            "body": truncate(&body_to_value(&response.body), budget),
                        }))),
                    );
                }
                Err(err) => {
                    recorder.record(
                        LogEntry::new(
                            LogLevel::Error,
                            LogCategory::Network,
                            format!("✗ {method} {url} failed ({duration_ms} ms)"),
                        )
                        .with_data(recorder.bound(&json!({
                            "id": id,
                            "error": err.to_string(),
                            "duration_ms": duration_ms,
                        }))),
                    );
                }
            }
            result
        })
    }
}

struct CapturingConsole {
    inner: Arc<dyn Console>,
    recorder: Arc<Recorder>,
}

impl Console for CapturingConsole {
    fn write(&self, level: LogLevel, message: &str, data: Option<&Value>) {
        let mut entry = LogEntry::new(level, LogCategory::System, message);
        if let Some(data) = data {
            entry = entry.with_data(self.recorder.bound(data));
        }
        self.recorder.record(entry);
        self.inner.write(level, message, data);
    }
}

struct CapturingErrorHandler {
    inner: Arc<dyn ErrorHandler>,
    recorder: Arc<Recorder>,
}

impl ErrorHandler for CapturingErrorHandler {
    fn on_error(&self, report: &ErrorReport) -> bool {
        let mut entry = LogEntry::new(LogLevel::Error, LogCategory::Error, report.message.as_str())
            .with_data(self.recorder.bound(report));
        if let Some(trace) = &report.trace {
            entry = entry.with_trace(trace);
        }
        self.recorder.record(entry);
        self.inner.on_error(report)
    }

    fn on_unhandled_rejection(&self, reason: &Value) -> bool {
        self.recorder.record(
            LogEntry::new(
                LogLevel::Error,
                LogCategory::Error,
                format!("Unhandled rejection: {}", reason_text(reason)),
            )
            .with_data(self.recorder.bound(&json!({ "reason": reason }))),
        );
        self.inner.on_unhandled_rejection(reason)
    }
}

struct CapturingStore {
    inner: Arc<dyn KeyValueStore>,
    recorder: Arc<Recorder>,
}

impl KeyValueStore for CapturingStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.recorder.record(
            LogEntry::new(LogLevel::Info, LogCategory::State, format!("Storage set: {key}"))
                .with_data(self.recorder.bound(&json!({ "key": key, "value": value }))),
        );
        self.inner.set(key, value, ttl)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}

struct CapturingCookieJar {
    inner: Arc<dyn CookieJar>,
    recorder: Arc<Recorder>,
}

impl CookieJar for CapturingCookieJar {
    fn set_cookie(&self, raw: &str) {
        self.recorder.record(
            LogEntry::new(LogLevel::Info, LogCategory::State, "Cookie set")
                .with_data(self.recorder.bound(&json!({ "cookie": raw }))),
        );
        self.inner.set_cookie(raw);
    }

    fn cookie_header(&self) -> String {
        self.inner.cookie_header()
    }
}

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

/// Routes panics through the host error handler while installed.
///
/// The pipeline owns the process panic hook between install and drop. The
/// hook found at install time is chained, then put back unchanged on drop;
/// a hook set by someone else in between is replaced.
pub(crate) struct PanicHookGuard {
    previous: Arc<Mutex<Option<PanicHook>>>,
}

impl PanicHookGuard {
    pub(crate) fn install(host: Host) -> Self {
        let previous = Arc::new(Mutex::new(Some(std::panic::take_hook())));
        let chained = Arc::clone(&previous);
        std::panic::set_hook(Box::new(move |info| {
            host.report_error(&ErrorReport::from_panic(info));
            if let Some(hook) = chained.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
                hook(info);
            }
        }));
        Self { previous }
    }
}

impl Drop for PanicHookGuard {
    fn drop(&mut self) {
        // set_hook panics when called from a panicking thread.
        if std::thread::panicking() {
            return;
        }
        let previous = self
            .previous
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            drop(std::panic::take_hook());
            std::panic::set_hook(previous);
        }
    }
}
