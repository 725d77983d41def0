//! Enable/disable state machine for debug capture.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;

use super::buffer::{DEFAULT_MAX_LOGS, RetentionBuffer};
use super::entry::{LogCategory, LogEntry, LogLevel};
use super::fanout::{SubscriberRegistry, Subscription};
use super::filter::LogFilter;
use super::interceptors::{self, PanicHookGuard};
use super::truncate::prepare;
use crate::error::{Result, TelltaleError};
use crate::host::{Host, Restore};

/// Storage key holding the persisted enabled flag.
pub const DEBUG_MODE_KEY: &str = "debug_mode";

/// Tunables for a [`DebugCapture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub max_logs: usize,
    pub max_age: Duration,
    pub prune_interval: Duration,
    pub max_data_bytes: usize,
    /// Also route panics through the error interceptor.
    pub capture_panics: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_logs: DEFAULT_MAX_LOGS,
            max_age: Duration::from_secs(60 * 60),
            prune_interval: Duration::from_secs(60),
            max_data_bytes: 10_000,
            capture_panics: false,
        }
    }
}

struct CaptureState {
    enabled: bool,
    buffer: RetentionBuffer,
}

/// Shared sink the interceptors write into.
pub(crate) struct Recorder {
    state: Mutex<CaptureState>,
    subscribers: SubscriberRegistry,
    max_data_bytes: usize,
}

impl Recorder {
    fn new(settings: &CaptureSettings) -> Self {
        Self {
            state: Mutex::new(CaptureState {
                enabled: false,
                buffer: RetentionBuffer::new(settings.max_logs),
            }),
            subscribers: SubscriberRegistry::new(),
            max_data_bytes: settings.max_data_bytes,
        }
    }

    fn state(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) const fn max_data_bytes(&self) -> usize {
        self.max_data_bytes
    }

    /// Convert and bound structured data for an entry.
    pub(crate) fn bound<T: Serialize + ?Sized>(&self, data: &T) -> Value {
        prepare(data, self.max_data_bytes)
    }

    /// Append `entry` if capture is enabled, then notify listeners.
    pub(crate) fn record(&self, entry: LogEntry) -> bool {
        let entry = Arc::new(entry);
        {
            let mut state = self.state();
            if !state.enabled {
                return false;
            }
            state.buffer.append(Arc::clone(&entry));
        }
        self.subscribers.notify(&entry);
        true
    }

    fn prune(&self, cutoff: DateTime<Utc>) -> usize {
        self.state().buffer.prune(cutoff)
    }
}

fn cutoff(max_age: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    TimeDelta::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Background thread pruning entries older than the age horizon.
struct PruneTimer {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PruneTimer {
    fn start(recorder: Arc<Recorder>, max_age: Duration, interval: Duration) -> Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("telltale-prune".to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let removed = recorder.prune(cutoff(max_age));
                            if removed > 0 {
                                tracing::debug!(removed, "pruned expired capture entries");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| TelltaleError::TimerSpawn(e.to_string()))?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}

impl Drop for PruneTimer {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("prune timer thread panicked");
            }
        }
    }
}

/// Everything installed while capture is enabled. The timer is joined after
/// the primitives are restored.
struct ActiveCapture {
    restores: Vec<Restore>,
    _timer: PruneTimer,
    panic_guard: Option<PanicHookGuard>,
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        drop(self.panic_guard.take());
        for restore in self.restores.drain(..) {
            restore.restore();
        }
    }
}

/// The debug-event capture pipeline.
///
/// Owns the retention buffer, the listener registry and the interceptors
/// over a [`Host`]. Construct one per application and share it via `Arc`.
pub struct DebugCapture {
    host: Host,
    settings: CaptureSettings,
    recorder: Arc<Recorder>,
    active: Mutex<Option<ActiveCapture>>,
}

impl DebugCapture {
    #[must_use]
    pub fn new(host: Host, settings: CaptureSettings) -> Self {
        let recorder = Arc::new(Recorder::new(&settings));
        Self {
            host,
            settings,
            recorder,
            active: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn host(&self) -> &Host {
        &self.host
    }

    #[must_use]
    pub const fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveCapture>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.recorder.state().enabled
    }

    /// Install interceptors, start pruning and persist the flag.
    ///
    /// Returns `Ok(false)` if capture was already enabled.
    ///
    /// # Errors
    ///
    /// Returns error if the pruning thread cannot be started. Nothing stays
    /// installed in that case.
    pub fn enable(&self) -> Result<bool> {
        {
            let mut active = self.active();
            if active.is_some() {
                return Ok(false);
            }

            let restores = interceptors::install(&self.host, &self.recorder);
            let timer = PruneTimer::start(
                Arc::clone(&self.recorder),
                self.settings.max_age,
                self.settings.prune_interval,
            )?;
            let panic_guard = self
                .settings
                .capture_panics
                .then(|| PanicHookGuard::install(self.host.clone()));

            self.recorder.state().enabled = true;
            *active = Some(ActiveCapture {
                restores,
                _timer: timer,
                panic_guard,
            });
        }

        tracing::info!(max_logs = self.settings.max_logs, "debug capture enabled");
        self.persist(true);
        self.recorder
            .record(LogEntry::new(LogLevel::Info, LogCategory::System, "Debug mode enabled"));
        Ok(true)
    }

    /// Remove interceptors, stop pruning, clear the buffer and persist the flag.
    ///
    /// Returns `false` if capture was already disabled.
    pub fn disable(&self) -> bool {
        {
            // Held until the primitives are restored, so a concurrent enable
            // cannot install decorators that the restore then discards.
            let mut active = self.active();
            let Some(installed) = active.take() else {
                return false;
            };
            {
                let mut state = self.recorder.state();
                state.enabled = false;
                state.buffer.clear();
            }
            drop(installed);
        }

        tracing::info!("debug capture disabled");
        self.persist(false);
        true
    }

    /// Enable capture if the persisted flag says so.
    ///
    /// # Errors
    ///
    /// Returns error if enabling fails. An unreadable flag is treated as off.
    pub fn restore_from_storage(&self) -> Result<bool> {
        match self.host.storage.original().get(DEBUG_MODE_KEY) {
            Ok(Some(flag)) if flag == "true" => self.enable(),
            Ok(_) => Ok(false),
            Err(err) => {
                tracing::warn!(error = %err, "could not read persisted debug flag");
                self.host
                    .console()
                    .warn(&format!("Failed to read debug mode setting: {err}"));
                Ok(false)
            }
        }
    }

    fn persist(&self, enabled: bool) {
        let value = if enabled { "true" } else { "false" };
        if let Err(err) = self.host.storage.original().set(DEBUG_MODE_KEY, value, None) {
            tracing::warn!(error = %err, "could not persist debug flag");
            self.host
                .console()
                .warn(&format!("Failed to save debug mode setting: {err}"));
        }
    }

    /// Record an entry without data. Returns whether it was kept.
    pub fn log(&self, level: LogLevel, category: LogCategory, message: impl Into<String>) -> bool {
        self.recorder.record(LogEntry::new(level, category, message))
    }

    /// Record an entry with structured data bounded to the byte budget.
    pub fn log_with<T: Serialize + ?Sized>(
        &self,
        level: LogLevel,
        category: LogCategory,
        message: impl Into<String>,
        data: &T,
    ) -> bool {
        let data = self.recorder.bound(data);
        self.recorder
            .record(LogEntry::new(level, category, message).with_data(data))
    }

    pub fn debug(&self, category: LogCategory, message: impl Into<String>) -> bool {
        self.log(LogLevel::Debug, category, message)
    }

    pub fn info(&self, category: LogCategory, message: impl Into<String>) -> bool {
        self.log(LogLevel::Info, category, message)
    }

    pub fn warn(&self, category: LogCategory, message: impl Into<String>) -> bool {
        self.log(LogLevel::Warn, category, message)
    }

    pub fn error(&self, category: LogCategory, message: impl Into<String>) -> bool {
        self.log(LogLevel::Error, category, message)
    }

    /// Record a user interaction.
    pub fn user_action<T: Serialize + ?Sized>(&self, action: &str, data: &T) -> bool {
        self.log_with(
            LogLevel::Info,
            LogCategory::User,
            format!("User action: {action}"),
            data,
        )
    }

    /// Buffered entries, most recent first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        self.recorder.state().buffer.snapshot()
    }

    #[must_use]
    pub fn snapshot_filtered(&self, filter: &LogFilter) -> Vec<Arc<LogEntry>> {
        self.snapshot()
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect()
    }

    /// Listen for new entries.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.recorder.subscribers.subscribe(Arc::new(listener))
    }

    /// Listen for new entries matching `filter`.
    pub fn subscribe_filtered<F>(&self, filter: LogFilter, listener: F) -> Subscription
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.subscribe(move |entry| {
            if filter.matches(entry) {
                listener(entry);
            }
        })
    }

    /// Drop entries older than the age horizon now.
    pub fn prune_now(&self) -> usize {
        self.recorder.prune(cutoff(self.settings.max_age))
    }

    /// Drop entries stamped before `cutoff`.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        self.recorder.prune(cutoff)
    }

    pub fn clear(&self) {
        self.recorder.state().buffer.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recorder.state().buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for DebugCapture {
    fn drop(&mut self) {
        let mut active = self.active();
        if let Some(installed) = active.take() {
            self.recorder.state().enabled = false;
            drop(installed);
        }
    }
}

impl std::fmt::Debug for DebugCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugCapture")
            .field("enabled", &self.is_enabled())
            .field("entries", &self.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HttpRequest, KeyValueStore, MemoryStore};
    use crate::test_utils::{FakeTransport, RecordingConsole};
    use serde_json::json;

    fn capture_with(settings: CaptureSettings) -> (DebugCapture, Arc<MemoryStore>, Arc<RecordingConsole>) {
        let store = Arc::new(MemoryStore::new());
        let console = Arc::new(RecordingConsole::new());
        let host = Host::builder()
            .http(Arc::new(FakeTransport::ok(200, r#"{"ok":true}"#)))
            .console(console.clone())
            .storage(store.clone())
            .build()
            .expect("host");
        (DebugCapture::new(host, settings), store, console)
    }

    fn capture() -> (DebugCapture, Arc<MemoryStore>, Arc<RecordingConsole>) {
        capture_with(CaptureSettings::default())
    }

    #[test]
    fn starts_disabled_and_ignores_entries() {
        let (capture, _, _) = capture();
        assert!(!capture.is_enabled());
        assert!(!capture.info(LogCategory::System, "ignored"));
        assert!(capture.is_empty());
    }

    #[test]
    fn enable_records_synthetic_entry_and_persists() {
        let (capture, store, _) = capture();
        assert!(capture.enable().expect("enable"));
        let entries = capture.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message(), "Debug mode enabled");
        assert_eq!(entries[0].level(), LogLevel::Info);
        assert_eq!(entries[0].category(), LogCategory::System);
        assert_eq!(store.get(DEBUG_MODE_KEY).expect("get").as_deref(), Some("true"));
        assert!(!capture.enable().expect("second enable"));
    }

    #[test]
    fn disable_clears_restores_and_persists() {
        let (capture, store, _) = capture();
        capture.enable().expect("enable");
        assert!(capture.host().is_decorated());
        assert!(capture.disable());
        assert!(capture.is_empty());
        assert!(!capture.host().is_decorated());
        assert_eq!(store.get(DEBUG_MODE_KEY).expect("get").as_deref(), Some("false"));
        assert!(!capture.disable());
    }

    #[test]
    fn cycles_never_double_wrap() {
        let (capture, _, console) = capture();
        for _ in 0..3 {
            capture.enable().expect("enable");
            capture.disable();
        }
        capture.enable().expect("enable");
        assert_eq!(capture.host().console.wrap_depth(), 1);

        capture.host().console().info("one call");
        let console_entries = capture.snapshot_filtered(&LogFilter::new().search("one call"));
        assert_eq!(console_entries.len(), 1);
        assert_eq!(console.lines().len(), 1);
    }

    #[test]
    fn restore_from_storage_honours_flag() {
        let (capture, store, _) = capture();
        store.set(DEBUG_MODE_KEY, "true", None).expect("set");
        assert!(capture.restore_from_storage().expect("restore"));
        assert!(capture.is_enabled());

        let (other, other_store, _) = self::capture();
        other_store.set(DEBUG_MODE_KEY, "false", None).expect("set");
        assert!(!other.restore_from_storage().expect("restore"));
    }

    #[test]
    fn storage_writes_are_mirrored() {
        let (capture, _, _) = capture();
        capture.enable().expect("enable");
        capture.host().store().set("theme", "dark", None).expect("set");
        capture.host().cookie_jar().set_cookie("sid=1; Path=/");

        let state = capture.snapshot_filtered(&LogFilter::new().category(LogCategory::State));
        assert_eq!(state.len(), 2);
        assert_eq!(state[1].message(), "Storage set: theme");
        assert_eq!(state[1].data(), Some(&json!({"key": "theme", "value": "dark"})));
        assert_eq!(state[0].data(), Some(&json!({"cookie": "sid=1; Path=/"})));
    }

    #[test]
    fn errors_and_rejections_are_recorded() {
        let (capture, _, _) = capture();
        capture.enable().expect("enable");
        let claimed = capture
            .host()
            .report_error(&crate::host::ErrorReport::new("boom").at("app.rs", 3, 7).with_trace("a\nb"));
        assert!(!claimed);
        capture.host().report_rejection(&json!({"message": "nope"}));

        let errors = capture.snapshot_filtered(&LogFilter::new().category(LogCategory::Error));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message(), "Unhandled rejection: nope");
        assert_eq!(errors[1].message(), "boom");
        assert_eq!(errors[1].data().and_then(|d| d.get("line")), Some(&json!(3)));
        assert_eq!(errors[1].trace(), Some("a\nb"));
    }

    #[tokio::test]
    async fn network_calls_produce_request_and_response_entries() {
        let (capture, _, _) = capture();
        capture.enable().expect("enable");
        let response = capture
            .host()
            .fetch(HttpRequest::get("https://api.example.test/v1"))
            .await
            .expect("response");
        assert_eq!(response.status, 200);

        let network = capture.snapshot_filtered(&LogFilter::new().category(LogCategory::Network));
        assert_eq!(network.len(), 2);
        assert_eq!(network[1].message(), "→ GET https://api.example.test/v1");
        assert!(network[0].message().starts_with("← 200 https://api.example.test/v1 ("));
        let id = network[1].data().and_then(|d| d.get("id")).cloned();
        assert!(id.is_some());
        assert_eq!(network[0].data().and_then(|d| d.get("id")).cloned(), id);
        assert_eq!(network[0].data().and_then(|d| d.get("body")), Some(&json!({"ok": true})));
    }

    #[test]
    fn subscribers_see_new_entries_and_filters_apply() {
        let (capture, _, _) = capture();
        capture.enable().expect("enable");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors_only = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let e = Arc::clone(&errors_only);
        let _all = capture.subscribe(move |entry| s.lock().expect("lock").push(entry.message().to_string()));
        let _errs = capture.subscribe_filtered(LogFilter::new().level(LogLevel::Error), move |entry| {
            e.lock().expect("lock").push(entry.message().to_string());
        });

        capture.info(LogCategory::User, "clicked");
        capture.error(LogCategory::System, "failed");

        assert_eq!(*seen.lock().expect("lock"), ["clicked", "failed"]);
        assert_eq!(*errors_only.lock().expect("lock"), ["failed"]);
    }

    #[test]
    fn listener_that_logs_is_bounded() {
        let (capture, _, _) = capture();
        let capture = Arc::new(capture);
        capture.enable().expect("enable");
        let inner = Arc::clone(&capture);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sub = capture.subscribe(move |entry| {
            s.lock().expect("lock").push(entry.message().to_string());
            inner.debug(LogCategory::System, "listener echo");
        });
        capture.info(LogCategory::System, "trigger");
        assert_eq!(*seen.lock().expect("lock"), ["trigger", "listener echo"]);
        assert_eq!(capture.snapshot_filtered(&LogFilter::new().search("listener echo")).len(), 2);
        sub.unsubscribe();
        capture.disable();
    }

    #[test]
    fn listener_on_one_capture_feeds_another() {
        let (a, _, _) = capture();
        let (b, _, _) = capture();
        let b = Arc::new(b);
        a.enable().expect("enable a");
        b.enable().expect("enable b");

        let b_seen = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&b_seen);
        let _b_sub = b.subscribe(move |entry| seen.lock().expect("lock").push(entry.message().to_string()));
        let forward = Arc::clone(&b);
        let _a_sub = a.subscribe(move |entry| {
            forward.info(LogCategory::System, format!("from a: {}", entry.message()));
        });

        a.info(LogCategory::User, "clicked");
        assert_eq!(*b_seen.lock().expect("lock"), ["from a: clicked"]);
        assert_eq!(b.snapshot_filtered(&LogFilter::new().search("from a")).len(), 1);
    }

    #[test]
    fn concurrent_toggling_keeps_decoration_consistent() {
        let (capture, _, _) = capture_with(CaptureSettings {
            max_logs: 10,
            ..CaptureSettings::default()
        });
        std::thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        capture.enable().expect("enable");
                        capture.disable();
                    }
                });
            }
            for _ in 0..2 {
                scope.spawn(|| {
                    for i in 0..200 {
                        capture.info(LogCategory::System, format!("m{i}"));
                        assert!(capture.len() <= 10);
                    }
                });
            }
        });

        assert!(!capture.host().is_decorated());
        capture.enable().expect("enable");
        assert!(capture.host().is_decorated());
        assert_eq!(capture.host().console.wrap_depth(), 1);
        capture.host().store().set("after", "1", None).expect("set");
        assert_eq!(capture.snapshot_filtered(&LogFilter::new().search("Storage set: after")).len(), 1);
        capture.disable();
        assert!(!capture.host().is_decorated());
    }

    #[test]
    fn capacity_bound_applies() {
        let (capture, _, _) = capture_with(CaptureSettings {
            max_logs: 5,
            ..CaptureSettings::default()
        });
        capture.enable().expect("enable");
        for i in 0..20 {
            capture.info(LogCategory::System, format!("m{i}"));
        }
        assert_eq!(capture.len(), 5);
        assert_eq!(capture.snapshot()[0].message(), "m19");
    }

    #[test]
    fn prune_now_drops_aged_entries() {
        let (capture, _, _) = capture_with(CaptureSettings {
            max_age: Duration::from_millis(0),
            ..CaptureSettings::default()
        });
        capture.enable().expect("enable");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(capture.prune_now(), 1);
        assert!(capture.is_empty());
    }

    #[test]
    fn timer_prunes_while_enabled() {
        let (capture, _, _) = capture_with(CaptureSettings {
            max_age: Duration::from_millis(1),
            prune_interval: Duration::from_millis(10),
            ..CaptureSettings::default()
        });
        capture.enable().expect("enable");
        std::thread::sleep(Duration::from_millis(200));
        assert!(capture.is_empty());
        capture.disable();
    }

    #[test]
    fn user_action_is_recorded_with_bounded_data() {
        let (capture, _, _) = capture_with(CaptureSettings {
            max_data_bytes: 64,
            ..CaptureSettings::default()
        });
        capture.enable().expect("enable");
        capture.user_action("export", &json!({"payload": "x".repeat(500)}));
        let entry = &capture.snapshot()[0];
        assert_eq!(entry.category(), LogCategory::User);
        assert_eq!(entry.message(), "User action: export");
        let size = entry.data().map(|d| d.to_string().len()).unwrap_or_default();
        assert!(size <= 64);
    }

    #[test]
    fn dropping_capture_restores_primitives_without_persisting() {
        let (capture, store, _) = capture();
        let host = capture.host().clone();
        capture.enable().expect("enable");
        drop(capture);
        assert!(!host.is_decorated());
        assert_eq!(store.get(DEBUG_MODE_KEY).expect("get").as_deref(), Some("true"));
    }
}
