//! Durable usage ledger.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};

use super::aggregate::{UsageStats, aggregate};
use super::event::{UsageDocument, UsageEvent, UsageWindow};
use crate::error::{Result, TelltaleError};
use crate::host::Host;

/// Storage key holding the ledger document.
pub const USAGE_STORE_KEY: &str = "usage-store";

/// Days of history the ledger keeps.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Ledger of metered events plus per-provider limits.
///
/// Mutations are applied and serialized under the ledger lock, then written
/// through the host's key-value store after it is released. Store writes can
/// reach capture listeners, and those may query the ledger. Writes are
/// ordered by the generation taken under the ledger lock; an older document
/// never replaces a newer one.
pub struct UsageStore {
    host: Host,
    retention_days: u32,
    document: Mutex<UsageDocument>,
    generation: AtomicU64,
    /// Generation of the last document handed to the store.
    written: Mutex<u64>,
}

/// A serialized document and the generation it was taken at.
struct Snapshot {
    generation: u64,
    json: String,
}

impl UsageStore {
    /// Load the ledger with the default retention.
    #[must_use]
    pub fn load(host: Host) -> Self {
        Self::load_with_retention(host, DEFAULT_RETENTION_DAYS)
    }

    /// Load the ledger, falling back to an empty one on any read failure.
    #[must_use]
    pub fn load_with_retention(host: Host, retention_days: u32) -> Self {
        let retention_days = retention_days.max(1);
        let mut document = match read_document(&host) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!(error = %err, "usage ledger unreadable, starting empty");
                host.console()
                    .warn(&format!("Failed to load usage data: {err}"));
                UsageDocument::default()
            }
        };
        let cutoff = retention_cutoff(Utc::now(), retention_days);
        document.usage_data.retain(|e| e.timestamp() >= cutoff);
        tracing::debug!(
            events = document.usage_data.len(),
            limits = document.limits.len(),
            "usage ledger loaded"
        );

        Self {
            host,
            retention_days,
            document: Mutex::new(document),
            generation: AtomicU64::new(0),
            written: Mutex::new(0),
        }
    }

    fn document(&self) -> MutexGuard<'_, UsageDocument> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Append an event and drop history past the retention horizon.
    ///
    /// # Errors
    ///
    /// Returns error if persisting fails. The in-memory ledger is updated
    /// regardless.
    pub fn record(&self, event: UsageEvent) -> Result<()> {
        tracing::debug!(
            provider = event.provider(),
            model = event.model(),
            total = event.total_tokens(),
            "recording usage"
        );
        let snapshot = {
            let mut document = self.document();
            document.usage_data.push(event);
            let cutoff = retention_cutoff(Utc::now(), self.retention_days);
            document.usage_data.retain(|e| e.timestamp() >= cutoff);
            self.snapshot(&document)
        };
        self.persist(snapshot)
    }

    /// Set a provider's token allowance, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns error if persisting fails.
    pub fn set_limit(&self, provider: &str, limit: u64) -> Result<()> {
        let snapshot = {
            let mut document = self.document();
            document.limits.insert(provider.to_string(), limit);
            self.snapshot(&document)
        };
        self.persist(snapshot)
    }

    /// Remove a provider's allowance. Returns whether one was set.
    ///
    /// # Errors
    ///
    /// Returns error if persisting fails.
    pub fn remove_limit(&self, provider: &str) -> Result<bool> {
        let snapshot = {
            let mut document = self.document();
            if document.limits.remove(provider).is_none() {
                return Ok(false);
            }
            self.snapshot(&document)
        };
        self.persist(snapshot)?;
        Ok(true)
    }

    /// Overlay configured limits, persisting only if something changed.
    ///
    /// # Errors
    ///
    /// Returns error if persisting fails.
    pub fn apply_limits(&self, limits: &BTreeMap<String, u64>) -> Result<bool> {
        let snapshot = {
            let mut document = self.document();
            let mut changed = false;
            for (provider, limit) in limits {
                if document.limits.get(provider) != Some(limit) {
                    document.limits.insert(provider.clone(), *limit);
                    changed = true;
                }
            }
            if !changed {
                return Ok(false);
            }
            self.snapshot(&document)
        };
        self.persist(snapshot)?;
        Ok(true)
    }

    /// Drop every event. Limits are kept.
    ///
    /// # Errors
    ///
    /// Returns error if persisting fails.
    pub fn clear(&self) -> Result<()> {
        let snapshot = {
            let mut document = self.document();
            document.usage_data.clear();
            self.snapshot(&document)
        };
        self.persist(snapshot)
    }

    #[must_use]
    pub fn limits(&self) -> BTreeMap<String, u64> {
        self.document().limits.clone()
    }

    #[must_use]
    pub fn events(&self) -> Vec<UsageEvent> {
        self.document().usage_data.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.document().usage_data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate `window` now, bucketing days in local time.
    #[must_use]
    pub fn query(&self, window: UsageWindow) -> UsageStats {
        self.query_at(window, Utc::now(), &Local)
    }

    /// Aggregate `window` as of `now`, bucketing days in `tz`.
    #[must_use]
    pub fn query_at<Tz: TimeZone>(&self, window: UsageWindow, now: DateTime<Utc>, tz: &Tz) -> UsageStats {
        let document = self.document();
        aggregate(&document.usage_data, &document.limits, window, now, tz)
    }

    /// Serialize `document`. Call with the ledger lock held.
    fn snapshot(&self, document: &UsageDocument) -> Result<Snapshot> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let json = serde_json::to_string(document)?;
        Ok(Snapshot { generation, json })
    }

    /// Write `snapshot` unless a newer one has already been written. Call
    /// without the ledger lock.
    fn persist(&self, snapshot: Result<Snapshot>) -> Result<()> {
        let ttl = Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60);
        let result = snapshot.and_then(|snapshot| {
            let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
            if snapshot.generation <= *written {
                return Ok(());
            }
            self.host
                .store()
                .set(USAGE_STORE_KEY, &snapshot.json, Some(ttl))?;
            *written = snapshot.generation;
            Ok(())
        });
        if let Err(err) = &result {
            tracing::warn!(error = %err, "failed to persist usage ledger");
            self.host
                .console()
                .warn(&format!("Failed to save usage data: {err}"));
        }
        result
    }
}

impl std::fmt::Debug for UsageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageStore")
            .field("retention_days", &self.retention_days)
            .field("events", &self.len())
            .finish_non_exhaustive()
    }
}

fn read_document(host: &Host) -> Result<UsageDocument> {
    let Some(raw) = host.store().get(USAGE_STORE_KEY)? else {
        return Ok(UsageDocument::default());
    };
    serde_json::from_str(&raw).map_err(|e| TelltaleError::StorageCorrupt {
        key: USAGE_STORE_KEY.to_string(),
        message: e.to_string(),
    })
}

fn retention_cutoff(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(TimeDelta::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{KeyValueStore, MemoryStore};
    use crate::test_utils::{FailingStore, RecordingConsole};
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn host_with(store: Arc<dyn KeyValueStore>) -> (Host, Arc<RecordingConsole>) {
        let console = Arc::new(RecordingConsole::new());
        let host = Host::builder()
            .storage(store)
            .console(console.clone())
            .build()
            .expect("host");
        (host, console)
    }

    #[test]
    fn record_then_query_counts_once() {
        let (host, _) = host_with(Arc::new(MemoryStore::new()));
        let store = UsageStore::load(host);
        store.record(UsageEvent::new("A", "m", 40, 60)).expect("record");
        let first = store.query(UsageWindow::All);
        let second = store.query(UsageWindow::All);
        assert_eq!(first.used, 100);
        assert_eq!(first, second);
    }

    #[test]
    fn mutations_persist_and_reload() {
        let backing = Arc::new(MemoryStore::new());
        let (host, _) = host_with(backing.clone());
        let store = UsageStore::load(host.clone());
        store.record(UsageEvent::new("A", "m", 1, 2)).expect("record");
        store.set_limit("A", 1000).expect("limit");
        store.set_limit("A", 500).expect("limit");

        let reloaded = UsageStore::load(host);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.limits().get("A"), Some(&500));
        let raw = backing.get(USAGE_STORE_KEY).expect("get").expect("present");
        assert!(raw.contains("\"usageData\""));
        assert!(raw.contains("\"limits\""));
    }

    #[test]
    fn old_events_are_dropped_on_record() {
        let (host, _) = host_with(Arc::new(MemoryStore::new()));
        let store = UsageStore::load(host);
        let old = UsageEvent::new("A", "m", 5, 5).at(Utc::now() - TimeDelta::days(31));
        store.record(old).expect("record old");
        store.record(UsageEvent::new("A", "m", 1, 1)).expect("record new");
        assert_eq!(store.len(), 1);
        assert_eq!(store.query(UsageWindow::All).used, 2);
    }

    #[test]
    fn clear_keeps_limits() {
        let (host, _) = host_with(Arc::new(MemoryStore::new()));
        let store = UsageStore::load(host);
        store.set_limit("A", 10).expect("limit");
        store.record(UsageEvent::new("A", "m", 1, 1)).expect("record");
        store.clear().expect("clear");
        assert!(store.is_empty());
        assert_eq!(store.limits().len(), 1);
    }

    #[traced_test]
    #[test]
    fn load_reports_ledger_size() {
        let backing = Arc::new(MemoryStore::new());
        let (host, _) = host_with(backing);
        let store = UsageStore::load(host.clone());
        store.record(UsageEvent::new("A", "m", 1, 1)).expect("record");
        let _reloaded = UsageStore::load(host);
        assert!(logs_contain("usage ledger loaded"));
        assert!(logs_contain("events=1"));
    }

    #[traced_test]
    #[test]
    fn corrupt_document_falls_back_to_empty_with_warning() {
        let backing = Arc::new(MemoryStore::new());
        backing.set(USAGE_STORE_KEY, "{not json", None).expect("set");
        let (host, console) = host_with(backing);
        let store = UsageStore::load(host);
        assert!(store.is_empty());
        assert!(console.lines().iter().any(|l| l.contains("Failed to load usage data")));
        assert!(logs_contain("usage ledger unreadable"));
    }

    #[test]
    fn write_failure_still_updates_memory() {
        let (host, console) = host_with(Arc::new(FailingStore));
        let store = UsageStore::load(host);
        assert!(store.record(UsageEvent::new("A", "m", 3, 4)).is_err());
        assert_eq!(store.query(UsageWindow::All).used, 7);
        assert!(console.lines().iter().any(|l| l.contains("Failed to save usage data")));
    }

    #[test]
    fn apply_limits_only_persists_changes() {
        let (host, _) = host_with(Arc::new(MemoryStore::new()));
        let store = UsageStore::load(host);
        let limits: BTreeMap<String, u64> = [("A".to_string(), 100)].into();
        assert!(store.apply_limits(&limits).expect("apply"));
        assert!(!store.apply_limits(&limits).expect("apply again"));
        assert!(store.remove_limit("A").expect("remove"));
        assert!(!store.remove_limit("A").expect("remove again"));
    }

    #[test]
    fn listeners_can_query_while_a_write_is_captured() {
        use crate::capture::{CaptureSettings, DebugCapture, LogFilter};
        use std::sync::mpsc;

        let (host, _) = host_with(Arc::new(MemoryStore::new()));
        let capture = DebugCapture::new(host.clone(), CaptureSettings::default());
        capture.enable().expect("enable");
        let ledger = Arc::new(UsageStore::load(host));

        let observed = Arc::new(Mutex::new(Vec::new()));
        let (l, o) = (Arc::clone(&ledger), Arc::clone(&observed));
        let _sub = capture.subscribe_filtered(LogFilter::new().search(USAGE_STORE_KEY), move |_| {
            o.lock().expect("lock").push(l.query(UsageWindow::All).used);
        });

        let (done, finished) = mpsc::channel();
        let worker = Arc::clone(&ledger);
        std::thread::spawn(move || {
            let result = worker.record(UsageEvent::new("A", "m", 2, 3));
            let _ = done.send(result.is_ok());
        });
        let completed = finished
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("record finished");
        assert!(completed);
        assert_eq!(*observed.lock().expect("lock"), [5]);
    }

    #[test]
    fn concurrent_records_and_queries_agree() {
        let backing = Arc::new(MemoryStore::new());
        let (host, _) = host_with(backing);
        let store = UsageStore::load(host.clone());

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        store.record(UsageEvent::new("A", "m", 1, 1)).expect("record");
                    }
                });
            }
            for _ in 0..2 {
                scope.spawn(|| {
                    let mut last = 0;
                    for _ in 0..50 {
                        let used = store.query(UsageWindow::All).used;
                        assert!(used >= last);
                        assert_eq!(used % 2, 0);
                        last = used;
                    }
                });
            }
        });

        assert_eq!(store.query(UsageWindow::All).used, 200);
        let reloaded = UsageStore::load(host);
        assert_eq!(reloaded.len(), 100);
    }
}
