//! Synchronous delivery of new entries to listeners.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::ThreadId;

use super::entry::LogEntry;

/// A listener callback.
pub type Listener = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Levels of entries recorded from inside a listener that are still
/// delivered. Deeper ones are buffered but not delivered.
const MAX_NESTED_DELIVERY: usize = 1;

/// One thread's delivery pass over a registry.
#[derive(Default)]
struct Dispatch {
    depth: usize,
    pending: VecDeque<(usize, LogEntry)>,
}

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<u64, Listener>>,
    dispatching: Mutex<HashMap<ThreadId, Dispatch>>,
}

impl Listeners {
    fn dispatching(&self) -> MutexGuard<'_, HashMap<ThreadId, Dispatch>> {
        self.dispatching.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ends this thread's delivery pass, including on unwind.
struct DispatchGuard<'a> {
    listeners: &'a Listeners,
    thread: ThreadId,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.listeners.dispatching().remove(&self.thread);
    }
}

/// Registry of listeners notified on each appended entry.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Listeners>,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is unsubscribed or dropped.
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        Subscription {
            id,
            registry: Some(Arc::downgrade(&self.inner)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `entry` to every listener registered at call time.
    ///
    /// An entry notified from inside one of this registry's listeners is
    /// queued and delivered once the current entry has reached every
    /// listener. Entries produced while delivering a queued entry past
    /// [`MAX_NESTED_DELIVERY`] levels are not delivered, so a listener that
    /// records on every entry terminates.
    pub fn notify(&self, entry: &LogEntry) {
        let thread = std::thread::current().id();
        {
            let mut dispatching = self.inner.dispatching();
            if let Some(dispatch) = dispatching.get_mut(&thread) {
                if dispatch.depth < MAX_NESTED_DELIVERY {
                    dispatch.pending.push_back((dispatch.depth + 1, entry.clone()));
                } else {
                    tracing::trace!(depth = dispatch.depth, "nested capture entry not delivered");
                }
                return;
            }
            dispatching.insert(thread, Dispatch::default());
        }
        let _guard = DispatchGuard {
            listeners: &self.inner,
            thread,
        };

        self.deliver(entry);
        while let Some((depth, next)) = self.next_pending(thread) {
            if let Some(dispatch) = self.inner.dispatching().get_mut(&thread) {
                dispatch.depth = depth;
            }
            self.deliver(&next);
        }
    }

    fn next_pending(&self, thread: ThreadId) -> Option<(usize, LogEntry)> {
        self.inner
            .dispatching()
            .get_mut(&thread)
            .and_then(|dispatch| dispatch.pending.pop_front())
    }

    fn deliver(&self, entry: &LogEntry) {
        let listeners: Vec<(u64, Listener)> = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(entry))).is_err() {
                tracing::warn!(subscriber = id, "log subscriber panicked; continuing delivery");
            }
        }
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Handle for a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Option<Weak<Listeners>>,
}

impl Subscription {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keep the listener registered for the registry's lifetime.
    pub fn detach(mut self) {
        self.registry = None;
    }

    fn remove(&mut self) {
        if let Some(inner) = self.registry.take().and_then(|weak| weak.upgrade()) {
            inner
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}
