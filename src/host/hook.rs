//! Swappable primitive slots.
//!
//! A [`Hook`] owns the implementation a primitive was constructed with and the
//! implementation currently installed. Decorating always wraps the
//! construction-time original, so repeated install/restore cycles can never
//! stack wrappers on top of each other.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

struct HookInner<T: ?Sized> {
    name: &'static str,
    original: Arc<T>,
    current: RwLock<Arc<T>>,
    active: AtomicUsize,
}

/// A primitive slot that can be decorated and restored.
pub struct Hook<T: ?Sized> {
    inner: Arc<HookInner<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Hook<T> {
    /// Create a hook around the original primitive.
    #[must_use]
    pub fn new(name: &'static str, original: Arc<T>) -> Self {
        Self {
            inner: Arc::new(HookInner {
                name,
                current: RwLock::new(Arc::clone(&original)),
                original,
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Name of the primitive, used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// The implementation callers should use right now.
    #[must_use]
    pub fn current(&self) -> Arc<T> {
        let guard = self
            .inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// The implementation the hook was constructed with.
    #[must_use]
    pub fn original(&self) -> Arc<T> {
        Arc::clone(&self.inner.original)
    }

    /// Number of decorations currently installed.
    #[must_use]
    pub fn wrap_depth(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Whether a decoration is currently installed.
    #[must_use]
    pub fn is_decorated(&self) -> bool {
        self.wrap_depth() > 0
    }

    /// Install a decorator built from the original primitive.
    ///
    /// Returns the installed wrapper and a guard that puts the original back
    /// when restored or dropped. Installing over an existing decoration
    /// replaces it rather than wrapping it.
    pub fn decorate<F>(&self, decorator: F) -> (Arc<T>, Restore)
    where
        F: FnOnce(Arc<T>) -> Arc<T>,
    {
        let wrapped = decorator(self.original());
        {
            let mut current = self
                .inner
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *current = Arc::clone(&wrapped);
        }
        // Only one wrapper can ever be live because each wraps the original.
        self.inner.active.store(1, Ordering::SeqCst);
        tracing::trace!(primitive = self.inner.name, "primitive decorated");

        let inner = Arc::clone(&self.inner);
        let restore = Restore {
            name: self.inner.name,
            undo: Some(Box::new(move || {
                let mut current = inner.current.write().unwrap_or_else(PoisonError::into_inner);
                *current = Arc::clone(&inner.original);
                inner.active.store(0, Ordering::SeqCst);
                tracing::trace!(primitive = inner.name, "primitive restored");
            })),
        };
        (wrapped, restore)
    }
}

impl<T: ?Sized> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.inner.name)
            .field("active", &self.inner.active.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Guard returned by [`Hook::decorate`]; restores the original on drop.
#[must_use = "dropping a Restore immediately undoes the decoration"]
pub struct Restore {
    name: &'static str,
    undo: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Restore {
    /// Name of the primitive this guard restores.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Put the original primitive back now.
    pub fn restore(mut self) {
        if let Some(undo) = self.undo.take() {
            undo();
        }
    }
}

impl Drop for Restore {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            undo();
        }
    }
}

impl std::fmt::Debug for Restore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Restore")
            .field("name", &self.name)
            .field("pending", &self.undo.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Plain;
    impl Greeter for Plain {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct Loud(Arc<dyn Greeter>);
    impl Greeter for Loud {
        fn greet(&self) -> String {
            format!("{}!", self.0.greet())
        }
    }

    fn hook() -> Hook<dyn Greeter> {
        Hook::new("greeter", Arc::new(Plain))
    }

    #[test]
    fn decorate_installs_wrapper_and_restore_removes_it() {
        let hook = hook();
        let (wrapped, restore) = hook.decorate(|orig| Arc::new(Loud(orig)));
        assert_eq!(wrapped.greet(), "hello!");
        assert_eq!(hook.current().greet(), "hello!");
        assert_eq!(hook.wrap_depth(), 1);

        restore.restore();
        assert_eq!(hook.current().greet(), "hello");
        assert_eq!(hook.wrap_depth(), 0);
    }

    #[test]
    fn dropping_guard_restores() {
        let hook = hook();
        {
            let _guard = hook.decorate(|orig| Arc::new(Loud(orig))).1;
            assert!(hook.is_decorated());
        }
        assert!(!hook.is_decorated());
        assert_eq!(hook.current().greet(), "hello");
    }

    #[test]
    fn repeated_cycles_never_stack() {
        let hook = hook();
        for _ in 0..5 {
            let (_, restore) = hook.decorate(|orig| Arc::new(Loud(orig)));
            drop(restore);
        }
        let (_, _restore) = hook.decorate(|orig| Arc::new(Loud(orig)));
        assert_eq!(hook.current().greet(), "hello!");
        assert_eq!(hook.wrap_depth(), 1);
    }

    #[test]
    fn decorating_twice_wraps_original_not_current() {
        let hook = hook();
        let (_, _first) = hook.decorate(|orig| Arc::new(Loud(orig)));
        let (_, _second) = hook.decorate(|orig| Arc::new(Loud(orig)));
        assert_eq!(hook.current().greet(), "hello!");
        assert_eq!(hook.wrap_depth(), 1);
    }
}
