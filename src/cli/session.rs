//! Per-invocation wiring of host, capture and usage ledger.

use std::sync::Arc;
use std::time::Duration;

use crate::capture::{DebugCapture, Subscription};
use crate::error::Result;
use crate::host::Host;
use crate::storage::{FileStore, ResolvedConfig};
use crate::usage::UsageStore;

/// Everything a command needs, built from resolved configuration.
///
/// The persisted debug flag is honoured on open, so an enabled capture
/// observes the command's own storage and network activity. Captured
/// entries are mirrored to diagnostics at debug level.
pub struct Session {
    config: ResolvedConfig,
    host: Host,
    capture: DebugCapture,
    ledger: Arc<UsageStore>,
    _mirror: Option<Subscription>,
}

impl Session {
    /// Open a session using the configured HTTP timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the host cannot be built or config limits cannot be
    /// persisted.
    pub fn open(config: ResolvedConfig) -> Result<Self> {
        Self::open_with_timeout(config, None)
    }

    /// Open a session, overriding the HTTP timeout.
    ///
    /// # Errors
    ///
    /// See [`Session::open`].
    pub fn open_with_timeout(config: ResolvedConfig, timeout: Option<Duration>) -> Result<Self> {
        let store = Arc::new(FileStore::new(&config.storage_path));
        let host = Host::builder()
            .storage(store)
            .timeout(timeout.unwrap_or(config.timeout))
            .build()?;

        let capture = DebugCapture::new(host.clone(), config.capture.clone());
        capture.restore_from_storage()?;
        let mirror = capture.is_enabled().then(|| {
            capture.subscribe(|entry| {
                tracing::debug!(
                    target: "telltale::capture",
                    severity = %entry.level(),
                    category = %entry.category(),
                    "{}",
                    entry.message()
                );
            })
        });

        let ledger = Arc::new(UsageStore::load_with_retention(
            host.clone(),
            config.retention_days,
        ));
        if ledger.apply_limits(&config.limits)? {
            tracing::debug!(count = config.limits.len(), "applied limits from config file");
        }

        Ok(Self {
            config,
            host,
            capture,
            ledger,
            _mirror: mirror,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    #[must_use]
    pub const fn host(&self) -> &Host {
        &self.host
    }

    #[must_use]
    pub const fn capture(&self) -> &DebugCapture {
        &self.capture
    }

    #[must_use]
    pub fn ledger(&self) -> Arc<UsageStore> {
        Arc::clone(&self.ledger)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("storage_path", &self.config.storage_path)
            .field("capture_enabled", &self.capture.is_enabled())
            .field("events", &self.ledger.len())
            .finish_non_exhaustive()
    }
}
