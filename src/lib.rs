//! telltale - debug-event capture and LLM token usage accounting.
//!
//! Two independent subsystems share one host abstraction:
//!
//! - [`capture`]: while enabled, decorates the [`host`] primitives (HTTP,
//!   console, error reporting, storage, cookies) and records what flows
//!   through them as bounded, filterable log entries.
//! - [`usage`]: a persisted ledger of token usage per provider and model,
//!   aggregated over rolling windows against configured limits.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod capture;
pub mod cli;
pub mod core;
pub mod error;
pub mod host;
pub mod render;
pub mod storage;
pub mod usage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, Result, TelltaleError};

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
