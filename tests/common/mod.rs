//! Shared helpers for integration tests.
//!
//! - `log_capture`: collects `tracing` events emitted during a test
//! - [`Sandbox`]: an isolated config/data directory for CLI runs
#![allow(dead_code)]

pub mod log_capture;

use assert_cmd::Command;
use telltale::storage::{ENV_CONFIG, ENV_DATA_DIR};
use telltale::test_utils::TestDir;

/// Isolated config file and data directory for driving the binary.
pub struct Sandbox {
    dir: TestDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self { dir: TestDir::new() }
    }

    /// Sandbox with `config.toml` written up front.
    pub fn with_config(toml: &str) -> Self {
        let sandbox = Self::new();
        sandbox.dir.create_file("config.toml", toml);
        sandbox
    }

    pub fn dir(&self) -> &TestDir {
        &self.dir
    }

    /// The durable store written by the binary.
    pub fn storage_json(&self) -> serde_json::Value {
        let raw = self.dir.read_file("data/storage.json").expect("storage file");
        serde_json::from_str(&raw).expect("storage json")
    }

    /// `telltale` with environment pointed at this sandbox and color off.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("telltale").expect("binary");
        cmd.env_clear()
            .env(ENV_CONFIG, self.dir.file_path("config.toml"))
            .env(ENV_DATA_DIR, self.dir.file_path("data"))
            .env("NO_COLOR", "1")
            .env("HOME", self.dir.path());
        cmd
    }
}
