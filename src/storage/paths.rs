//! Application paths for config and data.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Data directory.
    pub data: PathBuf,
}

impl AppPaths {
    /// Create paths for the telltale application.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("dev", "telltale", "telltale") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            let home = BaseDirs::new()
                .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
            Self {
                config: home.join(".config/telltale"),
                data: home.join(".local/share/telltale"),
            }
        }
    }

    /// Paths rooted at an explicit directory.
    #[must_use]
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config: root.join("config"),
            data: root.join("data"),
        }
    }

    /// Path to the config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Path to the durable key-value store.
    #[must_use]
    pub fn storage_file(&self) -> PathBuf {
        self.data.join("storage.json")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
