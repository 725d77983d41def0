//! Storage for configuration and the durable key-value store.

pub mod config;
pub mod kv;
pub mod paths;

pub use config::{
    Config, ConfigSource, ConfigSources, ENV_CONFIG, ENV_DATA_DIR, ENV_FORMAT, ENV_MAX_LOGS,
    ENV_NO_COLOR, ENV_NO_COLOR_STD, ENV_PRETTY, ENV_TIMEOUT, ENV_VERBOSE, ResolvedConfig,
};
pub use kv::FileStore;
pub use paths::AppPaths;
