pub mod resolve;
pub mod settings;

pub use resolve::{find_config_path, load_config, load_effective_config, LoadedConfig};
pub use settings::{FileConfig, OutputConfig, Settings, DEFAULT_ARCH, DEFAULT_TEST_REPO};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config at {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing setting: {0}")]
    MissingSetting(String),
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
