use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{ConfigError, FileConfig};

pub const CONFIG_FILE_NAME: &str = "apkgraph.toml";
pub const CONFIG_ENV: &str = "APKGRAPH_CONFIG";
pub const ARCH_ENV: &str = "APKGRAPH_ARCH";

/// A config file (or defaults) plus the directory relative paths resolve from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: Option<PathBuf>,
    pub base_dir: PathBuf,
    pub config: FileConfig,
}

/// `--config` flag, then `APKGRAPH_CONFIG`, then the nearest `apkgraph.toml`
/// among `start` and its ancestors. `Ok(None)` when nothing is found.
pub fn find_config_path(
    start: impl AsRef<Path>,
    explicit: Option<PathBuf>,
) -> Result<Option<PathBuf>, ConfigError> {
    let from_env = env::var_os(CONFIG_ENV).map(PathBuf::from);
    find_config_path_with(start.as_ref(), explicit, from_env)
}

fn find_config_path_with(
    start: &Path,
    explicit: Option<PathBuf>,
    from_env: Option<PathBuf>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit.or(from_env) {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }
        return Ok(Some(path));
    }

    Ok(start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file()))
}

pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

/// Discovers and loads the config, then applies environment overrides.
pub fn load_effective_config(
    start: impl AsRef<Path>,
    explicit: Option<PathBuf>,
) -> Result<LoadedConfig, ConfigError> {
    let start = start.as_ref();
    let mut loaded = match find_config_path(start, explicit)? {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            let config = load_config(&path)?;
            let base_dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| start.to_path_buf());
            LoadedConfig {
                path: Some(path),
                base_dir,
                config,
            }
        }
        None => {
            debug!("no config file found, using defaults");
            LoadedConfig {
                path: None,
                base_dir: start.to_path_buf(),
                config: FileConfig::default(),
            }
        }
    };

    if let Some(arch) = env::var(ARCH_ENV).ok().filter(|arch| !arch.is_empty()) {
        loaded.config.settings.arch = Some(arch);
    }
    Ok(loaded)
}
