use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, Result};
use crate::core::package::DependencyExpr;
use crate::core::version::VersionReq;
use crate::index::{IndexFormat, IndexSource};

pub const DEFAULT_ARCH: &str = "x86_64";
pub const DEFAULT_TEST_REPO: &str = "test_graph.txt";

/// Contents of `apkgraph.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    pub settings: Settings,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Default root package for `show`.
    pub package_name: Option<String>,
    pub repository_url: Option<String>,
    pub arch: Option<String>,
    /// Constraint on the root package, e.g. `>=1.36` or a bare version.
    pub version: Option<String>,
    pub test_mode: bool,
    pub test_repo_path: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: Option<String>,
    pub direction: Option<String>,
    pub path: Option<PathBuf>,
    pub template: Option<PathBuf>,
}

impl Settings {
    pub fn arch(&self) -> &str {
        self.arch.as_deref().unwrap_or(DEFAULT_ARCH)
    }

    /// Picks the index source: test repository, then local index, then remote
    /// repository. Relative paths are taken from `base_dir`.
    pub fn index_source(&self, base_dir: &Path) -> Result<(IndexSource, IndexFormat)> {
        if self.test_mode {
            let path = self
                .test_repo_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEST_REPO));
            return Ok((IndexSource::File(base_dir.join(path)), IndexFormat::Simple));
        }
        if let Some(path) = &self.index_path {
            return Ok((IndexSource::File(base_dir.join(path)), IndexFormat::Apkindex));
        }
        if let Some(url) = self.repository_url.as_deref().filter(|url| !url.is_empty()) {
            return Ok((IndexSource::from_input(url, self.arch()), IndexFormat::Apkindex));
        }
        Err(ConfigError::MissingSetting(
            "settings.repository_url (or settings.index_path, or settings.test_mode)".to_string(),
        ))
    }

    /// The configured root as a dependency expression, so it can be matched
    /// against the index like any other requirement.
    pub fn root_requirement(&self) -> Result<Option<DependencyExpr>> {
        let Some(name) = self.package_name.as_deref() else {
            return Ok(None);
        };
        let Some(version) = self.version.as_deref().map(str::trim).filter(|v| !v.is_empty())
        else {
            return Ok(Some(DependencyExpr::new(name)));
        };

        let split = version
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '~'))
            .unwrap_or(version.len());
        let (op, number) = version.split_at(split);
        let op = if op.is_empty() { "=" } else { op };
        let req = VersionReq::parse(op, number.trim()).map_err(|err| {
            ConfigError::InvalidSetting {
                key: "settings.version".to_string(),
                reason: err.to_string(),
            }
        })?;
        Ok(Some(DependencyExpr::with_constraint(name, req)))
    }
}
