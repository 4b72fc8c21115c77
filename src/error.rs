use thiserror::Error;

use crate::config::ConfigError;
use crate::graph::subgraph::UnknownRootError;
use crate::index::IndexError;

#[derive(Debug, Error)]
pub enum ApkGraphError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error(transparent)]
    UnknownRoot(#[from] UnknownRootError),
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ApkGraphError>;
