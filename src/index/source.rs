use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::MultiGzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use tar::Archive;
use thiserror::Error;
use tracing::{debug, info};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const INDEX_ENTRY: &str = "APKINDEX";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read index {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("archive {0} has no APKINDEX entry")]
    MissingEntry(String),
    #[error("failed to unpack archive {origin}: {source}")]
    Archive {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("index {0} is not valid UTF-8")]
    Encoding(String),
}

/// Where raw index text comes from. Reading it is the caller's job, never the graph engine's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    File(PathBuf),
    Repository { url: String, arch: String },
}

impl IndexSource {
    /// Treats `http://` and `https://` inputs as repository roots, anything else as a path.
    pub fn from_input(input: &str, arch: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            IndexSource::Repository {
                url: input.to_string(),
                arch: arch.to_string(),
            }
        } else {
            IndexSource::File(PathBuf::from(input))
        }
    }

    pub fn index_url(&self) -> Option<String> {
        match self {
            IndexSource::File(_) => None,
            IndexSource::Repository { url, arch } => Some(format!(
                "{}/{}/APKINDEX.tar.gz",
                url.trim_end_matches('/'),
                arch
            )),
        }
    }
}

impl fmt::Display for IndexSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexSource::File(path) => write!(f, "{}", path.display()),
            IndexSource::Repository { url, arch } => write!(f, "{url} ({arch})"),
        }
    }
}

pub fn load_index_text(source: &IndexSource) -> Result<String, IndexError> {
    match source {
        IndexSource::File(path) => read_local(path),
        IndexSource::Repository { .. } => {
            let url = source.index_url().unwrap_or_default();
            let bytes = download(&url)?;
            extract_index(&bytes, &url)
        }
    }
}

fn read_local(path: &Path) -> Result<String, IndexError> {
    let bytes = std::fs::read(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "read index file");
    let origin = path.display().to_string();
    if bytes.starts_with(&GZIP_MAGIC) {
        extract_index(&bytes, &origin)
    } else {
        String::from_utf8(bytes).map_err(|_| IndexError::Encoding(origin))
    }
}

fn download(url: &str) -> Result<Vec<u8>, IndexError> {
    info!(%url, "downloading APKINDEX");
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("fetching {url}"));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let http_err = |source| IndexError::Http {
        url: url.to_string(),
        source,
    };
    let result = Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .and_then(|client| client.get(url).send())
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.bytes())
        .map(|bytes| bytes.to_vec())
        .map_err(http_err);
    spinner.finish_and_clear();
    result
}

/// Unpacks an `APKINDEX.tar.gz`. Alpine ships the signature and the index as
/// separate gzip members, so every member is decoded before reading the tar stream.
pub fn extract_index(bytes: &[u8], origin: &str) -> Result<String, IndexError> {
    let archive_err = |source| IndexError::Archive {
        origin: origin.to_string(),
        source,
    };
    let mut archive = Archive::new(MultiGzDecoder::new(bytes));
    for entry in archive.entries().map_err(archive_err)? {
        let mut entry = entry.map_err(archive_err)?;
        let is_index = entry
            .path()
            .map(|path| path.as_os_str() == INDEX_ENTRY)
            .unwrap_or(false);
        if !is_index {
            continue;
        }
        let mut content = Vec::new();
        entry.read_to_end(&mut content).map_err(archive_err)?;
        return String::from_utf8(content).map_err(|_| IndexError::Encoding(origin.to_string()));
    }
    Err(IndexError::MissingEntry(origin.to_string()))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use crate::index::source::{extract_index, load_index_text, IndexError, IndexSource};

    fn unique_temp_path(prefix: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_nanos();
        let pid = std::process::id();
        std::env::temp_dir().join(format!("apkgraph-{prefix}-{pid}-{nanos}"))
    }

    fn tar_gz(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, body.as_bytes())
                .expect("append tar entry");
        }
        let tar_bytes = builder.into_inner().expect("finish tar");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).expect("gzip tar");
        encoder.finish().expect("finish gzip")
    }

    #[test]
    fn repository_source_builds_index_url() {
        let source = IndexSource::from_input(
            "https://dl-cdn.alpinelinux.org/alpine/v3.20/main/",
            "x86_64",
        );
        assert_eq!(
            source.index_url().as_deref(),
            Some("https://dl-cdn.alpinelinux.org/alpine/v3.20/main/x86_64/APKINDEX.tar.gz")
        );
        assert_eq!(
            IndexSource::from_input("./APKINDEX", "x86_64"),
            IndexSource::File("./APKINDEX".into())
        );
    }

    #[test]
    fn extracts_index_entry_from_archive() {
        let bytes = tar_gz(&[("DESCRIPTION", "v3.20"), ("APKINDEX", "P:a\nV:1\n")]);
        let text = extract_index(&bytes, "test").expect("extract");
        assert_eq!(text, "P:a\nV:1\n");
    }

    #[test]
    fn archive_without_index_is_an_error() {
        let bytes = tar_gz(&[("DESCRIPTION", "v3.20")]);
        let err = extract_index(&bytes, "test").expect_err("missing entry");
        assert!(matches!(err, IndexError::MissingEntry(_)));
    }

    #[test]
    fn loads_plain_and_compressed_files() {
        let plain = unique_temp_path("plain");
        fs::write(&plain, "P:a\nV:1\n").expect("write plain index");
        let text = load_index_text(&IndexSource::File(plain.clone())).expect("load plain");
        assert_eq!(text, "P:a\nV:1\n");

        let packed = unique_temp_path("packed");
        fs::write(&packed, tar_gz(&[("APKINDEX", "P:b\nV:2\n")])).expect("write archive");
        let text = load_index_text(&IndexSource::File(packed.clone())).expect("load archive");
        assert_eq!(text, "P:b\nV:2\n");

        let _ = fs::remove_file(plain);
        let _ = fs::remove_file(packed);
    }

    #[test]
    fn missing_file_reports_path() {
        let path = unique_temp_path("missing");
        let err = load_index_text(&IndexSource::File(path.clone())).expect_err("missing file");
        assert!(err.to_string().contains(&path.display().to_string()));
    }
}
