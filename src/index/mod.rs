use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::core::package::PackageRecord;

pub mod apkindex;
pub mod simple;
pub mod source;
pub mod traits;

pub use source::{load_index_text, IndexError, IndexSource};
pub use traits::IndexParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Apkindex,
    Simple,
}

pub fn parser_for(format: IndexFormat) -> Box<dyn IndexParser> {
    match format {
        IndexFormat::Apkindex => Box::new(apkindex::ApkIndexParser),
        IndexFormat::Simple => Box::new(simple::SimpleParser),
    }
}

/// A malformed record. Recovered locally: the record is skipped and parsing continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ParseError {
    #[error("record at line {line} has no package name")]
    MissingName { line: usize },
    #[error("package '{name}' at line {line} has no version")]
    MissingVersion { name: String, line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ParseWarning {
    Skipped { error: ParseError },
    DuplicatePackage { name: String, line: usize },
    MalformedLine { line: usize, content: String },
    InvalidExpression {
        package: String,
        token: String,
        reason: String,
    },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::Skipped { error } => write!(f, "skipped record: {error}"),
            ParseWarning::DuplicatePackage { name, line } => {
                write!(f, "duplicate package '{name}' at line {line}, later entry wins")
            }
            ParseWarning::MalformedLine { line, content } => {
                write!(f, "malformed line {line}: '{content}'")
            }
            ParseWarning::InvalidExpression {
                package,
                token,
                reason,
            } => write!(f, "package '{package}': invalid expression '{token}': {reason}"),
        }
    }
}

/// Parsed package records in index order, with name and provides lookup.
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    records: Vec<PackageRecord>,
    by_name: HashMap<String, usize>,
    by_provide: HashMap<String, Vec<usize>>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedIndex {
    pub index: PackageIndex,
    pub warnings: Vec<ParseWarning>,
}

impl PackageIndex {
    /// Builds the index from records in appearance order. For duplicate names
    /// the last record wins and keeps its own position; a warning is returned
    /// for every record that was replaced.
    pub fn from_records(records: Vec<PackageRecord>) -> (Self, Vec<ParseWarning>) {
        let mut last_seen: HashMap<&str, usize> = HashMap::new();
        for (pos, record) in records.iter().enumerate() {
            last_seen.insert(record.name.as_str(), pos);
        }

        let mut warnings = Vec::new();
        let mut kept = Vec::with_capacity(last_seen.len());
        let survivors: Vec<bool> = records
            .iter()
            .enumerate()
            .map(|(pos, record)| last_seen.get(record.name.as_str()) == Some(&pos))
            .collect();
        for (record, survives) in records.into_iter().zip(survivors) {
            if survives {
                kept.push(record);
            } else {
                warnings.push(ParseWarning::DuplicatePackage {
                    name: record.name.clone(),
                    line: record.line,
                });
            }
        }

        let mut by_name = HashMap::new();
        let mut by_provide: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, record) in kept.iter().enumerate() {
            by_name.insert(record.name.clone(), pos);
            for provide in &record.provides {
                let entry = by_provide.entry(provide.name.clone()).or_default();
                if entry.last() != Some(&pos) {
                    entry.push(pos);
                }
            }
        }

        (
            Self {
                records: kept,
                by_name,
                by_provide,
            },
            warnings,
        )
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.by_name.get(name).map(|&pos| &self.records[pos])
    }

    /// Records providing `name` virtually, in index order.
    pub fn providers_of(&self, name: &str) -> impl Iterator<Item = &PackageRecord> {
        self.by_provide
            .get(name)
            .into_iter()
            .flatten()
            .map(|&pos| &self.records[pos])
    }

    pub fn records(&self) -> &[PackageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
