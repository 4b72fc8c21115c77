use tracing::debug;

use crate::core::package::{DependencyExpr, PackageRecord};
use crate::index::traits::IndexParser;
use crate::index::{PackageIndex, ParseWarning, ParsedIndex};

/// Version assigned to every package of a simple test index.
pub const SIMPLE_VERSION: &str = "0";

/// One package per line: `pkg:dep1,dep2`. Used for hand-written test repositories.
pub struct SimpleParser;

impl IndexParser for SimpleParser {
    fn id(&self) -> &'static str {
        "simple"
    }

    fn parse(&self, content: &str) -> ParsedIndex {
        let mut records = Vec::new();
        let mut warnings = Vec::new();

        for (idx, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, deps)) = line.split_once(':') else {
                warnings.push(ParseWarning::MalformedLine {
                    line: idx + 1,
                    content: line.to_string(),
                });
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                warnings.push(ParseWarning::MalformedLine {
                    line: idx + 1,
                    content: line.to_string(),
                });
                continue;
            }

            let mut record = PackageRecord::new(name, SIMPLE_VERSION);
            record.line = idx + 1;
            record.depends_on = deps
                .split(',')
                .map(str::trim)
                .filter(|dep| !dep.is_empty())
                .map(DependencyExpr::new)
                .collect();
            records.push(record);
        }

        let (index, duplicates) = PackageIndex::from_records(records);
        warnings.extend(duplicates);
        debug!(packages = index.len(), "parsed simple index");
        ParsedIndex { index, warnings }
    }
}
