use tracing::{debug, warn};

use crate::core::package::{parse_depends_token, PackageRecord, ParsedToken, Provide};
use crate::index::traits::IndexParser;
use crate::index::{PackageIndex, ParseError, ParseWarning, ParsedIndex};

/// Parser for Alpine's `APKINDEX`: blank-line separated blocks of `X:value` lines.
pub struct ApkIndexParser;

#[derive(Default)]
struct RawBlock<'a> {
    line: usize,
    name: Option<&'a str>,
    version: Option<&'a str>,
    arch: Option<&'a str>,
    origin: Option<&'a str>,
    description: Option<&'a str>,
    depends: Vec<&'a str>,
    provides: Vec<&'a str>,
}

impl IndexParser for ApkIndexParser {
    fn id(&self) -> &'static str {
        "apkindex"
    }

    fn parse(&self, content: &str) -> ParsedIndex {
        let mut warnings = Vec::new();
        let mut records = Vec::new();

        for block in split_blocks(content, &mut warnings) {
            match finish_block(block, &mut warnings) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(%error, "skipping index record");
                    warnings.push(ParseWarning::Skipped { error });
                }
            }
        }

        let (index, duplicates) = PackageIndex::from_records(records);
        for duplicate in &duplicates {
            warn!(%duplicate, "duplicate index entry");
        }
        warnings.extend(duplicates);
        debug!(
            packages = index.len(),
            warnings = warnings.len(),
            "parsed APKINDEX"
        );

        ParsedIndex { index, warnings }
    }
}

fn split_blocks<'a>(content: &'a str, warnings: &mut Vec<ParseWarning>) -> Vec<RawBlock<'a>> {
    let mut blocks = Vec::new();
    let mut current: Option<RawBlock<'a>> = None;

    for (idx, raw_line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            continue;
        }

        let block = current.get_or_insert_with(|| RawBlock {
            line: line_no,
            ..RawBlock::default()
        });

        let Some((tag, value)) = split_field(line) else {
            warnings.push(ParseWarning::MalformedLine {
                line: line_no,
                content: line.to_string(),
            });
            continue;
        };

        match tag {
            'P' => block.name = Some(value),
            'V' => block.version = Some(value),
            'A' => block.arch = Some(value),
            'o' => block.origin = Some(value),
            'T' => block.description = Some(value),
            'D' => block.depends.extend(value.split_whitespace()),
            'p' => block.provides.extend(value.split_whitespace()),
            _ => {}
        }
    }

    if let Some(block) = current {
        blocks.push(block);
    }
    blocks
}

fn split_field(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let tag = chars.next()?;
    if !tag.is_ascii_alphabetic() || chars.next()? != ':' {
        return None;
    }
    Some((tag, line[2..].trim()))
}

fn finish_block(
    block: RawBlock<'_>,
    warnings: &mut Vec<ParseWarning>,
) -> Result<PackageRecord, ParseError> {
    let name = match block.name.filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => return Err(ParseError::MissingName { line: block.line }),
    };
    let version = match block.version.filter(|version| !version.is_empty()) {
        Some(version) => version,
        None => {
            return Err(ParseError::MissingVersion {
                name: name.to_string(),
                line: block.line,
            })
        }
    };

    let mut record = PackageRecord::new(name, version);
    record.line = block.line;
    record.arch = block.arch.map(str::to_string);
    record.origin = block.origin.map(str::to_string);
    record.description = block.description.map(str::to_string);

    for token in block.depends {
        let (parsed, error) = parse_depends_token(token);
        if let Some(error) = error {
            warnings.push(ParseWarning::InvalidExpression {
                package: name.to_string(),
                token: token.to_string(),
                reason: error.to_string(),
            });
        }
        match parsed {
            ParsedToken::Depends(expr) => record.depends_on.push(expr),
            ParsedToken::Conflicts(expr) => record.conflicts.push(expr),
        }
    }
    for token in block.provides {
        let (provide, error) = Provide::parse(token);
        if let Some(error) = error {
            warnings.push(ParseWarning::InvalidExpression {
                package: name.to_string(),
                token: token.to_string(),
                reason: error.to_string(),
            });
        }
        record.provides.push(provide);
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use crate::index::apkindex::ApkIndexParser;
    use crate::index::traits::IndexParser;
    use crate::index::{ParseError, ParseWarning};

    const SAMPLE: &str = "C:Q1abc=\nP:busybox\nV:1.36.1-r29\nA:x86_64\nT:Size optimized toolbox\nD:so:libc.musl-x86_64.so.1 !busybox-extras\np:cmd:busybox=1.36.1-r29 cmd:sh=1.36.1-r29\n\nP:musl\nV:1.2.5-r0\nA:x86_64\np:so:libc.musl-x86_64.so.1=1\n";

    #[test]
    fn parses_records_in_index_order() {
        let parsed = ApkIndexParser.parse(SAMPLE);
        assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
        let names: Vec<_> = parsed
            .index
            .records()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["busybox", "musl"]);

        let busybox = parsed.index.get("busybox").expect("busybox");
        assert_eq!(busybox.version.raw, "1.36.1-r29");
        assert_eq!(busybox.arch.as_deref(), Some("x86_64"));
        assert_eq!(busybox.depends_on.len(), 1);
        assert_eq!(busybox.depends_on[0].name, "so:libc.musl-x86_64.so.1");
        assert_eq!(busybox.conflicts.len(), 1);
        assert_eq!(busybox.provides.len(), 2);
        assert_eq!(busybox.line, 1);
        let musl = parsed.index.get("musl").expect("musl");
        assert_eq!(musl.line, 9);
        assert_eq!(musl.provides[0].name, "so:libc.musl-x86_64.so.1");
    }

    #[test]
    fn malformed_records_are_skipped_and_reported() {
        let text = "V:1.0\n\nP:noversion\nD:a\n\nP:good\nV:2.0\n";
        let parsed = ApkIndexParser.parse(text);
        assert_eq!(parsed.index.len(), 1);
        assert!(parsed.index.get("good").is_some());
        assert_eq!(
            parsed.warnings,
            vec![
                ParseWarning::Skipped {
                    error: ParseError::MissingName { line: 1 }
                },
                ParseWarning::Skipped {
                    error: ParseError::MissingVersion {
                        name: "noversion".to_string(),
                        line: 3
                    }
                },
            ]
        );
    }

    #[test]
    fn duplicate_package_last_wins_with_warning() {
        let text = "P:a\nV:1\n\nP:a\nV:2\nD:b\n";
        let parsed = ApkIndexParser.parse(text);
        let a = parsed.index.get("a").expect("a");
        assert_eq!(a.version.raw, "2");
        assert_eq!(a.depends_on.len(), 1);
        assert!(matches!(
            parsed.warnings.as_slice(),
            [ParseWarning::DuplicatePackage { name, line: 1 }] if name == "a"
        ));
    }

    #[test]
    fn provide_with_bad_operator_warns_and_stays_unversioned() {
        let parsed = ApkIndexParser.parse("P:b\nV:1\np:libfoo>2 libbar=3\n");
        let b = parsed.index.get("b").expect("b");
        assert_eq!(b.provides.len(), 2);
        assert_eq!(b.provides[0].name, "libfoo");
        assert!(b.provides[0].version.is_none());
        assert_eq!(b.provides[1].version.as_ref().map(|v| v.as_str()), Some("3"));
        assert!(matches!(
            parsed.warnings.as_slice(),
            [ParseWarning::InvalidExpression { package, token, .. }]
                if package == "b" && token == "libfoo>2"
        ));
    }

    #[test]
    fn tolerates_crlf_and_extra_blank_lines() {
        let text = "\r\n\r\nP:a\r\nV:1\r\n\r\n\r\nP:b\r\nV:2\r\n";
        let parsed = ApkIndexParser.parse(text);
        assert_eq!(parsed.index.len(), 2);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn malformed_lines_are_ignored() {
        let text = "P:a\nV:1\nnot a field\n";
        let parsed = ApkIndexParser.parse(text);
        assert_eq!(parsed.index.len(), 1);
        assert!(matches!(
            parsed.warnings.as_slice(),
            [ParseWarning::MalformedLine { line: 3, .. }]
        ));
    }
}
