use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// An APK version string such as `1.36.1-r29` or `2.4_git20230101-r0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Version {
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Op {
    Equal,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Fuzzy,
}

/// A version constraint attached to a dependency expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VersionReq {
    pub op: Op,
    pub version: Version,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("unknown version operator '{0}'")]
    UnknownOperator(String),
    #[error("operator '{0}' is missing a version")]
    MissingVersion(String),
}

impl Version {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Op {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        match input {
            "=" => Ok(Op::Equal),
            "<" => Ok(Op::Less),
            "<=" => Ok(Op::LessEq),
            ">" => Ok(Op::Greater),
            ">=" => Ok(Op::GreaterEq),
            "~" | "=~" | "~=" => Ok(Op::Fuzzy),
            other => Err(VersionError::UnknownOperator(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Equal => "=",
            Op::Less => "<",
            Op::LessEq => "<=",
            Op::Greater => ">",
            Op::GreaterEq => ">=",
            Op::Fuzzy => "~",
        }
    }
}

impl VersionReq {
    pub fn parse(op: &str, version: &str) -> Result<Self, VersionError> {
        let op = Op::parse(op)?;
        if version.is_empty() {
            return Err(VersionError::MissingVersion(op.as_str().to_string()));
        }
        Ok(Self {
            op,
            version: Version::new(version),
        })
    }

    pub fn matches(&self, candidate: &Version) -> bool {
        let ordering = compare_versions(&candidate.raw, &self.version.raw);
        match self.op {
            Op::Equal => ordering == Ordering::Equal,
            Op::Less => ordering == Ordering::Less,
            Op::LessEq => ordering != Ordering::Greater,
            Op::Greater => ordering == Ordering::Greater,
            Op::GreaterEq => ordering != Ordering::Less,
            Op::Fuzzy => fuzzy_matches(&candidate.raw, &self.version.raw),
        }
    }
}

impl fmt::Display for VersionReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.version)
    }
}

/// Orders two APK version strings. Falls back to a plain string comparison
/// when either side does not follow the APK version grammar.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    match (ParsedVersion::parse(left), ParsedVersion::parse(right)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => left.cmp(right),
    }
}

fn fuzzy_matches(candidate: &str, requested: &str) -> bool {
    if candidate == requested {
        return true;
    }
    match candidate.strip_prefix(requested) {
        Some(rest) => matches!(rest.chars().next(), Some('.' | '-' | '_')),
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SuffixKind {
    Alpha,
    Beta,
    Pre,
    Rc,
    Release,
    Cvs,
    Svn,
    Git,
    Hg,
    P,
}

impl SuffixKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "alpha" => Some(SuffixKind::Alpha),
            "beta" => Some(SuffixKind::Beta),
            "pre" => Some(SuffixKind::Pre),
            "rc" => Some(SuffixKind::Rc),
            "cvs" => Some(SuffixKind::Cvs),
            "svn" => Some(SuffixKind::Svn),
            "git" => Some(SuffixKind::Git),
            "hg" => Some(SuffixKind::Hg),
            "p" => Some(SuffixKind::P),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedVersion {
    numbers: Vec<u64>,
    letter: Option<char>,
    suffixes: Vec<(SuffixKind, u64)>,
    revision: u64,
}

impl ParsedVersion {
    fn parse(raw: &str) -> Option<Self> {
        let (body, revision) = match raw.rsplit_once("-r") {
            Some((body, rev)) if !rev.is_empty() && rev.chars().all(|c| c.is_ascii_digit()) => {
                (body, rev.parse().ok()?)
            }
            _ => (raw, 0),
        };

        let mut parts = body.split('_');
        let head = parts.next()?;
        let (numeric, letter) = match head.chars().last() {
            Some(ch) if ch.is_ascii_lowercase() => (&head[..head.len() - 1], Some(ch)),
            _ => (head, None),
        };
        if numeric.is_empty() {
            return None;
        }
        let numbers = numeric
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        let mut suffixes = Vec::new();
        for part in parts {
            let split = part
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(part.len());
            let (name, number) = part.split_at(split);
            let kind = SuffixKind::from_name(name)?;
            let number = if number.is_empty() {
                0
            } else {
                number.parse().ok()?
            };
            suffixes.push((kind, number));
        }

        Some(Self {
            numbers,
            letter,
            suffixes,
            revision,
        })
    }
}

impl PartialOrd for ParsedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ParsedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numbers
            .cmp(&other.numbers)
            .then_with(|| self.letter.cmp(&other.letter))
            .then_with(|| compare_suffixes(&self.suffixes, &other.suffixes))
            .then_with(|| self.revision.cmp(&other.revision))
    }
}

fn compare_suffixes(left: &[(SuffixKind, u64)], right: &[(SuffixKind, u64)]) -> Ordering {
    let release = (SuffixKind::Release, 0);
    let len = left.len().max(right.len());
    for idx in 0..len {
        let a = left.get(idx).copied().unwrap_or(release);
        let b = right.get(idx).copied().unwrap_or(release);
        match a.cmp(&b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
