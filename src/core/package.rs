use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::core::version::{Version, VersionError, VersionReq};

/// One package entry from the index. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: Version,
    pub arch: Option<String>,
    pub origin: Option<String>,
    pub description: Option<String>,
    pub depends_on: Vec<DependencyExpr>,
    pub provides: Vec<Provide>,
    pub conflicts: Vec<DependencyExpr>,
    /// First line of the record block in the source text.
    pub line: usize,
}

/// A requested name plus an optional version constraint, e.g. `so:libc.musl-x86_64.so.1`
/// or `busybox>=1.36`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyExpr {
    pub name: String,
    pub constraint: Option<VersionReq>,
}

/// A virtual name satisfied by a package, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Provide {
    pub name: String,
    pub version: Option<Version>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedToken {
    Depends(DependencyExpr),
    Conflicts(DependencyExpr),
}

fn expression_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<name>[^<>=~]+)(?:(?P<op>[<>=~]+)(?P<version>.*))?$")
            .unwrap_or_else(|err| panic!("dependency expression pattern is invalid: {err}"))
    })
}

impl PackageRecord {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Version::new(version),
            arch: None,
            origin: None,
            description: None,
            depends_on: Vec::new(),
            provides: Vec::new(),
            conflicts: Vec::new(),
            line: 0,
        }
    }

    /// Version under which this package satisfies `name`, either as itself or
    /// through one of its provides. `Some(None)` is an unversioned provide.
    pub fn satisfies_name(&self, name: &str) -> Option<Option<&Version>> {
        if self.name == name {
            return Some(Some(&self.version));
        }
        self.provides
            .iter()
            .find(|provide| provide.name == name)
            .map(|provide| provide.version.as_ref())
    }
}

impl DependencyExpr {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
        }
    }

    pub fn with_constraint(name: impl Into<String>, constraint: VersionReq) -> Self {
        Self {
            name: name.into(),
            constraint: Some(constraint),
        }
    }

    /// Parses `name[op version]`. On an unknown operator the name is still
    /// returned, unconstrained, alongside the error so callers can warn and continue.
    pub fn parse(token: &str) -> (Self, Option<VersionError>) {
        let token = token.trim();
        let Some(captures) = expression_pattern().captures(token) else {
            return (Self::new(token), None);
        };
        let name = strip_repository_tag(captures.name("name").map_or(token, |m| m.as_str()));
        let op = captures.name("op").map(|m| m.as_str());
        let version = captures.name("version").map_or("", |m| m.as_str());
        match op {
            None => (Self::new(name), None),
            Some(op) => match VersionReq::parse(op, version) {
                Ok(req) => (Self::with_constraint(name, req), None),
                Err(err) => (Self::new(name), Some(err)),
            },
        }
    }

    pub fn is_satisfied_by(&self, version: Option<&Version>) -> bool {
        match (&self.constraint, version) {
            (None, _) => true,
            (Some(req), Some(version)) => req.matches(version),
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for DependencyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(req) => write!(f, "{}{}", self.name, req),
            None => f.write_str(&self.name),
        }
    }
}

impl Provide {
    /// Parses `name[=version]`. Any operator other than `=` is reported and the
    /// name kept unversioned, like an expression with an unknown operator.
    pub fn parse(token: &str) -> (Self, Option<VersionError>) {
        let token = token.trim();
        let unversioned = |name: &str| Self {
            name: name.to_string(),
            version: None,
        };
        let Some(captures) = expression_pattern().captures(token) else {
            return (unversioned(token), None);
        };
        let name = captures.name("name").map_or(token, |m| m.as_str());
        let version = captures.name("version").map_or("", |m| m.as_str());
        match captures.name("op").map(|m| m.as_str()) {
            None => (unversioned(name), None),
            Some("=") if version.is_empty() => (unversioned(name), None),
            Some("=") => (
                Self {
                    name: name.to_string(),
                    version: Some(Version::new(version)),
                },
                None,
            ),
            Some(op) => (
                unversioned(name),
                Some(VersionError::UnknownOperator(op.to_string())),
            ),
        }
    }
}

/// Splits one `D:` token into a dependency or a conflict (`!name`).
pub fn parse_depends_token(token: &str) -> (ParsedToken, Option<VersionError>) {
    match token.strip_prefix('!') {
        Some(rest) => {
            let (expr, err) = DependencyExpr::parse(rest);
            (ParsedToken::Conflicts(expr), err)
        }
        None => {
            let (expr, err) = DependencyExpr::parse(token);
            (ParsedToken::Depends(expr), err)
        }
    }
}

fn strip_repository_tag(name: &str) -> &str {
    match name.split_once('@') {
        Some((base, _)) if !base.is_empty() => base,
        _ => name,
    }
}
