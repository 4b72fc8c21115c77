use crate::core::package::{DependencyExpr, PackageRecord};
use crate::graph::MatchKind;
use crate::index::PackageIndex;

/// A package able to satisfy an expression, and how it matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub record: &'a PackageRecord,
    pub via: MatchKind,
}

/// Maps dependency expressions to the packages that satisfy them. Holds only a
/// shared borrow of the index, so one resolver can serve many threads.
#[derive(Debug, Clone, Copy)]
pub struct NameResolver<'a> {
    index: &'a PackageIndex,
}

impl<'a> NameResolver<'a> {
    pub fn new(index: &'a PackageIndex) -> Self {
        Self { index }
    }

    /// Candidates for `expr`: the exact-name package first, then packages
    /// providing the name in index order. A version constraint filters both
    /// groups without reordering them. Empty means unresolved.
    pub fn resolve(&self, expr: &DependencyExpr) -> Vec<Candidate<'a>> {
        let mut candidates = Vec::new();

        if let Some(record) = self.index.get(&expr.name) {
            if expr.is_satisfied_by(Some(&record.version)) {
                candidates.push(Candidate {
                    record,
                    via: MatchKind::Exact,
                });
            }
        }

        for record in self.index.providers_of(&expr.name) {
            if record.name == expr.name {
                continue;
            }
            let satisfied = record
                .provides
                .iter()
                .filter(|provide| provide.name == expr.name)
                .any(|provide| expr.is_satisfied_by(provide.version.as_ref()));
            if satisfied {
                candidates.push(Candidate {
                    record,
                    via: MatchKind::Provides,
                });
            }
        }

        candidates
    }

    pub fn resolve_names(&self, expr: &DependencyExpr) -> Vec<&'a str> {
        self.resolve(expr)
            .into_iter()
            .map(|candidate| candidate.record.name.as_str())
            .collect()
    }

    /// The single provider a package manager would pick.
    pub fn choose(&self, expr: &DependencyExpr) -> Option<Candidate<'a>> {
        self.resolve(expr).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use crate::core::package::{DependencyExpr, PackageRecord, Provide};
    use crate::graph::resolver::NameResolver;
    use crate::graph::MatchKind;
    use crate::index::PackageIndex;

    fn record(name: &str, version: &str, provides: &[&str]) -> PackageRecord {
        let mut record = PackageRecord::new(name, version);
        record.provides = provides.iter().map(|p| Provide::parse(p).0).collect();
        record
    }

    fn index(records: Vec<PackageRecord>) -> PackageIndex {
        PackageIndex::from_records(records).0
    }

    #[test]
    fn exact_match_precedes_providers_regardless_of_order() {
        let index = index(vec![
            record("alt-sh", "1.0", &["sh"]),
            record("sh", "2.0", &[]),
        ]);
        let resolver = NameResolver::new(&index);
        let (expr, _) = DependencyExpr::parse("sh");
        let candidates = resolver.resolve(&expr);
        assert_eq!(resolver.resolve_names(&expr), vec!["sh", "alt-sh"]);
        assert_eq!(candidates[0].via, MatchKind::Exact);
        assert_eq!(candidates[1].via, MatchKind::Provides);
    }

    #[test]
    fn providers_keep_index_order() {
        let index = index(vec![
            record("zeta", "1", &["cmd:ls"]),
            record("alpha", "1", &["cmd:ls"]),
        ]);
        let resolver = NameResolver::new(&index);
        let (expr, _) = DependencyExpr::parse("cmd:ls");
        assert_eq!(resolver.resolve_names(&expr), vec!["zeta", "alpha"]);
        let chosen = resolver.choose(&expr).expect("provider");
        assert_eq!(chosen.record.name, "zeta");
    }

    #[test]
    fn version_constraint_filters_candidates() {
        let index = index(vec![
            record("musl", "1.2.5-r0", &["so:libc=1"]),
            record("musl-old", "1.1.0-r0", &["so:libc=0.9"]),
            record("libc-shim", "1", &["so:libc"]),
        ]);
        let resolver = NameResolver::new(&index);

        let (expr, _) = DependencyExpr::parse("so:libc>=1");
        assert_eq!(resolver.resolve_names(&expr), vec!["musl"]);

        let (expr, _) = DependencyExpr::parse("so:libc");
        assert_eq!(
            resolver.resolve_names(&expr),
            vec!["musl", "musl-old", "libc-shim"]
        );

        let (expr, _) = DependencyExpr::parse("musl<1.2");
        assert!(resolver.resolve(&expr).is_empty());
    }

    #[test]
    fn unknown_name_is_empty_not_an_error() {
        let index = index(vec![record("a", "1", &[])]);
        let resolver = NameResolver::new(&index);
        assert!(resolver.resolve(&DependencyExpr::new("missing")).is_empty());
        assert!(resolver.choose(&DependencyExpr::new("missing")).is_none());
    }

    #[test]
    fn self_provide_is_not_listed_twice() {
        let index = index(vec![record("busybox", "1.36", &["busybox=1.36"])]);
        let resolver = NameResolver::new(&index);
        assert_eq!(
            resolver.resolve_names(&DependencyExpr::new("busybox")),
            vec!["busybox"]
        );
    }
}
