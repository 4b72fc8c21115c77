pub mod package;
pub mod snapshot;
pub mod version;

pub use package::{DependencyExpr, PackageRecord, Provide};
pub use snapshot::Snapshot;
pub use version::{Op, Version, VersionError, VersionReq};
