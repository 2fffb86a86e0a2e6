//! Canonical data model shared by every stage of the pipeline.
//!
//! A [`Package`] is the unit of the dataset. Upstream adapters produce fresh
//! `Package` values, the pipeline merges them by identifier, and the enrichment
//! stage attaches [`Release`] entries fetched from the package's
//! [`SourceRepository`] or from a vendor.

mod package;
mod release;
mod source_repo;

pub use package::{HomebrewInfo, OsInfo, Package, PackageKind};
pub use release::{Release, ReleaseOrigin, merge_releases, version_key};
pub use source_repo::{RepoKind, SourceRepository};
