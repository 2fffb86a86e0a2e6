use super::{Governor, ProviderResult};
use crate::model::{Package, Release, SourceRepository};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which identifiers discovery should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Selector {
    /// The fixed curated lists that define the catalog.
    Curated,

    /// A dynamic feed of recently changed packages, capped in size.
    Recent,
}

/// One identifier produced by discovery, with what the upstream knows about it so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    /// Canonical package identifier.
    pub id: String,

    /// Upstream-native lookup key (app id, formula name, tap file path, ...).
    pub key: String,

    /// Label of the curated list the identifier came from.
    pub classification: Option<String>,

    /// A partially or fully built package when discovery already had the data.
    pub seed: Option<Package>,
}

impl Discovered {
    #[must_use]
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            classification: None,
            seed: None,
        }
    }

    #[must_use]
    pub fn with_classification(mut self, classification: Option<&str>) -> Self {
        self.classification = classification.map(ToString::to_string);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: Package) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A source of package identifiers and package details.
#[async_trait]
pub trait Upstream: Send + Sync + core::fmt::Debug {
    /// Short name used in logs and run statistics.
    fn name(&self) -> &'static str;

    /// The governor admitting detail calls for this upstream.
    fn governor(&self) -> &Arc<Governor>;

    /// Produce the identifiers this upstream contributes for `selector`.
    async fn discover(&self, selector: Selector) -> ProviderResult<Vec<Discovered>>;

    /// Fetch the full package record for one discovered identifier.
    async fn fetch_detail(&self, item: Discovered) -> ProviderResult<Package>;
}

/// What a release adapter needs to know about a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTarget {
    pub package_id: String,
    pub repo: Option<SourceRepository>,

    /// Maximum number of entries to request from the upstream.
    pub limit: usize,

    /// When set, only tags starting with this prefix are kept.
    pub tag_prefix: Option<String>,
}

/// A source of releases for a package.
#[async_trait]
pub trait ReleaseSource: Send + Sync + core::fmt::Debug {
    fn name(&self) -> &'static str;

    fn governor(&self) -> &Arc<Governor>;

    /// Whether this source takes responsibility for the package regardless of its repository.
    ///
    /// Vendor sources claim specific packages; forge sources never do.
    fn claims(&self, _target: &ReleaseTarget) -> bool {
        false
    }

    /// Fetch the most recent published releases, newest first.
    async fn fetch_releases(&self, target: &ReleaseTarget) -> ProviderResult<Vec<Release>>;
}
