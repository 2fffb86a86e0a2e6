use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where a [`Release`] entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display, strum::IntoStaticStr)]
pub enum ReleaseOrigin {
    /// Taken from the package's own metadata (Flathub appstream data).
    #[serde(rename = "appstream")]
    #[strum(serialize = "appstream")]
    Appstream,

    #[serde(rename = "github-release")]
    #[strum(serialize = "github-release")]
    GitHub,

    #[serde(rename = "gitlab-release")]
    #[strum(serialize = "gitlab-release")]
    GitLab,

    /// Scraped from a vendor's release-notes page.
    #[serde(rename = "vendor-release")]
    #[strum(serialize = "vendor-release")]
    Vendor,
}

/// One version entry in a package's changelog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
    pub date: DateTime<Utc>,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(rename = "type")]
    pub origin: ReleaseOrigin,
}

/// Normalize a version label for duplicate detection.
///
/// `v1.2.0`, `V1.2.0` and `1.2.0` all describe the same release.
#[must_use]
pub fn version_key(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Combine freshly fetched releases with a package's existing list.
///
/// `preferred` entries are placed ahead of `existing` ones, so when both carry the
/// same version the preferred entry survives. The result is sorted newest-first
/// (stable, so equal dates keep their priority order) and holds at most `cap` entries.
#[must_use]
pub fn merge_releases(preferred: Vec<Release>, existing: Vec<Release>, cap: usize) -> Vec<Release> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Release> = preferred
        .into_iter()
        .chain(existing)
        .filter(|r| seen.insert(version_key(&r.version).to_string()))
        .collect();

    merged.sort_by(|a, b| b.date.cmp(&a.date));
    merged.truncate(cap);
    merged
}
