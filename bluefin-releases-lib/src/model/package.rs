use super::{Release, SourceRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The closed set of package kinds in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageKind {
    /// A bootable OS image stream.
    Os,

    /// A desktop application distributed through Flathub.
    Flatpak,

    /// A Homebrew formula or cask.
    Homebrew,
}

/// One trackable software unit in the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, rename = "projectLicense", skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(rename = "packageType")]
    pub kind: PackageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(default, rename = "currentReleaseVersion", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_repo: Option<SourceRepository>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub releases: Vec<Release>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_info: Option<OsInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homebrew_info: Option<HomebrewInfo>,
}

impl Package {
    /// Create a package carrying only its identity; every optional field is empty.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: PackageKind, fetched_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            summary: String::new(),
            description: String::new(),
            developer_name: None,
            icon: None,
            license: None,
            categories: Vec::new(),
            kind,
            classification: None,
            version: None,
            updated_at: None,
            url: None,
            source_repo: None,
            releases: Vec::new(),
            fetched_at,
            os_info: None,
            homebrew_info: None,
        }
    }

    /// Whether the enrichment stage has something to work with for this package.
    #[must_use]
    pub fn has_source_repo(&self) -> bool {
        self.source_repo.is_some()
    }
}

/// Build details for an OS image release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsInfo {
    pub stream: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fedora_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centos_version: Option<String>,
    pub build_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    pub image_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnome_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesa_version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub major_packages: BTreeMap<String, String>,
}

/// Homebrew-specific identity of a formula or cask.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomebrewInfo {
    pub formula: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<String>,
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub cask: bool,
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub experimental: bool,
}
