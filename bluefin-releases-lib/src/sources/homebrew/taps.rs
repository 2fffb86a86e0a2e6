use super::package_id;
use crate::model::{HomebrewInfo, Package, PackageKind, SourceRepository};
use crate::sources::http::{Auth, HttpClient};
use crate::sources::{Discovered, Governor, ProviderResult, Selector, Upstream, unwrap_found};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

const LOG_TARGET: &str = "      taps";

/// Directories of a tap repository holding package definitions, and whether they hold casks.
const TAP_DIRECTORIES: [(&str, bool); 2] = [("Formula", false), ("Casks", true)];

static DESC_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?m)^\s*desc\s+"([^"]*)""#).expect("invalid regex"));
static HOMEPAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?m)^\s*homepage\s+"([^"]*)""#).expect("invalid regex"));
static VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?m)^\s*version\s+"([^"]*)""#).expect("invalid regex"));
static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?m)^\s*url\s+"([^"]*)""#).expect("invalid regex"));
static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?m)^\s*name\s+"([^"]*)""#).expect("invalid regex"));

/// A Homebrew tap repository to list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TapConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub experimental: bool,
}

impl TapConfig {
    /// The tap's short name: `homebrew-tap` is tapped as `owner/tap`.
    fn tap_name(&self) -> &str {
        self.repo.strip_prefix("homebrew-").unwrap_or(&self.repo)
    }
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    path: String,
    #[serde(default)]
    download_url: Option<String>,
}

/// Metadata extracted from a formula or cask definition.
#[derive(Debug, Default, PartialEq, Eq)]
struct RubyDefinition {
    name: Option<String>,
    desc: Option<String>,
    homepage: Option<String>,
    version: Option<String>,
    url: Option<String>,
}

impl RubyDefinition {
    fn parse(source: &str) -> Self {
        let capture = |re: &Regex| {
            re.captures(source)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty())
        };

        Self {
            name: capture(&NAME_REGEX),
            desc: capture(&DESC_REGEX),
            homepage: capture(&HOMEPAGE_REGEX),
            version: capture(&VERSION_REGEX),
            url: capture(&URL_REGEX),
        }
    }

    fn source_repo(&self) -> Option<SourceRepository> {
        self.url
            .as_deref()
            .and_then(SourceRepository::detect)
            .filter(SourceRepository::is_enrichable)
            .or_else(|| self.homepage.as_deref().and_then(SourceRepository::detect))
    }
}

/// Settings for [`TapsUpstream`].
#[derive(Debug, Clone)]
pub struct TapSettings {
    pub github_api: String,
    pub taps: Vec<TapConfig>,
}

#[derive(Debug)]
pub struct TapsUpstream {
    http: HttpClient,
    settings: TapSettings,
    governor: Arc<Governor>,
    now: DateTime<Utc>,
}

impl TapsUpstream {
    #[must_use]
    pub const fn new(http: HttpClient, settings: TapSettings, governor: Arc<Governor>, now: DateTime<Utc>) -> Self {
        Self {
            http,
            settings,
            governor,
            now,
        }
    }

    async fn list_directory(&self, tap: &TapConfig, directory: &str, cask: bool) -> ProviderResult<Vec<Discovered>> {
        let url = format!("{}/repos/{}/{}/contents/{directory}", self.settings.github_api, tap.owner, tap.repo);

        let items = match self.http.get_json::<Vec<ContentItem>>(&url, Auth::Bearer).await {
            ProviderResult::Found(items) => items,
            ProviderResult::NotFound => {
                log::debug!(target: LOG_TARGET, "Tap '{}/{}' has no {directory} directory", tap.owner, tap.repo);
                return ProviderResult::Found(Vec::new());
            }
            ProviderResult::Unavailable(reason) => return ProviderResult::Unavailable(reason),
            ProviderResult::RateLimited(info) => return ProviderResult::RateLimited(info),
            ProviderResult::Error(e) => return ProviderResult::Error(e),
        };

        let full_tap = format!("{}/{}", tap.owner, tap.tap_name());
        let discovered = items
            .into_iter()
            .filter_map(|item| {
                let name = item.name.strip_suffix(".rb")?.to_string();
                let full_name = format!("{full_tap}/{name}");
                let key = item.download_url.unwrap_or_else(|| {
                    format!("https://raw.githubusercontent.com/{}/{}/HEAD/{}", tap.owner, tap.repo, item.path)
                });

                let mut seed = Package::new(package_id(&full_name), &name, PackageKind::Homebrew, self.now);
                seed.homebrew_info = Some(HomebrewInfo {
                    formula: name,
                    full_name: Some(full_name.clone()),
                    tap: Some(full_tap.clone()),
                    cask,
                    experimental: tap.experimental,
                    ..HomebrewInfo::default()
                });

                Some(Discovered::new(package_id(&full_name), key).with_seed(seed))
            })
            .collect();

        ProviderResult::Found(discovered)
    }
}

#[async_trait]
impl Upstream for TapsUpstream {
    fn name(&self) -> &'static str {
        "homebrew-taps"
    }

    fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    async fn discover(&self, selector: Selector) -> ProviderResult<Vec<Discovered>> {
        if selector == Selector::Recent {
            return ProviderResult::Found(Vec::new());
        }

        let mut all = Vec::new();
        for tap in &self.settings.taps {
            for (directory, cask) in TAP_DIRECTORIES {
                match self.list_directory(tap, directory, cask).await {
                    ProviderResult::Found(items) => {
                        log::info!(target: LOG_TARGET, "Found {} definitions in {}/{}/{directory}", items.len(), tap.owner, tap.repo);
                        all.extend(items);
                    }
                    ProviderResult::RateLimited(info) => return ProviderResult::RateLimited(info),
                    ProviderResult::NotFound => {}
                    ProviderResult::Unavailable(reason) => {
                        log::warn!(target: LOG_TARGET, "Could not list {}/{}/{directory}: {reason}", tap.owner, tap.repo);
                    }
                    ProviderResult::Error(e) => {
                        log::warn!(target: LOG_TARGET, "Could not list {}/{}/{directory}: {e:#}", tap.owner, tap.repo);
                    }
                }
            }
        }

        ProviderResult::Found(all)
    }

    async fn fetch_detail(&self, item: Discovered) -> ProviderResult<Package> {
        let source = unwrap_found!(self.http.get_text(&item.key, Auth::Bearer).await);
        let definition = RubyDefinition::parse(&source);

        let mut pkg = item
            .seed
            .unwrap_or_else(|| Package::new(&item.id, &item.id, PackageKind::Homebrew, self.now));

        pkg.classification = item.classification;
        pkg.source_repo = definition.source_repo();
        pkg.summary = definition.desc.clone().unwrap_or_default();
        pkg.description = definition.desc.unwrap_or_default();
        pkg.version.clone_from(&definition.version);
        pkg.url.clone_from(&definition.homepage);

        if let Some(name) = definition.name {
            pkg.name = name;
        }

        if let Some(info) = pkg.homebrew_info.as_mut() {
            info.homepage = definition.homepage;
            info.versions = definition.version.into_iter().collect();
        }

        ProviderResult::Found(pkg)
    }
}
