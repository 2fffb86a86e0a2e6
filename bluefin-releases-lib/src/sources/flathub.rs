//! Flathub: desktop applications.

use super::brewfile::{self, CuratedList, Directive};
use super::http::{Auth, HttpClient};
use super::{Discovered, Governor, ProviderResult, Selector, Upstream, unwrap_found};
use crate::model::{Package, PackageKind, Release, ReleaseOrigin, SourceRepository};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

const LOG_TARGET: &str = "   flathub";

/// Keys of the appstream `urls` map, in the order they are tried for a source repository.
const REPO_URL_KEYS: [&str; 3] = ["vcs-browser", "homepage", "bugtracker"];

#[derive(Debug, Deserialize)]
struct AppStream {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    developer_name: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    project_license: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    urls: BTreeMap<String, String>,
    #[serde(default)]
    releases: Vec<AppStreamRelease>,
}

#[derive(Debug, Deserialize)]
struct AppStreamRelease {
    version: String,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Feed {
    List(Vec<FeedApp>),
    Hits { hits: Vec<FeedApp> },
}

#[derive(Debug, Deserialize)]
struct FeedApp {
    #[serde(alias = "app_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    developer_name: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    project_license: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    current_release_version: Option<String>,
}

/// Settings for [`FlathubUpstream`].
#[derive(Debug, Clone)]
pub struct FlathubSettings {
    pub api_base: String,
    pub catalog_base: String,
    pub lists: Vec<CuratedList>,
    pub feed_cap: usize,
}

#[derive(Debug)]
pub struct FlathubUpstream {
    http: HttpClient,
    settings: FlathubSettings,
    governor: Arc<Governor>,
    now: DateTime<Utc>,
}

impl FlathubUpstream {
    #[must_use]
    pub const fn new(http: HttpClient, settings: FlathubSettings, governor: Arc<Governor>, now: DateTime<Utc>) -> Self {
        Self {
            http,
            settings,
            governor,
            now,
        }
    }

    async fn discover_curated(&self) -> ProviderResult<Vec<Discovered>> {
        let entries = unwrap_found!(brewfile::fetch_curated(&self.http, &self.settings.catalog_base, &self.settings.lists, Directive::Flatpak).await);

        ProviderResult::Found(
            entries
                .into_iter()
                .map(|e| Discovered::new(e.name.clone(), e.name).with_classification(Some(&e.classification)))
                .collect(),
        )
    }

    async fn discover_recent(&self) -> ProviderResult<Vec<Discovered>> {
        let url = format!("{}/feed/recently-updated", self.settings.api_base);
        let apps = match unwrap_found!(self.http.get_json::<Feed>(&url, Auth::Anonymous).await) {
            Feed::List(apps) | Feed::Hits { hits: apps } => apps,
        };

        let total = apps.len();
        let discovered: Vec<_> = apps
            .into_iter()
            .take(self.settings.feed_cap)
            .map(|app| {
                let seed = self.seed_from_feed(&app);
                Discovered::new(app.id.clone(), app.id).with_seed(seed)
            })
            .collect();

        log::info!(target: LOG_TARGET, "Recently updated feed listed {total} apps, keeping {}", discovered.len());
        ProviderResult::Found(discovered)
    }

    fn seed_from_feed(&self, app: &FeedApp) -> Package {
        let mut pkg = Package::new(&app.id, app.name.clone().unwrap_or_else(|| app.id.clone()), PackageKind::Flatpak, self.now);
        pkg.summary = app.summary.clone().unwrap_or_default();
        pkg.developer_name.clone_from(&app.developer_name);
        pkg.icon.clone_from(&app.icon);
        pkg.license.clone_from(&app.project_license);
        pkg.categories.clone_from(&app.categories);
        pkg.version.clone_from(&app.current_release_version);
        pkg.url = Some(store_url(&app.id));
        pkg
    }

    fn apply_appstream(&self, pkg: &mut Package, appstream: AppStream) {
        if let Some(name) = appstream.name.filter(|s| !s.is_empty()) {
            pkg.name = name;
        }
        if let Some(summary) = appstream.summary.filter(|s| !s.is_empty()) {
            pkg.summary = summary;
        }
        pkg.description = appstream.description.unwrap_or_default();
        pkg.developer_name = appstream.developer_name.or(pkg.developer_name.take());
        pkg.icon = appstream.icon.or(pkg.icon.take());
        pkg.license = appstream.project_license.or(pkg.license.take());
        if !appstream.categories.is_empty() {
            pkg.categories = appstream.categories;
        }
        pkg.source_repo = detect_source_repo(&appstream.urls);

        pkg.releases = appstream
            .releases
            .into_iter()
            .filter(|r| r.kind.as_deref() != Some("development"))
            .map(|r| convert_release(r, self.now))
            .collect();

        if let Some(latest) = pkg.releases.iter().max_by_key(|r| r.date) {
            pkg.version = Some(latest.version.clone());
            pkg.updated_at = Some(latest.date);
        }
    }
}

#[async_trait]
impl Upstream for FlathubUpstream {
    fn name(&self) -> &'static str {
        "flathub"
    }

    fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    async fn discover(&self, selector: Selector) -> ProviderResult<Vec<Discovered>> {
        match selector {
            Selector::Curated => self.discover_curated().await,
            Selector::Recent => self.discover_recent().await,
        }
    }

    async fn fetch_detail(&self, item: Discovered) -> ProviderResult<Package> {
        let url = format!("{}/appstream/{}", self.settings.api_base, item.key);
        log::debug!(target: LOG_TARGET, "Fetching appstream data for '{}'", item.key);

        let appstream = match self.http.get_json::<AppStream>(&url, Auth::Anonymous).await {
            ProviderResult::Found(appstream) => Some(appstream),
            ProviderResult::NotFound if item.seed.is_some() => {
                log::debug!(target: LOG_TARGET, "No appstream data for '{}', keeping feed data", item.key);
                None
            }
            ProviderResult::NotFound => return ProviderResult::NotFound,
            ProviderResult::Unavailable(reason) => return ProviderResult::Unavailable(reason),
            ProviderResult::RateLimited(info) => return ProviderResult::RateLimited(info),
            ProviderResult::Error(e) => return ProviderResult::Error(e),
        };

        let mut pkg = item
            .seed
            .unwrap_or_else(|| Package::new(&item.id, &item.id, PackageKind::Flatpak, self.now));
        pkg.classification = item.classification;
        pkg.url = Some(store_url(&item.key));

        if let Some(appstream) = appstream {
            self.apply_appstream(&mut pkg, appstream);
        }

        ProviderResult::Found(pkg)
    }
}

fn store_url(app_id: &str) -> String {
    format!("https://flathub.org/apps/{app_id}")
}

fn detect_source_repo(urls: &BTreeMap<String, String>) -> Option<SourceRepository> {
    let candidates: Vec<&str> = REPO_URL_KEYS.iter().filter_map(|k| urls.get(*k)).map(String::as_str).collect();

    candidates
        .iter()
        .find_map(|url| SourceRepository::detect(url))
        .or_else(|| urls.get("vcs-browser").map(|url| SourceRepository::other(url)))
}

fn convert_release(release: AppStreamRelease, now: DateTime<Utc>) -> Release {
    let date = parse_timestamp(release.timestamp.as_ref())
        .or_else(|| release.date.as_deref().and_then(parse_date))
        .unwrap_or(now);

    Release {
        title: format!("Version {}", release.version),
        version: release.version,
        date,
        description: release.description.unwrap_or_default(),
        url: release.url.unwrap_or_default(),
        origin: ReleaseOrigin::Appstream,
    }
}

/// Appstream timestamps are Unix seconds, as either a number or a string.
fn parse_timestamp(value: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    let secs = match value? {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };

    DateTime::from_timestamp(secs, 0)
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.to_utc()))
}
