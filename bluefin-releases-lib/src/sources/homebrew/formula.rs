use super::{package_id, short_name};
use crate::model::{HomebrewInfo, Package, PackageKind, SourceRepository};
use crate::sources::brewfile::{self, CuratedList, Directive};
use crate::sources::http::{Auth, HttpClient};
use crate::sources::{Discovered, Governor, ProviderResult, Selector, Upstream, unwrap_found};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

const LOG_TARGET: &str = "  homebrew";

#[derive(Debug, Deserialize)]
struct Formula {
    name: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    tap: Option<String>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    versions: Versions,
    #[serde(default)]
    urls: Urls,
    #[serde(default)]
    deprecated: bool,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    bottle: Option<Bottle>,
}

#[derive(Debug, Default, Deserialize)]
struct Versions {
    #[serde(default)]
    stable: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Urls {
    #[serde(default)]
    stable: Option<UrlInfo>,
}

#[derive(Debug, Deserialize)]
struct UrlInfo {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Bottle {
    #[serde(default)]
    stable: Option<BottleStable>,
}

#[derive(Debug, Deserialize)]
struct BottleStable {
    #[serde(default)]
    files: BTreeMap<String, serde_json::Value>,
}

impl Formula {
    /// Formulae without bottles build from source anywhere; otherwise a Linux bottle must exist.
    fn is_linux_compatible(&self) -> bool {
        let files = match self.bottle.as_ref().and_then(|b| b.stable.as_ref()) {
            Some(stable) if !stable.files.is_empty() => &stable.files,
            _ => return true,
        };

        files.keys().any(|platform| platform.contains("linux"))
    }

    fn source_repo(&self) -> Option<SourceRepository> {
        self.urls
            .stable
            .as_ref()
            .and_then(|u| u.url.as_deref())
            .and_then(SourceRepository::detect)
            .filter(SourceRepository::is_enrichable)
            .or_else(|| self.homepage.as_deref().and_then(SourceRepository::detect))
    }
}

/// Settings for [`HomebrewUpstream`].
#[derive(Debug, Clone)]
pub struct HomebrewSettings {
    pub api_base: String,
    pub catalog_base: String,
    pub lists: Vec<CuratedList>,
}

#[derive(Debug)]
pub struct HomebrewUpstream {
    http: HttpClient,
    settings: HomebrewSettings,
    governor: Arc<Governor>,
    now: DateTime<Utc>,
}

impl HomebrewUpstream {
    #[must_use]
    pub const fn new(http: HttpClient, settings: HomebrewSettings, governor: Arc<Governor>, now: DateTime<Utc>) -> Self {
        Self {
            http,
            settings,
            governor,
            now,
        }
    }

    /// A package built from the name alone, for formulae the public API does not know.
    fn minimal_package(&self, item: &Discovered) -> Package {
        let mut pkg = Package::new(&item.id, short_name(&item.key), PackageKind::Homebrew, self.now);
        pkg.classification.clone_from(&item.classification);
        pkg.homebrew_info = Some(HomebrewInfo {
            formula: item.key.clone(),
            tap: tap_of(&item.key),
            ..HomebrewInfo::default()
        });
        pkg
    }

    fn convert(&self, item: &Discovered, formula: Formula) -> Package {
        let source_repo = formula.source_repo();
        let mut pkg = Package::new(&item.id, short_name(&formula.name), PackageKind::Homebrew, self.now);

        pkg.summary = formula.desc.clone().unwrap_or_default();
        pkg.description = formula.desc.unwrap_or_default();
        pkg.license = formula.license;
        pkg.classification.clone_from(&item.classification);
        pkg.version.clone_from(&formula.versions.stable);
        pkg.url = Some(format!("https://formulae.brew.sh/formula/{}", formula.name));
        pkg.source_repo = source_repo;
        pkg.homebrew_info = Some(HomebrewInfo {
            formula: formula.name,
            full_name: formula.full_name,
            tap: formula.tap,
            homepage: formula.homepage,
            versions: formula.versions.stable.into_iter().collect(),
            ..HomebrewInfo::default()
        });

        pkg
    }
}

/// `owner/tap` for a tap-qualified name.
fn tap_of(name: &str) -> Option<String> {
    name.rsplit_once('/').map(|(tap, _)| tap.to_string())
}

#[async_trait]
impl Upstream for HomebrewUpstream {
    fn name(&self) -> &'static str {
        "homebrew"
    }

    fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    async fn discover(&self, selector: Selector) -> ProviderResult<Vec<Discovered>> {
        if selector == Selector::Recent {
            return ProviderResult::Found(Vec::new());
        }

        let entries = unwrap_found!(brewfile::fetch_curated(&self.http, &self.settings.catalog_base, &self.settings.lists, Directive::Brew).await);

        ProviderResult::Found(
            entries
                .into_iter()
                .map(|e| Discovered::new(package_id(&e.name), e.name).with_classification(Some(&e.classification)))
                .collect(),
        )
    }

    async fn fetch_detail(&self, item: Discovered) -> ProviderResult<Package> {
        // Third-party taps are not part of the public API.
        if item.key.contains('/') {
            return ProviderResult::Found(self.minimal_package(&item));
        }

        let url = format!("{}/formula/{}.json", self.settings.api_base, item.key);
        let formula = match self.http.get_json::<Formula>(&url, Auth::Anonymous).await {
            ProviderResult::Found(formula) => formula,
            ProviderResult::NotFound => {
                log::debug!(target: LOG_TARGET, "Formula '{}' is not in homebrew-core, recording it by name only", item.key);
                return ProviderResult::Found(self.minimal_package(&item));
            }
            ProviderResult::Unavailable(reason) => return ProviderResult::Unavailable(reason),
            ProviderResult::RateLimited(info) => return ProviderResult::RateLimited(info),
            ProviderResult::Error(e) => return ProviderResult::Error(e),
        };

        if formula.deprecated || formula.disabled {
            return ProviderResult::Unavailable(format!("formula '{}' is deprecated or disabled", item.key).into());
        }

        if !formula.is_linux_compatible() {
            return ProviderResult::Unavailable(format!("formula '{}' has no Linux bottle", item.key).into());
        }

        ProviderResult::Found(self.convert(&item, formula))
    }
}
