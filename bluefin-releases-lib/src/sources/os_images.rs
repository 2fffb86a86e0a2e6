//! Bluefin OS images, one package per release stream.

use super::forges::{GitHubRelease, list_releases};
use super::http::HttpClient;
use super::markup::markdown_to_html;
use super::{Discovered, Governor, ProviderResult, Selector, Upstream};
use crate::model::{OsInfo, Package, PackageKind, SourceRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Arc, LazyLock};

const LOG_TARGET: &str = " os-images";

/// Releases inspected per image repository when looking for the latest of each stream.
const RELEASES_PER_REPO: usize = 10;

const IMAGE_BASE: &str = "ghcr.io/ublue-os/bluefin";
const ICON: &str = "https://avatars.githubusercontent.com/u/120078124?s=200&v=4";

/// Package rows of the changelog table recorded beside the kernel, GNOME and Mesa versions.
const MAJOR_PACKAGES: [&str; 4] = ["Podman", "Nvidia", "Docker", "Incus"];

static FEDORA_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"F(\d+)\.\d+").expect("invalid regex"));
static CENTOS_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"c(\d+)s").expect("invalid regex"));
static COMMIT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#([a-f0-9]+)").expect("invalid regex"));
static TABLE_ROW_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|\s*\*\*([^*|]+)\*\*\s*\|\s*([^|]+?)\s*\|").expect("invalid regex"));

/// A GitHub repository publishing OS image releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OsImageConfig {
    pub owner: String,
    pub repo: String,

    /// Every release of an LTS repository belongs to the `lts` stream.
    #[serde(default)]
    pub lts: bool,
}

/// Settings for [`OsImagesUpstream`].
#[derive(Debug, Clone)]
pub struct OsImageSettings {
    pub github_api: String,
    pub images: Vec<OsImageConfig>,
}

#[derive(Debug)]
pub struct OsImagesUpstream {
    http: HttpClient,
    settings: OsImageSettings,
    governor: Arc<Governor>,
    now: DateTime<Utc>,
}

impl OsImagesUpstream {
    #[must_use]
    pub const fn new(http: HttpClient, settings: OsImageSettings, governor: Arc<Governor>, now: DateTime<Utc>) -> Self {
        Self {
            http,
            settings,
            governor,
            now,
        }
    }

    /// The newest published release of every stream in one repository, keyed by stream.
    async fn latest_by_stream(&self, image: &OsImageConfig) -> ProviderResult<BTreeMap<String, GitHubRelease>> {
        let releases = match list_releases(&self.http, &self.settings.github_api, &image.owner, &image.repo, RELEASES_PER_REPO).await {
            ProviderResult::Found(releases) => releases,
            ProviderResult::NotFound => return ProviderResult::Found(BTreeMap::new()),
            ProviderResult::Unavailable(reason) => return ProviderResult::Unavailable(reason),
            ProviderResult::RateLimited(info) => return ProviderResult::RateLimited(info),
            ProviderResult::Error(e) => return ProviderResult::Error(e),
        };

        let mut latest: BTreeMap<String, GitHubRelease> = BTreeMap::new();
        for release in releases.into_iter().filter(GitHubRelease::is_published) {
            if release.date().is_none() {
                continue;
            }

            let stream = if image.lts { "lts".to_string() } else { stream_of(&release.tag_name).to_string() };
            match latest.entry(stream) {
                Entry::Vacant(e) => {
                    let _ = e.insert(release);
                }
                Entry::Occupied(mut e) => {
                    if release.date() > e.get().date() {
                        let _ = e.insert(release);
                    }
                }
            }
        }

        ProviderResult::Found(latest)
    }

    fn build_package(&self, image: &OsImageConfig, stream: &str, release: &GitHubRelease) -> Package {
        let info = parse_os_info(stream, release);
        let mut pkg = Package::new(format!("bluefin-os-{stream}"), display_name(stream), PackageKind::Os, self.now);

        pkg.summary = summary(&info);
        pkg.description = markdown_to_html(release.body());
        pkg.icon = Some(ICON.to_string());
        pkg.version = Some(release.tag_name.clone());
        pkg.updated_at = release.date();
        pkg.url = Some(release.html_url.clone());
        pkg.source_repo = Some(SourceRepository::github(&image.owner, &image.repo));
        pkg.releases = release.to_release().into_iter().collect();
        pkg.os_info = Some(info);
        pkg
    }
}

#[async_trait]
impl Upstream for OsImagesUpstream {
    fn name(&self) -> &'static str {
        "os-images"
    }

    fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    async fn discover(&self, selector: Selector) -> ProviderResult<Vec<Discovered>> {
        if selector == Selector::Recent {
            return ProviderResult::Found(Vec::new());
        }

        let mut discovered = Vec::new();
        for image in &self.settings.images {
            let Some(_permit) = self.governor.acquire().await else {
                log::warn!(target: LOG_TARGET, "GitHub is rate limited, skipping {}/{}", image.owner, image.repo);
                break;
            };

            match self.latest_by_stream(image).await {
                ProviderResult::Found(latest) => {
                    log::info!(target: LOG_TARGET, "{}/{} has {} current streams", image.owner, image.repo, latest.len());
                    for (stream, release) in latest {
                        let pkg = self.build_package(image, &stream, &release);
                        discovered.push(Discovered::new(pkg.id.clone(), release.tag_name).with_seed(pkg));
                    }
                }
                ProviderResult::RateLimited(info) => return ProviderResult::RateLimited(info),
                ProviderResult::NotFound => {}
                ProviderResult::Unavailable(reason) => {
                    log::warn!(target: LOG_TARGET, "Could not list releases of {}/{}: {reason}", image.owner, image.repo);
                }
                ProviderResult::Error(e) => {
                    log::warn!(target: LOG_TARGET, "Could not list releases of {}/{}: {e:#}", image.owner, image.repo);
                }
            }
        }

        ProviderResult::Found(discovered)
    }

    async fn fetch_detail(&self, item: Discovered) -> ProviderResult<Package> {
        item.seed.map_or(ProviderResult::NotFound, ProviderResult::Found)
    }
}

/// `stable-20260203` belongs to the `stable` stream; untagged builds default to it.
fn stream_of(tag: &str) -> &str {
    match tag.split_once('-') {
        Some((stream, _)) if !stream.is_empty() => stream,
        _ => "stable",
    }
}

fn build_number(tag: &str) -> &str {
    tag.split('-').nth(1).unwrap_or(tag)
}

fn display_name(stream: &str) -> &'static str {
    match stream {
        "gts" => "Bluefin GTS",
        "lts" => "Bluefin LTS",
        _ => "Bluefin",
    }
}

fn summary(info: &OsInfo) -> String {
    let base = |label: &str, version: Option<&String>| format!("{label} {}", version.map_or("", String::as_str));

    let mut summary = match info.stream.as_str() {
        "gts" => format!("GTS (General-Term Support) release based on {}", base("Fedora", info.fedora_version.as_ref())),
        "lts" => format!("LTS (Long-Term Support) release based on {}", base("CentOS Stream", info.centos_version.as_ref())),
        _ => format!("Stable release based on {}", base("Fedora", info.fedora_version.as_ref())),
    };

    if let Some(kernel) = &info.kernel_version {
        summary.push_str(" with Kernel ");
        summary.push_str(kernel);
    }

    summary
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// Versions from the `| **Name** | version |` rows of a changelog.
///
/// A changed version reads `old ➡️ new`; only the new one is kept.
fn package_versions(body: &str) -> BTreeMap<String, String> {
    let mut versions = BTreeMap::new();
    for caps in TABLE_ROW_REGEX.captures_iter(body) {
        let name = caps[1].trim().to_string();
        let raw = caps[2].trim();
        let version = raw.split_once("➡️").map_or(raw, |(_, new)| new.trim());
        let _ = versions.entry(name).or_insert_with(|| version.to_string());
    }
    versions
}

fn parse_os_info(stream: &str, release: &GitHubRelease) -> OsInfo {
    let title = release.name.as_deref().unwrap_or_default();
    let mut versions = package_versions(release.body());
    let lts = stream == "lts";

    OsInfo {
        stream: stream.to_string(),
        fedora_version: if lts { None } else { capture(&FEDORA_REGEX, title) },
        centos_version: if lts { capture(&CENTOS_REGEX, title) } else { None },
        build_number: build_number(&release.tag_name).to_string(),
        commit_hash: capture(&COMMIT_REGEX, title),
        image_ref: format!("{IMAGE_BASE}:{stream}"),
        kernel_version: versions.remove("Kernel"),
        gnome_version: versions.remove("Gnome"),
        mesa_version: versions.remove("Mesa"),
        major_packages: MAJOR_PACKAGES
            .iter()
            .filter_map(|name| versions.remove(*name).map(|v| ((*name).to_string(), v)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "\
### Major packages
| Name | Version |
| --- | --- |
| **Kernel** | 6.17.12-300 |
| **Gnome** | 49.2-1 |
| **Mesa** | 25.2.7-1 ➡️ 25.2.8-1 |
| **Podman** | 5.7.0-1 |
| **Nvidia** | 580.105.08-1 |
";

    fn release(tag: &str, name: &str, published: &str) -> GitHubRelease {
        serde_json::from_value(serde_json::json!({
            "tag_name": tag,
            "name": name,
            "body": BODY,
            "html_url": format!("https://github.com/ublue-os/bluefin/releases/tag/{tag}"),
            "published_at": published,
        }))
        .unwrap()
    }

    #[test]
    fn test_stream_of() {
        assert_eq!(stream_of("stable-20260203"), "stable");
        assert_eq!(stream_of("gts-20260203"), "gts");
        assert_eq!(stream_of("20260203"), "stable");
        assert_eq!(build_number("gts-20260203"), "20260203");
        assert_eq!(build_number("20260203"), "20260203");
    }

    #[test]
    fn test_package_versions() {
        let versions = package_versions(BODY);
        assert_eq!(versions.get("Kernel").map(String::as_str), Some("6.17.12-300"));
        assert_eq!(versions.get("Mesa").map(String::as_str), Some("25.2.8-1"));
        assert!(!versions.contains_key("Name"));
    }

    #[test]
    fn test_parse_fedora_release() {
        let r = release("stable-20260203", "stable-20260203: Stable (F43.20260203, #4132884)", "2026-02-03T10:00:00Z");
        let info = parse_os_info("stable", &r);

        assert_eq!(info.fedora_version.as_deref(), Some("43"));
        assert_eq!(info.centos_version, None);
        assert_eq!(info.commit_hash.as_deref(), Some("4132884"));
        assert_eq!(info.build_number, "20260203");
        assert_eq!(info.image_ref, "ghcr.io/ublue-os/bluefin:stable");
        assert_eq!(info.gnome_version.as_deref(), Some("49.2-1"));
        assert_eq!(info.major_packages.keys().collect::<Vec<_>>(), ["Nvidia", "Podman"]);
        assert_eq!(summary(&info), "Stable release based on Fedora 43 with Kernel 6.17.12-300");
    }

    #[test]
    fn test_parse_lts_release() {
        let r = release("lts-20251223", "bluefin-lts LTS: 20251223 (c10s, #087b221)", "2025-12-23T10:00:00Z");
        let info = parse_os_info("lts", &r);

        assert_eq!(info.centos_version.as_deref(), Some("10"));
        assert_eq!(info.fedora_version, None);
        assert_eq!(info.commit_hash.as_deref(), Some("087b221"));
        assert_eq!(display_name(&info.stream), "Bluefin LTS");
        assert!(summary(&info).starts_with("LTS (Long-Term Support) release based on CentOS Stream 10"));
    }
}
