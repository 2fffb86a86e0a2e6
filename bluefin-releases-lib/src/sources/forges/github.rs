use crate::model::{Release, ReleaseOrigin, RepoKind};
use crate::sources::http::{Auth, HttpClient};
use crate::sources::markup::markdown_to_html;
use crate::sources::{Governor, ProviderResult, ReleaseSource, ReleaseTarget, unwrap_found};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// A release as returned by the GitHub REST API.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
}

impl GitHubRelease {
    /// Drafts and pre-releases never show up in a changelog.
    pub fn is_published(&self) -> bool {
        !self.draft && !self.prerelease
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.published_at.or(self.created_at)
    }

    pub fn title(&self) -> &str {
        self.name.as_deref().filter(|n| !n.trim().is_empty()).unwrap_or(&self.tag_name)
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }

    pub fn to_release(&self) -> Option<Release> {
        Some(Release {
            version: self.tag_name.clone(),
            date: self.date()?,
            title: self.title().to_string(),
            description: markdown_to_html(self.body()),
            url: self.html_url.clone(),
            origin: ReleaseOrigin::GitHub,
        })
    }
}

/// List the releases of a GitHub repository, newest first.
pub(crate) async fn list_releases(http: &HttpClient, api_base: &str, owner: &str, repo: &str, per_page: usize) -> ProviderResult<Vec<GitHubRelease>> {
    let url = format!("{api_base}/repos/{owner}/{repo}/releases?per_page={per_page}");
    http.get_json(&url, Auth::Bearer).await
}

/// Releases of GitHub-hosted projects.
#[derive(Debug)]
pub struct GitHubReleases {
    http: HttpClient,
    api_base: String,
    governor: Arc<Governor>,
}

impl GitHubReleases {
    #[must_use]
    pub fn new(http: HttpClient, api_base: impl Into<String>, governor: Arc<Governor>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            governor,
        }
    }
}

#[async_trait]
impl ReleaseSource for GitHubReleases {
    fn name(&self) -> &'static str {
        "github"
    }

    fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    async fn fetch_releases(&self, target: &ReleaseTarget) -> ProviderResult<Vec<Release>> {
        let Some(repo) = target.repo.as_ref().filter(|r| r.kind == RepoKind::GitHub) else {
            return ProviderResult::Unavailable(format!("'{}' has no GitHub repository", target.package_id).into());
        };
        let (Some(owner), Some(name)) = (repo.owner.as_deref(), repo.repo.as_deref()) else {
            return ProviderResult::Unavailable(format!("'{}' has an incomplete GitHub repository reference", repo.url).into());
        };

        let releases = unwrap_found!(list_releases(&self.http, &self.api_base, owner, name, target.limit).await);

        ProviderResult::Found(
            releases
                .iter()
                .filter(|r| r.is_published())
                .filter(|r| target.tag_prefix.as_deref().is_none_or(|prefix| r.tag_name.starts_with(prefix)))
                .filter_map(GitHubRelease::to_release)
                .take(target.limit)
                .collect(),
        )
    }
}
