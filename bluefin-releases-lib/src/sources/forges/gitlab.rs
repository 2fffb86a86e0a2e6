use crate::model::{Release, ReleaseOrigin, RepoKind, SourceRepository};
use crate::sources::http::{Auth, HttpClient};
use crate::sources::markup::markdown_to_html;
use crate::sources::{Governor, ProviderResult, ReleaseSource, ReleaseTarget, unwrap_found};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohno::IntoAppError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// Characters escaped in a project path used as a single URL segment.
const PROJECT_PATH: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

#[derive(Debug, Deserialize)]
struct GitLabRelease {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    released_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    upcoming_release: bool,
    #[serde(default, rename = "_links")]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(default, rename = "self")]
    this: Option<String>,
}

impl GitLabRelease {
    fn into_release(self, repo: &SourceRepository) -> Option<Release> {
        let date = self.released_at.or(self.created_at)?;
        let url = self
            .links
            .and_then(|l| l.this)
            .unwrap_or_else(|| format!("{}/-/releases/{}", repo.url.trim_end_matches('/'), self.tag_name));
        let title = self.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| self.tag_name.clone());

        Some(Release {
            version: self.tag_name,
            date,
            title,
            description: markdown_to_html(self.description.as_deref().unwrap_or_default()),
            url,
            origin: ReleaseOrigin::GitLab,
        })
    }
}

/// The releases endpoint of the instance hosting `repo`.
fn releases_url(repo: &SourceRepository, per_page: usize) -> crate::Result<String> {
    let url = Url::parse(&repo.url).into_app_err_with(|| format!("invalid GitLab repository URL '{}'", repo.url))?;
    let Some(path) = repo.project_path() else {
        ohno::bail!("GitLab repository '{}' has no project path", repo.url);
    };

    let host = url.host_str().unwrap_or_default();
    let authority = url.port().map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
    let project = utf8_percent_encode(&path, PROJECT_PATH);

    Ok(format!("{}://{authority}/api/v4/projects/{project}/releases?per_page={per_page}", url.scheme()))
}

/// Releases of projects hosted on any GitLab instance.
#[derive(Debug)]
pub struct GitLabReleases {
    http: HttpClient,
    governor: Arc<Governor>,
}

impl GitLabReleases {
    #[must_use]
    pub const fn new(http: HttpClient, governor: Arc<Governor>) -> Self {
        Self { http, governor }
    }
}

#[async_trait]
impl ReleaseSource for GitLabReleases {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    async fn fetch_releases(&self, target: &ReleaseTarget) -> ProviderResult<Vec<Release>> {
        let Some(repo) = target.repo.as_ref().filter(|r| r.kind == RepoKind::GitLab) else {
            return ProviderResult::Unavailable(format!("'{}' has no GitLab repository", target.package_id).into());
        };

        let url = match releases_url(repo, target.limit) {
            Ok(url) => url,
            Err(e) => return ProviderResult::error(e),
        };

        // Self-hosted instances do not accept GitHub credentials.
        let releases = unwrap_found!(self.http.get_json::<Vec<GitLabRelease>>(&url, Auth::Anonymous).await);

        ProviderResult::Found(
            releases
                .into_iter()
                .filter(|r| !r.upcoming_release)
                .filter_map(|r| r.into_release(repo))
                .take(target.limit)
                .collect(),
        )
    }
}
