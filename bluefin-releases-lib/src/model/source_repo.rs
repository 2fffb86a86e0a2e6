use core::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};
use url::Url;

/// The kind of version-control host a package's code lives on.
///
/// The kind selects which release adapter the enrichment stage uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RepoKind {
    GitHub,
    GitLab,
    Other,
}

/// Where a package's upstream source code is hosted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRepository {
    #[serde(rename = "type")]
    pub kind: RepoKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

impl SourceRepository {
    /// Build a GitHub repository reference from its owner and name.
    #[must_use]
    pub fn github(owner: &str, repo: &str) -> Self {
        Self {
            kind: RepoKind::GitHub,
            url: format!("https://github.com/{owner}/{repo}"),
            owner: Some(owner.to_string()),
            repo: Some(repo.to_string()),
        }
    }

    /// Detect a forge repository from an arbitrary project URL.
    ///
    /// GitHub URLs are reduced to `https://github.com/<owner>/<repo>` regardless of
    /// any trailing path. Hosts containing `gitlab` are treated as GitLab instances
    /// where the project path may contain nested groups. Anything else yields `None`.
    #[must_use]
    pub fn detect(raw: &str) -> Option<Self> {
        let url = Url::parse(raw.trim()).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();
        let segments: Vec<_> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        if host == "github.com" || host == "www.github.com" {
            return Some(match segments.as_slice() {
                [owner, repo, ..] => Self::github(owner, repo.trim_end_matches(".git")),
                _ => Self {
                    kind: RepoKind::GitHub,
                    url: raw.trim().to_string(),
                    owner: None,
                    repo: None,
                },
            });
        }

        if host.contains("gitlab") {
            let project = gitlab_project_segments(&segments);
            return Some(match project.as_slice() {
                [groups @ .., repo] if !groups.is_empty() => {
                    let repo = repo.trim_end_matches(".git");
                    let owner = groups.join("/");
                    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
                    Self {
                        kind: RepoKind::GitLab,
                        url: format!("{}://{host}{port}/{owner}/{repo}", url.scheme()),
                        owner: Some(owner),
                        repo: Some(repo.to_string()),
                    }
                }
                _ => Self {
                    kind: RepoKind::GitLab,
                    url: raw.trim().to_string(),
                    owner: None,
                    repo: None,
                },
            });
        }

        None
    }

    /// Record a repository on a host no release adapter understands.
    #[must_use]
    pub fn other(url: &str) -> Self {
        Self {
            kind: RepoKind::Other,
            url: url.trim().to_string(),
            owner: None,
            repo: None,
        }
    }

    /// `owner/repo`, when both components are known.
    #[must_use]
    pub fn project_path(&self) -> Option<String> {
        match (&self.owner, &self.repo) {
            (Some(owner), Some(repo)) => Some(format!("{owner}/{repo}")),
            _ => None,
        }
    }

    /// Whether a release adapter can be selected for this repository.
    #[must_use]
    pub fn is_enrichable(&self) -> bool {
        self.kind != RepoKind::Other && self.project_path().is_some()
    }
}

/// Pages of a GitLab project that older instances serve without the `/-/` separator.
const GITLAB_VIEWS: [&str; 11] = [
    "issues",
    "merge_requests",
    "tree",
    "blob",
    "releases",
    "wikis",
    "commits",
    "tags",
    "raw",
    "pipelines",
    "milestones",
];

/// The segments naming a GitLab project, without any trailing view.
///
/// Everything after `/-/` is a view into the project. A known view name ends the
/// project path only after at least a group and a project name.
fn gitlab_project_segments<'a>(segments: &[&'a str]) -> Vec<&'a str> {
    let mut project = Vec::new();
    for seg in segments {
        if *seg == "-" || (project.len() >= 2 && GITLAB_VIEWS.contains(seg)) {
            break;
        }
        project.push(*seg);
    }
    project
}

impl Display for SourceRepository {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.url)
    }
}
