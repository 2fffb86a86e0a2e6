//! Release lists of projects hosted on git forges.

mod github;
mod gitlab;

pub(crate) use github::{GitHubRelease, list_releases};
pub use github::GitHubReleases;
pub use gitlab::GitLabReleases;
