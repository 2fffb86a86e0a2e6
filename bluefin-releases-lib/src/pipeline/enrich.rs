use crate::model::{Release, RepoKind};
use crate::sources::{ProviderResult, ReleaseSource, ReleaseTarget};
use std::sync::Arc;

const LOG_TARGET: &str = "    enrich";

/// What enrichment produced for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    /// The source answered; the list may be empty.
    Releases(Vec<Release>),

    /// No release source applies to the package.
    NoSource,

    /// The source's governor had been tripped, so no call was made.
    Skipped,

    /// The call failed or was throttled.
    Failed,
}

impl EnrichmentOutcome {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Skipped | Self::Failed)
    }
}

/// Routes packages to the release source that knows about them.
///
/// Vendor sources are consulted first since they claim specific packages outright;
/// otherwise the package's repository kind selects a forge.
#[derive(Debug, Clone)]
pub struct EnrichmentEngine {
    github: Arc<dyn ReleaseSource>,
    gitlab: Arc<dyn ReleaseSource>,
    vendors: Vec<Arc<dyn ReleaseSource>>,
}

impl EnrichmentEngine {
    #[must_use]
    pub fn new(github: Arc<dyn ReleaseSource>, gitlab: Arc<dyn ReleaseSource>) -> Self {
        Self {
            github,
            gitlab,
            vendors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_vendor(mut self, vendor: Arc<dyn ReleaseSource>) -> Self {
        self.vendors.push(vendor);
        self
    }

    /// The source responsible for `target`, if any.
    #[must_use]
    pub fn route(&self, target: &ReleaseTarget) -> Option<&Arc<dyn ReleaseSource>> {
        if let Some(vendor) = self.vendors.iter().find(|v| v.claims(target)) {
            return Some(vendor);
        }

        let repo = target.repo.as_ref().filter(|r| r.is_enrichable())?;
        match repo.kind {
            RepoKind::GitHub => Some(&self.github),
            RepoKind::GitLab => Some(&self.gitlab),
            RepoKind::Other => None,
        }
    }

    /// Fetch the releases of one package.
    ///
    /// Never fails: every problem is logged and reported as an outcome.
    pub async fn enrich(&self, target: &ReleaseTarget) -> EnrichmentOutcome {
        let Some(source) = self.route(target) else {
            return EnrichmentOutcome::NoSource;
        };

        let Some(_permit) = source.governor().acquire().await else {
            log::debug!(target: LOG_TARGET, "Skipping '{}', {} is rate limited", target.package_id, source.name());
            return EnrichmentOutcome::Skipped;
        };

        match source.fetch_releases(target).await {
            ProviderResult::Found(releases) => {
                log::debug!(target: LOG_TARGET, "Fetched {} releases for '{}' from {}", releases.len(), target.package_id, source.name());
                EnrichmentOutcome::Releases(releases)
            }
            ProviderResult::NotFound => {
                log::info!(target: LOG_TARGET, "{} has no releases for '{}'", source.name(), target.package_id);
                EnrichmentOutcome::Releases(Vec::new())
            }
            ProviderResult::Unavailable(reason) => {
                log::info!(target: LOG_TARGET, "No releases for '{}': {reason}", target.package_id);
                EnrichmentOutcome::Releases(Vec::new())
            }
            ProviderResult::RateLimited(info) => {
                let _ = source.governor().trip(info);
                EnrichmentOutcome::Failed
            }
            ProviderResult::Error(e) => {
                log::warn!(target: LOG_TARGET, "Could not fetch releases for '{}' from {}: {e:#}", target.package_id, source.name());
                EnrichmentOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReleaseOrigin, SourceRepository};
    use crate::sources::Governor;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FixedSource {
        name: &'static str,
        governor: Arc<Governor>,
        claims: Option<&'static str>,
        outcome: fn() -> ProviderResult<Vec<Release>>,
        calls: AtomicUsize,
    }

    impl FixedSource {
        fn new(name: &'static str, outcome: fn() -> ProviderResult<Vec<Release>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                governor: Governor::unlimited(name),
                claims: None,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn claiming(name: &'static str, id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                governor: Governor::unlimited(name),
                claims: Some(id),
                outcome: one_release,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ReleaseSource for FixedSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn governor(&self) -> &Arc<Governor> {
            &self.governor
        }

        fn claims(&self, target: &ReleaseTarget) -> bool {
            self.claims == Some(target.package_id.as_str())
        }

        async fn fetch_releases(&self, _target: &ReleaseTarget) -> ProviderResult<Vec<Release>> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    fn one_release() -> ProviderResult<Vec<Release>> {
        ProviderResult::Found(vec![Release {
            version: "1.0".into(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            title: "1.0".into(),
            description: String::new(),
            url: String::new(),
            origin: ReleaseOrigin::GitHub,
        }])
    }

    fn throttled() -> ProviderResult<Vec<Release>> {
        ProviderResult::RateLimited(None)
    }

    fn target(id: &str, repo: Option<&str>) -> ReleaseTarget {
        ReleaseTarget {
            package_id: id.into(),
            repo: repo.and_then(SourceRepository::detect),
            limit: 5,
            tag_prefix: None,
        }
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
    async fn test_routes_by_repository_kind() {
        let github = FixedSource::new("github", one_release);
        let gitlab = FixedSource::new("gitlab", one_release);
        let engine = EnrichmentEngine::new(github.clone(), gitlab.clone());

        assert!(matches!(engine.enrich(&target("a", Some("https://github.com/o/a"))).await, EnrichmentOutcome::Releases(r) if r.len() == 1));
        assert!(matches!(engine.enrich(&target("b", Some("https://gitlab.gnome.org/GNOME/b"))).await, EnrichmentOutcome::Releases(_)));
        assert_eq!(engine.enrich(&target("c", None)).await, EnrichmentOutcome::NoSource);

        assert_eq!(github.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gitlab.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
    async fn test_vendor_claim_wins_over_repository() {
        let github = FixedSource::new("github", one_release);
        let vendor = FixedSource::claiming("mozilla", "org.mozilla.firefox");
        let engine = EnrichmentEngine::new(github.clone(), FixedSource::new("gitlab", one_release)).with_vendor(vendor.clone());

        let outcome = engine.enrich(&target("org.mozilla.firefox", Some("https://github.com/mozilla/gecko-dev"))).await;

        assert!(matches!(outcome, EnrichmentOutcome::Releases(_)));
        assert_eq!(vendor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(github.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
    async fn test_rate_limit_trips_governor() {
        let github = FixedSource::new("github", throttled);
        let engine = EnrichmentEngine::new(github.clone(), FixedSource::new("gitlab", one_release));
        let t = target("a", Some("https://github.com/o/a"));

        assert_eq!(engine.enrich(&t).await, EnrichmentOutcome::Failed);
        assert_eq!(engine.enrich(&t).await, EnrichmentOutcome::Skipped);
        assert!(EnrichmentOutcome::Skipped.is_failure());
        assert_eq!(github.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
    async fn test_other_repositories_are_not_routed() {
        let engine = EnrichmentEngine::new(FixedSource::new("github", one_release), FixedSource::new("gitlab", one_release));
        let t = ReleaseTarget {
            package_id: "x".into(),
            repo: Some(SourceRepository::other("https://git.sr.ht/~x/y")),
            limit: 5,
            tag_prefix: None,
        };

        assert_eq!(engine.enrich(&t).await, EnrichmentOutcome::NoSource);
    }
}
