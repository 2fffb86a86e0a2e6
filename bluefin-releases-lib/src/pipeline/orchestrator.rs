//! The five-stage pipeline: discover, fetch details, merge, enrich, finalize.

use super::enrich::{EnrichmentEngine, EnrichmentOutcome};
use super::merge::merge_by_id;
use super::progress::Progress;
use super::request_tracker::{RequestTracker, TopicStatus, TrackedTopic};
use super::run_metadata::{RunMetadata, round_to_millis};
use super::worker_pool::run_pool;
use crate::Result;
use crate::model::{Package, PackageKind, merge_releases};
use crate::sources::{Discovered, ProviderResult, ReleaseTarget, Selector, Upstream};
use chrono::{DateTime, Utc};
use core::time::Duration;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Instant;

const LOG_TARGET: &str = "  pipeline";

/// Tunables of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub selector: Selector,

    /// Maximum number of releases kept per package.
    pub release_cap: usize,

    /// Releases requested from a forge per package.
    pub forge_release_limit: usize,

    /// Releases requested for an OS image, before filtering by stream.
    pub os_release_limit: usize,

    pub detail_workers: usize,
    pub enrich_workers: usize,

    /// Stages running longer than this are reported as slow.
    pub slow_stage_warning: Duration,

    /// Whether a credential was supplied, recorded in the run metadata.
    pub authenticated: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            selector: Selector::Curated,
            release_cap: 10,
            forge_release_limit: 5,
            os_release_limit: 30,
            detail_workers: 10,
            enrich_workers: 5,
            slow_stage_warning: Duration::from_secs(120),
            authenticated: false,
        }
    }
}

/// The final package collection and the metadata describing how it was built.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Packages ordered by identifier.
    pub packages: Vec<Package>,
    pub metadata: RunMetadata,
}

/// One discovered identifier queued for detail fetching.
struct DetailJob {
    rank: usize,
    seq: usize,
    upstream: Arc<dyn Upstream>,
    item: Discovered,
}

enum DetailOutcome {
    Fetched { rank: usize, seq: usize, package: Package },
    Dropped,
    Failed,
}

/// Sequences the stages of a run. Each stage joins completely before the next starts.
pub struct Pipeline {
    upstreams: Vec<Arc<dyn Upstream>>,
    engine: Arc<EnrichmentEngine>,
    settings: PipelineSettings,
    progress: Arc<dyn Progress>,
    now: DateTime<Utc>,
}

impl core::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline")
            .field("upstreams", &self.upstreams)
            .field("engine", &self.engine)
            .field("settings", &self.settings)
            .field("progress", &"<dyn Progress>")
            .field("now", &self.now)
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline over `upstreams`, listed in priority order (highest first).
    #[must_use]
    pub fn new(
        upstreams: Vec<Arc<dyn Upstream>>,
        engine: EnrichmentEngine,
        settings: PipelineSettings,
        progress: Arc<dyn Progress>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            upstreams,
            engine: Arc::new(engine),
            settings,
            progress,
            now,
        }
    }

    /// Run every stage and return the merged, enriched packages.
    ///
    /// # Errors
    ///
    /// Fails only when there is nothing to build a dataset from: no upstream
    /// discovered any identifier, or no identifier yielded a package.
    pub async fn run(&self) -> Result<PipelineOutput> {
        let started = Instant::now();
        let mut metadata = RunMetadata::new(self.now, self.settings.selector, self.settings.authenticated);
        let tracker = RequestTracker::new(&self.progress);

        let stage = Instant::now();
        self.progress.set_phase("Discovering");
        let (jobs, discovery_failures) = self.discover(&tracker).await;
        metadata.performance.discovery = self.stage_done("discovery", stage);
        metadata.stats.discovery_failures = discovery_failures;

        if jobs.is_empty() {
            self.progress.done();
            ohno::bail!("no package identifiers were discovered from any upstream");
        }

        let stage = Instant::now();
        self.progress.set_phase("Fetching");
        let (fetched, detail_failures) = self.fetch_details(jobs, &tracker).await;
        metadata.performance.details = self.stage_done("details", stage);
        metadata.stats.detail_failures = detail_failures;

        let stage = Instant::now();
        self.progress.set_phase("Merging");
        let mut merged = merge_by_id(fetched, self.settings.release_cap);
        metadata.performance.merge = self.stage_done("merge", stage);

        if merged.is_empty() {
            self.progress.done();
            ohno::bail!("no package details could be fetched from any upstream");
        }

        let stage = Instant::now();
        self.progress.set_phase("Enriching");
        let targets: Vec<_> = merged
            .values()
            .map(|pkg| self.release_target(pkg))
            .filter(|target| self.engine.route(target).is_some())
            .collect();
        tracker.add_requests(TrackedTopic::Releases, targets.len() as u64);

        let engine = Arc::clone(&self.engine);
        let enrich_tracker = tracker.clone();
        let outcomes = run_pool(targets, self.settings.enrich_workers, move |target| {
            let engine = Arc::clone(&engine);
            let tracker = enrich_tracker.clone();
            async move {
                let outcome = engine.enrich(&target).await;
                if outcome == EnrichmentOutcome::Skipped {
                    tracker.set_topic_status(TrackedTopic::Releases, TopicStatus::Throttled);
                }
                tracker.complete_request(TrackedTopic::Releases);
                (target.package_id, outcome)
            }
        })
        .await;

        for (id, outcome) in outcomes {
            if outcome.is_failure() {
                metadata.stats.enrichment_failures += 1;
                continue;
            }

            let EnrichmentOutcome::Releases(releases) = outcome else {
                continue;
            };
            let Some(pkg) = merged.get_mut(&id) else {
                continue;
            };
            if !releases.is_empty() {
                metadata.stats.packages_enriched += 1;
            }
            let existing = core::mem::take(&mut pkg.releases);
            pkg.releases = merge_releases(releases, existing, self.settings.release_cap);
        }
        metadata.performance.enrichment = self.stage_done("enrichment", stage);

        let stage = Instant::now();
        self.progress.set_phase("Finalizing");
        let packages: Vec<Package> = merged.into_values().collect();
        metadata.stats.tally(&packages);
        metadata.performance.finalize = self.stage_done("finalize", stage);
        metadata.build_duration = round_to_millis(started.elapsed());

        self.progress.done();

        log::info!(
            target: LOG_TARGET,
            "Built {} packages ({} with releases, {} enriched, {} enrichment failures) in {:?}",
            metadata.stats.packages_total,
            metadata.stats.packages_with_releases,
            metadata.stats.packages_enriched,
            metadata.stats.enrichment_failures,
            metadata.build_duration
        );

        Ok(PipelineOutput { packages, metadata })
    }

    /// Ask every upstream for identifiers, concurrently.
    async fn discover(&self, tracker: &RequestTracker) -> (Vec<DetailJob>, usize) {
        let selector = self.settings.selector;
        tracker.add_requests(TrackedTopic::Discovery, self.upstreams.len() as u64);

        let results = join_all(self.upstreams.iter().map(|upstream| async move {
            let result = upstream.discover(selector).await;
            tracker.complete_request(TrackedTopic::Discovery);
            result
        }))
        .await;

        let mut jobs = Vec::new();
        let mut failures = 0;
        for (rank, (upstream, result)) in self.upstreams.iter().zip(results).enumerate() {
            let items = match result {
                ProviderResult::Found(items) => items,
                ProviderResult::NotFound => Vec::new(),
                ProviderResult::RateLimited(info) => {
                    if upstream.governor().trip(info) {
                        tracker.println(&format!("{} is rate limiting requests, skipping it for this run", upstream.name()));
                    }
                    failures += 1;
                    Vec::new()
                }
                ProviderResult::Unavailable(reason) => {
                    log::warn!(target: LOG_TARGET, "Discovery from {} failed: {reason}", upstream.name());
                    failures += 1;
                    Vec::new()
                }
                ProviderResult::Error(e) => {
                    log::warn!(target: LOG_TARGET, "Discovery from {} failed: {e:#}", upstream.name());
                    failures += 1;
                    Vec::new()
                }
            };

            log::info!(target: LOG_TARGET, "{} discovered {} identifiers", upstream.name(), items.len());

            let base = jobs.len();
            jobs.extend(items.into_iter().enumerate().map(|(i, item)| DetailJob {
                rank,
                seq: base + i,
                upstream: Arc::clone(upstream),
                item,
            }));
        }

        (jobs, failures)
    }

    /// Fetch every discovered identifier on the bounded detail pool.
    ///
    /// Returned packages are in upstream priority order, then discovery order.
    async fn fetch_details(&self, jobs: Vec<DetailJob>, tracker: &RequestTracker) -> (Vec<Package>, usize) {
        tracker.add_requests(TrackedTopic::Details, jobs.len() as u64);

        let worker_tracker = tracker.clone();
        let outcomes = run_pool(jobs, self.settings.detail_workers, move |job| {
            let tracker = worker_tracker.clone();
            async move {
                let outcome = fetch_one(job, &tracker).await;
                tracker.complete_request(TrackedTopic::Details);
                outcome
            }
        })
        .await;

        let mut failures = 0;
        let mut fetched = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                DetailOutcome::Fetched { rank, seq, package } => fetched.push((rank, seq, package)),
                DetailOutcome::Failed => failures += 1,
                DetailOutcome::Dropped => {}
            }
        }

        fetched.sort_by_key(|(rank, seq, _)| (*rank, *seq));
        (fetched.into_iter().map(|(_, _, pkg)| pkg).collect(), failures)
    }

    fn release_target(&self, pkg: &Package) -> ReleaseTarget {
        let (limit, tag_prefix) = match (&pkg.kind, &pkg.os_info) {
            (PackageKind::Os, Some(info)) => (self.settings.os_release_limit, Some(format!("{}-", info.stream))),
            _ => (self.settings.forge_release_limit, None),
        };

        ReleaseTarget {
            package_id: pkg.id.clone(),
            repo: pkg.source_repo.clone(),
            limit,
            tag_prefix,
        }
    }

    fn stage_done(&self, name: &str, started: Instant) -> Duration {
        let elapsed = round_to_millis(started.elapsed());
        if elapsed > self.settings.slow_stage_warning {
            log::warn!(target: LOG_TARGET, "Stage '{name}' was slow: {elapsed:?}");
        } else {
            log::info!(target: LOG_TARGET, "Stage '{name}' finished in {elapsed:?}");
        }
        elapsed
    }
}

async fn fetch_one(job: DetailJob, tracker: &RequestTracker) -> DetailOutcome {
    let DetailJob { rank, seq, upstream, item } = job;
    let id = item.id.clone();

    let Some(_permit) = upstream.governor().acquire().await else {
        log::debug!(target: LOG_TARGET, "Skipping '{id}', {} is rate limited", upstream.name());
        return DetailOutcome::Failed;
    };

    match upstream.fetch_detail(item).await {
        ProviderResult::Found(package) => DetailOutcome::Fetched { rank, seq, package },
        ProviderResult::NotFound => {
            log::info!(target: LOG_TARGET, "{} has no record of '{id}'", upstream.name());
            DetailOutcome::Dropped
        }
        ProviderResult::Unavailable(reason) => {
            log::info!(target: LOG_TARGET, "Dropping '{id}': {reason}");
            DetailOutcome::Dropped
        }
        ProviderResult::RateLimited(info) => {
            if upstream.governor().trip(info) {
                tracker.set_topic_status(TrackedTopic::Details, TopicStatus::Throttled);
                tracker.println(&format!("{} is rate limiting requests, skipping its remaining packages", upstream.name()));
            }
            DetailOutcome::Failed
        }
        ProviderResult::Error(e) => {
            log::warn!(target: LOG_TARGET, "Could not fetch '{id}' from {}: {e:#}", upstream.name());
            DetailOutcome::Failed
        }
    }
}
