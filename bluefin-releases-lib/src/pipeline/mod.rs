//! Sequencing of discovery, detail fetching, merging and enrichment.
//!
//! # Implementation Model
//!
//! A run moves through five stages separated by barriers:
//!
//! 1. **Discover**: every upstream lists identifiers concurrently. An upstream that
//!    fails contributes nothing; the others carry on.
//! 2. **Fetch details**: each identifier is fetched on a bounded worker pool, admitted
//!    by its upstream's governor. Items that fail are dropped.
//! 3. **Merge**: records sharing an identifier are folded into one, in upstream
//!    priority order.
//! 4. **Enrich**: packages with a release source get their recent releases on a
//!    second pool with its own worker count.
//! 5. **Finalize**: statistics are computed and the run metadata is frozen.
//!
//! Workers communicate only through their return values. The package collection is
//! owned by the [`Pipeline`] and mutated after each pool has joined.

mod enrich;
mod merge;
mod orchestrator;
mod progress;
mod request_tracker;
mod run_metadata;
mod worker_pool;

pub use enrich::{EnrichmentEngine, EnrichmentOutcome};
pub use merge::merge_by_id;
pub use orchestrator::{Pipeline, PipelineOutput, PipelineSettings};
pub use progress::{NoProgress, Progress};
pub use request_tracker::{RequestTracker, TopicStatus, TrackedTopic};
pub use run_metadata::{RunMetadata, RunStats, SCHEMA_VERSION, StageTimings};
pub use worker_pool::run_pool;
