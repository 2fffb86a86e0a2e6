use super::RateLimitInfo;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

const LOG_TARGET: &str = "  governor";

/// Admission limits for one upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GovernorLimits {
    pub max_concurrent: usize,
    #[serde(default, with = "humantime_serde")]
    pub min_interval: Duration,
}

/// Declared rate policy for one upstream, with optional higher limits when a credential is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GovernorPolicy {
    pub max_concurrent: usize,
    #[serde(default, with = "humantime_serde")]
    pub min_interval: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<GovernorLimits>,
}

impl GovernorPolicy {
    /// Select the limits that apply for the given credential state.
    #[must_use]
    pub fn limits(&self, authenticated: bool) -> GovernorLimits {
        match (authenticated, self.authenticated) {
            (true, Some(limits)) => limits,
            _ => GovernorLimits {
                max_concurrent: self.max_concurrent,
                min_interval: self.min_interval,
            },
        }
    }
}

/// Per-upstream admission control.
///
/// Call [`Governor::acquire`] before each outbound call and hold the returned permit
/// until the call completes. At most `max_concurrent` permits are outstanding at any
/// time, and successive admissions are spaced at least `min_interval` apart.
///
/// Once [`Governor::trip`] has been called (typically because the upstream returned a
/// rate-limit response), every further `acquire` returns `None` so callers abandon the
/// remaining work for this upstream instead of hammering it.
#[derive(Debug)]
pub struct Governor {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    min_interval: Duration,
    next_start: Mutex<Option<Instant>>,
    tripped: AtomicBool,
    admitted: AtomicUsize,
}

impl Governor {
    /// Create a governor enforcing `limits`.
    pub fn new(name: &'static str, limits: GovernorLimits) -> Arc<Self> {
        Arc::new(Self {
            name,
            semaphore: Arc::new(Semaphore::new(limits.max_concurrent.max(1))),
            min_interval: limits.min_interval,
            next_start: Mutex::new(None),
            tripped: AtomicBool::new(false),
            admitted: AtomicUsize::new(0),
        })
    }

    /// A governor that never limits, for adapters that make no network calls.
    pub fn unlimited(name: &'static str) -> Arc<Self> {
        Self::new(
            name,
            GovernorLimits {
                max_concurrent: Semaphore::MAX_PERMITS,
                min_interval: Duration::ZERO,
            },
        )
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for a concurrency slot and the minimum spacing, then admit one call.
    ///
    /// Returns `None` when the governor has been tripped.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        if self.is_tripped() {
            return None;
        }

        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;

        // The trip may have happened while we were queued.
        if self.is_tripped() {
            return None;
        }

        if !self.min_interval.is_zero() {
            let mut next_start = self.next_start.lock().await;
            if let Some(at) = *next_start {
                tokio::time::sleep_until(at).await;
            }
            *next_start = Some(Instant::now() + self.min_interval);
        }

        if self.is_tripped() {
            return None;
        }

        let _ = self.admitted.fetch_add(1, Ordering::Relaxed);
        Some(permit)
    }

    /// Stop admitting work. Returns `true` for the call that actually tripped the governor.
    pub fn trip(&self, info: Option<RateLimitInfo>) -> bool {
        let first = !self.tripped.swap(true, Ordering::AcqRel);
        if first {
            match info {
                Some(info) => log::warn!(
                    target: LOG_TARGET,
                    "{} is rate limited ({} requests remaining, resets at {}), skipping its remaining work",
                    self.name,
                    info.remaining,
                    info.reset_at
                ),
                None => log::warn!(target: LOG_TARGET, "{} is rate limited, skipping its remaining work", self.name),
            }
        }

        first
    }

    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Number of calls admitted so far.
    #[must_use]
    pub fn admitted(&self) -> usize {
        self.admitted.load(Ordering::Relaxed)
    }
}
