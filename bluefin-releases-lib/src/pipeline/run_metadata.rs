use crate::model::{Package, PackageKind};
use crate::sources::Selector;
use chrono::{DateTime, Utc};
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the dataset layout written by this crate.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Wall time spent in each pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    #[serde(with = "humantime_serde")]
    pub discovery: Duration,
    #[serde(with = "humantime_serde")]
    pub details: Duration,
    #[serde(with = "humantime_serde")]
    pub merge: Duration,
    #[serde(with = "humantime_serde")]
    pub enrichment: Duration,
    #[serde(with = "humantime_serde")]
    pub finalize: Duration,
}

/// Aggregate counts over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub packages_total: usize,
    pub packages_with_source_repo: usize,
    pub packages_with_releases: usize,
    pub total_releases: usize,
    pub packages_enriched: usize,
    pub enrichment_failures: usize,
    pub detail_failures: usize,
    pub discovery_failures: usize,
    pub packages_by_kind: BTreeMap<PackageKind, usize>,
}

impl RunStats {
    /// Compute the package-derived counts; failure counters are filled in by the stages.
    pub fn tally<'a>(&mut self, packages: impl IntoIterator<Item = &'a Package>) {
        self.packages_total = 0;
        self.packages_with_source_repo = 0;
        self.packages_with_releases = 0;
        self.total_releases = 0;
        self.packages_by_kind.clear();

        for pkg in packages {
            self.packages_total += 1;
            self.total_releases += pkg.releases.len();

            if pkg.has_source_repo() {
                self.packages_with_source_repo += 1;
            }

            if !pkg.releases.is_empty() {
                self.packages_with_releases += 1;
            }

            *self.packages_by_kind.entry(pkg.kind).or_default() += 1;
        }
    }
}

/// Describes the run that produced a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub generated_by: String,
    pub mode: Selector,
    pub authenticated: bool,
    #[serde(with = "humantime_serde")]
    pub build_duration: Duration,
    pub performance: StageTimings,
    pub stats: RunStats,
}

impl RunMetadata {
    /// Empty metadata for a run starting at `generated_at`.
    #[must_use]
    pub fn new(generated_at: DateTime<Utc>, mode: Selector, authenticated: bool) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at,
            generated_by: format!("bluefin-releases v{}", env!("CARGO_PKG_VERSION")),
            mode,
            authenticated,
            build_duration: Duration::ZERO,
            performance: StageTimings::default(),
            stats: RunStats::default(),
        }
    }
}

/// Drop sub-millisecond noise from a measured duration.
#[must_use]
pub fn round_to_millis(d: Duration) -> Duration {
    Duration::from_millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Release;
    use crate::model::ReleaseOrigin;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_tally() {
        let mut with_releases = Package::new("a", "A", PackageKind::Flatpak, now());
        with_releases.source_repo = crate::model::SourceRepository::detect("https://github.com/o/a");
        with_releases.releases = vec![
            Release {
                version: "1".into(),
                date: now(),
                title: "1".into(),
                description: String::new(),
                url: String::new(),
                origin: ReleaseOrigin::GitHub,
            };
            2
        ];
        let bare = Package::new("b", "B", PackageKind::Homebrew, now());

        let mut stats = RunStats::default();
        stats.tally([&with_releases, &bare]);

        assert_eq!(stats.packages_total, 2);
        assert_eq!(stats.packages_with_source_repo, 1);
        assert_eq!(stats.packages_with_releases, 1);
        assert_eq!(stats.total_releases, 2);
        assert_eq!(stats.packages_by_kind[&PackageKind::Flatpak], 1);
    }

    #[test]
    fn test_serialized_keys() {
        let mut meta = RunMetadata::new(now(), Selector::Curated, false);
        meta.build_duration = Duration::from_millis(1500);
        let _ = meta.stats.packages_by_kind.insert(PackageKind::Os, 3);

        let json = serde_json::to_value(&meta).unwrap();

        assert_eq!(json["schemaVersion"], "1.0.0");
        assert_eq!(json["generatedAt"], "2025-06-01T12:00:00Z");
        assert_eq!(json["mode"], "curated");
        assert_eq!(json["buildDuration"], "1s 500ms");
        assert_eq!(json["performance"]["discovery"], "0s");
        assert_eq!(json["stats"]["packagesByKind"]["os"], 3);
        assert!(json["generatedBy"].as_str().unwrap().starts_with("bluefin-releases v"));
    }

    #[test]
    fn test_round_to_millis() {
        assert_eq!(round_to_millis(Duration::from_micros(1_234_567)), Duration::from_millis(1234));
    }
}
