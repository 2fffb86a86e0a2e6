use super::Host;
use super::common::{ColorMode, LogLevel, init_logging};
use super::config::Config;
use super::progress_reporter::ProgressReporter;
use crate::Result;
use crate::dataset::{self, Dataset};
use crate::pipeline::{EnrichmentEngine, Pipeline, PipelineSettings, Progress};
use crate::sources::flathub::{FlathubSettings, FlathubUpstream};
use crate::sources::forges::{GitHubReleases, GitLabReleases};
use crate::sources::homebrew::{HomebrewSettings, HomebrewUpstream, TapSettings, TapsUpstream};
use crate::sources::http::{GITHUB_ORIGINS, HttpClient, HttpSettings};
use crate::sources::os_images::{OsImageSettings, OsImagesUpstream};
use crate::sources::vendor::{MozillaReleases, MozillaSettings};
use crate::sources::{Governor, Selector, Upstream};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::Serialize;
use serde::de::IntoDeserializer;
use serde::de::value::StrDeserializer;
use std::io::Write;
use std::sync::Arc;

const LOG_TARGET: &str = "   command";

/// Which identifiers discovery starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// The curated Brewfile lists, taps, and OS images that define the catalog
    Curated,

    /// The Flathub feed of recently updated apps
    Recent,
}

impl From<Mode> for Selector {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Curated => Self::Curated,
            Mode::Recent => Self::Recent,
        }
    }
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Discovery mode
    #[arg(long, value_name = "MODE", default_value = "curated")]
    pub mode: Mode,

    /// Where to write the dataset
    #[arg(long, short = 'o', value_name = "PATH", default_value = "data/packages.json")]
    pub output: Utf8PathBuf,

    /// Path to a configuration file (the built-in defaults are used otherwise)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// GitHub personal access token, raising the GitHub rate limits
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorMode,

    /// Abandon the run after this long (e.g. `15m`); nothing is written
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

/// The one-line report printed after a successful run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary<'a> {
    success: bool,
    output: &'a str,
    #[serde(with = "humantime_serde")]
    duration: Duration,
    packages: usize,
    packages_with_releases: usize,
    packages_enriched: usize,
    enrichment_failures: usize,
}

/// Build the dataset and write it to `args.output`.
///
/// # Errors
///
/// Fails when the configuration cannot be loaded, nothing was discovered, the run
/// was interrupted or timed out, or the dataset cannot be written. The previous
/// dataset is left in place in every case.
pub async fn generate_dataset<H: Host>(host: &mut H, args: &GenerateArgs) -> Result<()> {
    init_logging(args.log_level);

    let config = Config::load(args.config.as_deref())?;
    let now = Utc::now();

    let token = args.github_token.as_deref().map(str::trim).filter(|t| !t.is_empty());
    if token.is_none() {
        log::info!(target: LOG_TARGET, "No GitHub token supplied, using unauthenticated rate limits");
    }

    let mut credential_origins: Vec<String> = GITHUB_ORIGINS.iter().map(ToString::to_string).collect();
    credential_origins.push(config.endpoints.github_api.clone());

    let http = HttpClient::new(&HttpSettings {
        timeout: config.request_timeout,
        max_retries: config.max_retries,
        token: token.map(str::to_string),
        credential_origins,
        ..HttpSettings::default()
    })?;

    let delay = if args.log_level == LogLevel::None {
        Duration::from_millis(300)
    } else {
        Duration::from_hours(365 * 24)
    };
    let progress: Arc<dyn Progress> = Arc::new(ProgressReporter::new(delay, args.color.use_colors()));

    let settings = PipelineSettings {
        selector: args.mode.into(),
        release_cap: config.release_cap,
        forge_release_limit: config.forge_release_limit,
        os_release_limit: config.os_release_limit,
        detail_workers: config.detail_workers,
        enrich_workers: config.enrich_workers,
        slow_stage_warning: config.slow_stage_warning,
        authenticated: http.is_authenticated(),
    };

    let pipeline = Pipeline::new(
        build_upstreams(&config, &http, now),
        build_engine(&config, &http, now),
        settings,
        Arc::clone(&progress),
        now,
    );

    let result = until_cancelled(pipeline.run(), args.timeout).await;
    if result.is_err() {
        progress.done();
    }
    let output = result?;

    let dataset = Dataset::from(output);
    dataset::write(&dataset, &args.output)?;

    let stats = &dataset.metadata.stats;
    let summary = RunSummary {
        success: true,
        output: args.output.as_str(),
        duration: dataset.metadata.build_duration,
        packages: stats.packages_total,
        packages_with_releases: stats.packages_with_releases,
        packages_enriched: stats.packages_enriched,
        enrichment_failures: stats.enrichment_failures,
    };

    let line = serde_json::to_string(&summary).into_app_err("serializing run summary")?;
    let _ = writeln!(host.output(), "{line}");
    Ok(())
}

/// The discovery upstreams in priority order, each with its own governor.
fn build_upstreams(config: &Config, http: &HttpClient, now: DateTime<Utc>) -> Vec<Arc<dyn Upstream>> {
    let auth = http.is_authenticated();
    let endpoints = &config.endpoints;

    vec![
        Arc::new(OsImagesUpstream::new(
            http.clone(),
            OsImageSettings {
                github_api: endpoints.github_api.clone(),
                images: config.os_images.clone(),
            },
            Governor::unlimited("os-images"),
            now,
        )),
        Arc::new(FlathubUpstream::new(
            http.clone(),
            FlathubSettings {
                api_base: endpoints.flathub.clone(),
                catalog_base: config.catalog_base_url.clone(),
                lists: config.flatpak_lists.clone(),
                feed_cap: config.recent_feed_cap,
            },
            Governor::new("flathub", config.governors.flathub.limits(auth)),
            now,
        )),
        Arc::new(HomebrewUpstream::new(
            http.clone(),
            HomebrewSettings {
                api_base: endpoints.homebrew.clone(),
                catalog_base: config.catalog_base_url.clone(),
                lists: config.homebrew_lists.clone(),
            },
            Governor::new("homebrew", config.governors.homebrew.limits(auth)),
            now,
        )),
        Arc::new(TapsUpstream::new(
            http.clone(),
            TapSettings {
                github_api: endpoints.github_api.clone(),
                taps: config.taps.clone(),
            },
            Governor::new("homebrew-taps", config.governors.github.limits(auth)),
            now,
        )),
    ]
}

fn build_engine(config: &Config, http: &HttpClient, now: DateTime<Utc>) -> EnrichmentEngine {
    let auth = http.is_authenticated();
    let endpoints = &config.endpoints;

    let github = GitHubReleases::new(http.clone(), endpoints.github_api.as_str(), Governor::new("github", config.governors.github.limits(auth)));
    let gitlab = GitLabReleases::new(http.clone(), Governor::new("gitlab", config.governors.gitlab.limits(auth)));
    let mozilla = MozillaReleases::new(
        http.clone(),
        MozillaSettings {
            product_details: endpoints.mozilla_product_details.clone(),
            firefox_notes: endpoints.firefox_notes.clone(),
            thunderbird_notes: endpoints.thunderbird_notes.clone(),
        },
        Governor::new("mozilla", config.governors.vendor.limits(auth)),
        now,
    );

    EnrichmentEngine::new(Arc::new(github), Arc::new(gitlab)).with_vendor(Arc::new(mozilla))
}

/// Drive `work` to completion unless Ctrl-C arrives or `timeout` elapses first.
///
/// Losing the race drops `work`, which aborts its worker pools and in-flight requests.
async fn until_cancelled<T>(work: impl Future<Output = Result<T>>, timeout: Option<Duration>) -> Result<T> {
    let deadline = async {
        match timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => core::future::pending().await,
        }
    };

    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => Err(app_err!("interrupted, no dataset was written")),
        () = deadline => Err(app_err!("run did not finish within {:?}, no dataset was written", timeout.unwrap_or_default())),
    }
}

fn parse_duration(s: &str) -> core::result::Result<Duration, String> {
    let deserializer: StrDeserializer<'_, serde::de::value::Error> = s.into_deserializer();
    humantime_serde::deserialize(deserializer).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_duration("1h 30s"), Ok(Duration::from_secs(3630)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_mode_maps_to_selector() {
        assert_eq!(Selector::from(Mode::Curated), Selector::Curated);
        assert_eq!(Selector::from(Mode::Recent), Selector::Recent);
    }

    #[test]
    fn test_upstreams_in_priority_order() {
        let config = Config::default();
        let http = HttpClient::new(&HttpSettings::default()).unwrap();
        let names: Vec<_> = build_upstreams(&config, &http, Utc::now()).iter().map(|u| u.name()).collect();

        assert_eq!(names, ["os-images", "flathub", "homebrew", "homebrew-taps"]);
    }

    #[test]
    fn test_each_upstream_has_its_own_governor() {
        let config = Config::default();
        let http = HttpClient::new(&HttpSettings::default()).unwrap();
        let upstreams = build_upstreams(&config, &http, Utc::now());

        let _ = upstreams[1].governor().trip(None);
        assert!(upstreams[1].governor().is_tripped());
        assert_eq!(upstreams.iter().filter(|u| u.governor().is_tripped()).count(), 1);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
    async fn test_timeout_cancels_work() {
        let work = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        };

        let err = until_cancelled(work, Some(Duration::from_millis(20))).await.unwrap_err();
        assert!(err.to_string().contains("no dataset was written"));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
    async fn test_work_finishing_first_wins() {
        let value = until_cancelled(async { Ok(7) }, Some(Duration::from_secs(30))).await.unwrap();
        assert_eq!(value, 7);
    }
}
