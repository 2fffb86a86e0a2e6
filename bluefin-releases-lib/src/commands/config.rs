use crate::Result;
use crate::sources::GovernorPolicy;
use crate::sources::brewfile::CuratedList;
use crate::sources::homebrew::TapConfig;
use crate::sources::os_images::OsImageConfig;
use camino::Utf8Path;
use core::time::Duration;
use ohno::{EnrichableExt, IntoAppError, app_err, bail};
use serde::{Deserialize, Serialize};
use std::fs;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base URL the curated Brewfile paths are resolved against
    pub catalog_base_url: String,

    /// Maximum number of releases kept per package
    #[serde(default = "default_release_cap")]
    pub release_cap: usize,

    /// Releases requested from a forge per package
    #[serde(default = "default_forge_release_limit")]
    pub forge_release_limit: usize,

    /// Releases requested for an OS image repository
    #[serde(default = "default_os_release_limit")]
    pub os_release_limit: usize,

    /// Maximum entries taken from the recently-updated feed
    #[serde(default = "default_recent_feed_cap")]
    pub recent_feed_cap: usize,

    #[serde(default = "default_detail_workers")]
    pub detail_workers: usize,

    #[serde(default = "default_enrich_workers")]
    pub enrich_workers: usize,

    /// Timeout applied to every outbound request
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Retries for network failures and server errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Stages running longer than this are logged as warnings
    #[serde(default = "default_slow_stage_warning", with = "humantime_serde")]
    pub slow_stage_warning: Duration,

    #[serde(default)]
    pub flatpak_lists: Vec<CuratedList>,

    #[serde(default)]
    pub homebrew_lists: Vec<CuratedList>,

    #[serde(default)]
    pub taps: Vec<TapConfig>,

    #[serde(default)]
    pub os_images: Vec<OsImageConfig>,

    pub endpoints: Endpoints,

    pub governors: Governors,
}

/// Base URLs of every upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoints {
    pub flathub: String,
    pub homebrew: String,
    pub github_api: String,
    pub mozilla_product_details: String,
    pub firefox_notes: String,
    pub thunderbird_notes: String,
}

/// Rate policy of each upstream family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Governors {
    pub flathub: GovernorPolicy,
    pub homebrew: GovernorPolicy,
    pub github: GovernorPolicy,
    pub gitlab: GovernorPolicy,
    pub vendor: GovernorPolicy,
}

impl Governors {
    fn iter(&self) -> impl Iterator<Item = (&'static str, &GovernorPolicy)> {
        [
            ("flathub", &self.flathub),
            ("homebrew", &self.homebrew),
            ("github", &self.github),
            ("gitlab", &self.gitlab),
            ("vendor", &self.vendor),
        ]
        .into_iter()
    }
}

const fn default_release_cap() -> usize {
    10
}

const fn default_forge_release_limit() -> usize {
    5
}

const fn default_os_release_limit() -> usize {
    30
}

const fn default_recent_feed_cap() -> usize {
    50
}

const fn default_detail_workers() -> usize {
    10
}

const fn default_enrich_workers() -> usize {
    5
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_slow_stage_warning() -> Duration {
    Duration::from_secs(120)
}

impl Config {
    /// Load configuration from a file, or use the embedded defaults when no path is given
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation
    pub fn load(config_path: Option<&Utf8Path>) -> Result<Self> {
        let Some(path) = config_path else {
            return Ok(Self::default());
        };

        let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{path}'"))?;
        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{path}'"))?;
        config
            .validate()
            .map_err(|e| e.enrich_with(|| format!("validating configuration file '{path}'")))?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and `force` is not set, or if it cannot be written
    pub fn save_default(output_path: &Utf8Path, force: bool) -> Result<()> {
        if !force && output_path.exists() {
            bail!("'{output_path}' already exists, use --force to overwrite it");
        }

        if let Some(parent) = output_path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent).into_app_err_with(|| format!("unable to create directory '{parent}'"))?;
        }

        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if a worker count, cap, or concurrency limit is zero
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("release_cap", self.release_cap),
            ("forge_release_limit", self.forge_release_limit),
            ("os_release_limit", self.os_release_limit),
            ("recent_feed_cap", self.recent_feed_cap),
            ("detail_workers", self.detail_workers),
            ("enrich_workers", self.enrich_workers),
        ];

        if let Some((name, _)) = counts.iter().find(|(_, value)| *value == 0) {
            return Err(app_err!("{name} must be greater than zero"));
        }

        for (name, policy) in self.governors.iter() {
            if policy.max_concurrent == 0 {
                return Err(app_err!("governors.{name}.max_concurrent must be greater than zero"));
            }

            if policy.authenticated.is_some_and(|limits| limits.max_concurrent == 0) {
                return Err(app_err!("governors.{name}.authenticated.max_concurrent must be greater than zero"));
            }
        }

        if self.catalog_base_url.trim().is_empty() {
            return Err(app_err!("catalog_base_url must not be empty"));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}
