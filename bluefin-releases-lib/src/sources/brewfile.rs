//! Curated package lists published as Brewfiles.
//!
//! The catalog is defined by a handful of Brewfiles in a public repository. Each
//! list carries a classification label (`core`, `dx`, `cli`, ...) that ends up on
//! every package discovered from it.

use super::http::{Auth, HttpClient};
use super::ProviderResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

const LOG_TARGET: &str = "  brewfile";

static FLATPAK_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?m)^\s*flatpak\s+"([^"]+)""#).expect("invalid regex"));
static BREW_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?m)^\s*brew\s+"([^"]+)""#).expect("invalid regex"));

/// The kind of Brewfile entry to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Flatpak,
    Brew,
}

impl Directive {
    fn regex(self) -> &'static Regex {
        match self {
            Self::Flatpak => &FLATPAK_REGEX,
            Self::Brew => &BREW_REGEX,
        }
    }
}

/// One curated list: a Brewfile path relative to the catalog base URL, and its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CuratedList {
    pub path: String,
    pub classification: String,
}

/// An entry pulled from a curated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratedEntry {
    pub name: String,
    pub classification: String,
}

/// Extract the quoted names of every `directive` line, in file order.
#[must_use]
pub fn parse_entries(content: &str, directive: Directive) -> Vec<String> {
    directive
        .regex()
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Fetch every list and return the entries, keeping the first occurrence of each name.
///
/// A list that cannot be fetched is skipped with a warning. A rate-limit response
/// aborts the whole operation since every remaining list lives on the same host.
pub async fn fetch_curated(http: &HttpClient, base_url: &str, lists: &[CuratedList], directive: Directive) -> ProviderResult<Vec<CuratedEntry>> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for list in lists {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), list.path.trim_start_matches('/'));
        log::debug!(target: LOG_TARGET, "Fetching curated list '{url}'");

        let content = match http.get_text(&url, Auth::Bearer).await {
            ProviderResult::Found(content) => content,
            ProviderResult::RateLimited(info) => return ProviderResult::RateLimited(info),
            ProviderResult::NotFound => {
                log::warn!(target: LOG_TARGET, "Curated list '{url}' does not exist, skipping it");
                continue;
            }
            ProviderResult::Unavailable(reason) => {
                log::warn!(target: LOG_TARGET, "Curated list '{url}' is unavailable: {reason}");
                continue;
            }
            ProviderResult::Error(e) => {
                log::warn!(target: LOG_TARGET, "Could not fetch curated list '{url}': {e:#}");
                continue;
            }
        };

        let names = parse_entries(&content, directive);
        log::info!(target: LOG_TARGET, "Found {} entries in '{}' ({})", names.len(), list.path, list.classification);

        for name in names {
            if seen.insert(name.clone()) {
                entries.push(CuratedEntry {
                    name,
                    classification: list.classification.clone(),
                });
            }
        }
    }

    ProviderResult::Found(entries)
}
