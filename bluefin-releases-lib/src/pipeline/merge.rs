use crate::model::{HomebrewInfo, Package, merge_releases};
use std::collections::BTreeMap;

/// Fold packages into one record per identifier.
///
/// `packages` must be ordered by upstream priority, highest first: for every scalar
/// field the first non-empty value wins. Categories are unioned, the first source
/// repository wins, and release lists are combined keeping the higher-priority entry
/// of each version. The result is ordered by identifier.
pub fn merge_by_id(packages: impl IntoIterator<Item = Package>, release_cap: usize) -> BTreeMap<String, Package> {
    let mut merged: BTreeMap<String, Package> = BTreeMap::new();

    for pkg in packages {
        match merged.get_mut(&pkg.id) {
            Some(existing) => absorb(existing, pkg, release_cap),
            None => {
                let mut pkg = pkg;
                pkg.categories.sort();
                pkg.categories.dedup();
                pkg.releases = merge_releases(core::mem::take(&mut pkg.releases), Vec::new(), release_cap);
                let _ = merged.insert(pkg.id.clone(), pkg);
            }
        }
    }

    merged
}

/// Fill the gaps of `into` from a lower-priority record of the same package.
fn absorb(into: &mut Package, from: Package, release_cap: usize) {
    fill_string(&mut into.name, from.name);
    fill_string(&mut into.summary, from.summary);
    fill_string(&mut into.description, from.description);
    fill(&mut into.developer_name, from.developer_name);
    fill(&mut into.icon, from.icon);
    fill(&mut into.license, from.license);
    fill(&mut into.classification, from.classification);
    fill(&mut into.version, from.version);
    fill(&mut into.updated_at, from.updated_at);
    fill(&mut into.url, from.url);
    fill(&mut into.source_repo, from.source_repo);
    fill(&mut into.os_info, from.os_info);

    into.homebrew_info = match (into.homebrew_info.take(), from.homebrew_info) {
        (Some(mut ours), Some(theirs)) => {
            merge_homebrew_info(&mut ours, theirs);
            Some(ours)
        }
        (ours, theirs) => ours.or(theirs),
    };

    into.categories.extend(from.categories);
    into.categories.sort();
    into.categories.dedup();

    let ours = core::mem::take(&mut into.releases);
    into.releases = merge_releases(ours, from.releases, release_cap);
}

fn merge_homebrew_info(into: &mut HomebrewInfo, from: HomebrewInfo) {
    fill_string(&mut into.formula, from.formula);
    fill(&mut into.full_name, from.full_name);
    fill(&mut into.tap, from.tap);
    fill(&mut into.homepage, from.homepage);
    if into.versions.is_empty() {
        into.versions = from.versions;
    }
    into.cask |= from.cask;
    into.experimental |= from.experimental;
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn fill_string(slot: &mut String, value: String) {
    if slot.trim().is_empty() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PackageKind, Release, ReleaseOrigin, SourceRepository};
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn pkg(id: &str, name: &str) -> Package {
        Package::new(id, name, PackageKind::Homebrew, now())
    }

    fn release(version: &str, day: u32, origin: ReleaseOrigin) -> Release {
        Release {
            version: version.into(),
            date: Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap(),
            title: version.into(),
            description: String::new(),
            url: String::new(),
            origin,
        }
    }

    #[test]
    fn test_one_record_per_id() {
        let merged = merge_by_id([pkg("b", "B"), pkg("a", "A"), pkg("b", "B2"), pkg("c", "C")], 10);

        assert_eq!(merged.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(merged["b"].name, "B");
    }

    #[test]
    fn test_scalars_fall_back_to_lower_priority() {
        let mut high = pkg("x", "X");
        high.summary = "from high".into();

        let mut low = pkg("x", "x-low");
        low.summary = "from low".into();
        low.description = "long text".into();
        low.license = Some("MIT".into());

        let merged = merge_by_id([high, low], 10);
        let x = &merged["x"];

        assert_eq!(x.name, "X");
        assert_eq!(x.summary, "from high");
        assert_eq!(x.description, "long text");
        assert_eq!(x.license.as_deref(), Some("MIT"));
    }

    #[test]
    fn test_categories_are_unioned() {
        let mut a = pkg("x", "X");
        a.categories = vec!["Utility".into(), "Development".into()];
        let mut b = pkg("x", "X");
        b.categories = vec!["Development".into(), "Network".into()];

        let merged = merge_by_id([a, b], 10);
        assert_eq!(merged["x"].categories, ["Development", "Network", "Utility"]);
    }

    #[test]
    fn test_first_source_repository_wins() {
        let mut a = pkg("x", "X");
        a.source_repo = SourceRepository::detect("https://github.com/first/x");
        let mut b = pkg("x", "X");
        b.source_repo = SourceRepository::detect("https://github.com/second/x");

        let merged = merge_by_id([pkg("x", "X"), a, b], 10);
        assert_eq!(merged["x"].source_repo.as_ref().unwrap().owner.as_deref(), Some("first"));
    }

    #[test]
    fn test_releases_are_combined() {
        let mut a = pkg("x", "X");
        a.releases = vec![release("1.0", 1, ReleaseOrigin::Appstream)];
        let mut b = pkg("x", "X");
        b.releases = vec![release("v1.0", 2, ReleaseOrigin::Appstream), release("2.0", 3, ReleaseOrigin::Appstream)];

        let merged = merge_by_id([a, b], 10);
        let versions: Vec<_> = merged["x"].releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, ["2.0", "1.0"]);
    }

    #[test]
    fn test_single_record_releases_are_capped() {
        let mut a = pkg("x", "X");
        a.releases = (1..=8).map(|day| release(&format!("1.{day}"), day, ReleaseOrigin::Appstream)).collect();

        let merged = merge_by_id([a], 3);
        let versions: Vec<_> = merged["x"].releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, ["1.8", "1.7", "1.6"]);
    }

    #[test]
    fn test_homebrew_info_is_merged_field_by_field() {
        let mut curated = pkg("homebrew-ublue-os-tap-cli", "cli");
        curated.homebrew_info = Some(HomebrewInfo {
            formula: "ublue-os/tap/cli".into(),
            tap: Some("ublue-os/tap".into()),
            ..HomebrewInfo::default()
        });

        let mut tap = pkg("homebrew-ublue-os-tap-cli", "cli");
        tap.summary = "A tool".into();
        tap.homebrew_info = Some(HomebrewInfo {
            formula: "cli".into(),
            homepage: Some("https://example.org".into()),
            versions: vec!["1.2".into()],
            cask: true,
            ..HomebrewInfo::default()
        });

        let merged = merge_by_id([curated, tap], 10);
        let x = &merged["homebrew-ublue-os-tap-cli"];
        let info = x.homebrew_info.as_ref().unwrap();

        assert_eq!(x.summary, "A tool");
        assert_eq!(info.formula, "ublue-os/tap/cli");
        assert_eq!(info.homepage.as_deref(), Some("https://example.org"));
        assert_eq!(info.versions, ["1.2"]);
        assert!(info.cask);
    }
}
