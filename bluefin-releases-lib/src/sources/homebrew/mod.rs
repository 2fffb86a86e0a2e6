//! Homebrew: formulae from homebrew-core and formulae/casks from custom taps.

mod formula;
mod taps;

pub use formula::{HomebrewSettings, HomebrewUpstream};
pub use taps::{TapConfig, TapSettings, TapsUpstream};

/// Canonical identifier for a Homebrew package.
///
/// Fully qualified tap names (`owner/tap/name`) flatten to `homebrew-owner-tap-name`,
/// which is the same identifier the tap upstream assigns to the tap's own files.
#[must_use]
pub fn package_id(name: &str) -> String {
    format!("homebrew-{}", name.replace('/', "-"))
}

/// The display name of a possibly tap-qualified package name.
fn short_name(name: &str) -> &str {
    let name = name.rsplit('/').next().unwrap_or(name);
    name.strip_prefix("homebrew-").unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_id() {
        assert_eq!(package_id("bat"), "homebrew-bat");
        assert_eq!(package_id("ublue-os/tap/bluefin-cli"), "homebrew-ublue-os-tap-bluefin-cli");
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("bat"), "bat");
        assert_eq!(short_name("ublue-os/tap/bluefin-cli"), "bluefin-cli");
        assert_eq!(short_name("homebrew-thing"), "thing");
    }
}
