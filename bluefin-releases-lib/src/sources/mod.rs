//! Adapters for every upstream the pipeline reads from.
//!
//! Two kinds of adapters live here. An [`Upstream`] discovers package identifiers and
//! fetches package details (Flathub, Homebrew, Homebrew taps, OS images). A
//! [`ReleaseSource`] fetches the recent releases of one package (GitHub, GitLab and
//! vendor release notes). Every adapter reports per-item outcomes as a
//! [`ProviderResult`] and is admitted by its own [`Governor`].

pub mod brewfile;
pub mod flathub;
pub mod forges;
mod governor;
pub mod homebrew;
pub mod http;
pub mod markup;
pub mod os_images;
mod provider_result;
mod upstream;
pub mod vendor;

pub use governor::{Governor, GovernorLimits, GovernorPolicy};
pub use provider_result::{ProviderResult, RateLimitInfo};
pub(crate) use provider_result::unwrap_found;
pub use upstream::{Discovered, ReleaseSource, ReleaseTarget, Selector, Upstream};
