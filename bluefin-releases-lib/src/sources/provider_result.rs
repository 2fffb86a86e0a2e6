use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Rate limit information from response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: usize,
    pub reset_at: DateTime<Utc>,
}

/// Outcome of one upstream request for one work item.
#[derive(Debug, Clone)]
pub enum ProviderResult<T> {
    /// The operation succeeded and data was found.
    Found(T),

    /// The upstream has no record for the requested identifier.
    NotFound,

    /// The record exists but cannot be used (deprecated, wrong platform, ...).
    Unavailable(Arc<str>),

    /// The upstream signalled that we are being throttled.
    RateLimited(Option<RateLimitInfo>),

    /// An error occurred during the operation for this item.
    Error(Arc<ohno::AppError>),
}

impl<T> ProviderResult<T> {
    /// Returns `true` if the result is `Found`.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Returns `true` if the upstream throttled the request.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Returns a reference to the contained data if `Found`, otherwise `None`.
    #[must_use]
    pub const fn as_ref(&self) -> Option<&T> {
        match self {
            Self::Found(data) => Some(data),
            _ => None,
        }
    }

    /// Transform the found value, leaving every other outcome untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProviderResult<U> {
        match self {
            Self::Found(data) => ProviderResult::Found(f(data)),
            Self::NotFound => ProviderResult::NotFound,
            Self::Unavailable(reason) => ProviderResult::Unavailable(reason),
            Self::RateLimited(info) => ProviderResult::RateLimited(info),
            Self::Error(e) => ProviderResult::Error(e),
        }
    }

    /// Wrap an error produced while handling this item.
    #[must_use]
    pub fn error(e: impl Into<ohno::AppError>) -> Self {
        Self::Error(Arc::new(e.into()))
    }
}

impl<T> From<crate::Result<T>> for ProviderResult<T> {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(data) => Self::Found(data),
            Err(e) => Self::Error(Arc::new(e)),
        }
    }
}

/// Return the found value, or return the non-found outcome from the enclosing function.
macro_rules! unwrap_found {
    ($result:expr) => {
        match $result {
            $crate::sources::ProviderResult::Found(data) => data,
            $crate::sources::ProviderResult::NotFound => return $crate::sources::ProviderResult::NotFound,
            $crate::sources::ProviderResult::Unavailable(r) => return $crate::sources::ProviderResult::Unavailable(r),
            $crate::sources::ProviderResult::RateLimited(i) => return $crate::sources::ProviderResult::RateLimited(i),
            $crate::sources::ProviderResult::Error(e) => return $crate::sources::ProviderResult::Error(e),
        }
    };
}

pub(crate) use unwrap_found;

#[cfg(test)]
mod tests {
    use super::*;
    use ohno::app_err;

    #[test]
    fn test_is_found_for_found_variant() {
        let result: ProviderResult<String> = ProviderResult::Found("data".to_string());
        assert!(result.is_found());
        assert!(!result.is_rate_limited());
    }

    #[test]
    fn test_is_found_for_other_variants() {
        assert!(!ProviderResult::<u32>::NotFound.is_found());
        assert!(!ProviderResult::<u32>::Unavailable("deprecated".into()).is_found());
        assert!(!ProviderResult::<u32>::RateLimited(None).is_found());
        assert!(!ProviderResult::<u32>::error(app_err!("boom")).is_found());
    }

    #[test]
    fn test_as_ref() {
        assert_eq!(ProviderResult::Found(42).as_ref(), Some(&42));
        assert_eq!(ProviderResult::<u32>::NotFound.as_ref(), None);
    }

    #[test]
    fn test_map_preserves_non_found() {
        let result = ProviderResult::<u32>::RateLimited(None).map(|v| v + 1);
        assert!(result.is_rate_limited());

        let result = ProviderResult::Found(1).map(|v| v + 1);
        assert_eq!(result.as_ref(), Some(&2));
    }

    #[test]
    fn test_from_result() {
        let ok: ProviderResult<u32> = Ok(5).into();
        assert!(ok.is_found());

        let err: ProviderResult<u32> = crate::Result::<u32>::Err(app_err!("bad")).into();
        assert!(matches!(err, ProviderResult::Error(_)));
    }

    #[test]
    fn test_unwrap_found_macro() {
        fn double(input: ProviderResult<u32>) -> ProviderResult<u32> {
            let v = unwrap_found!(input);
            ProviderResult::Found(v * 2)
        }

        assert_eq!(double(ProviderResult::Found(4)).as_ref(), Some(&8));
        assert!(matches!(double(ProviderResult::NotFound), ProviderResult::NotFound));
    }
}
