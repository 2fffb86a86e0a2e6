//! HTTP plumbing shared by every upstream adapter.
//!
//! Requests go through [`seatbelt`] retry and timeout middleware: network failures,
//! per-attempt timeouts and server errors are retried with exponential backoff. The
//! final response is then classified into a [`ProviderResult`] so adapters never
//! interpret status codes themselves.

use super::{ProviderResult, RateLimitInfo};
use chrono::DateTime;
use core::time::Duration;
use layered::{Execute, Service, Stack};
use ohno::{IntoAppError, app_err};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use seatbelt::retry::{Backoff, Retry};
use seatbelt::timeout::Timeout;
use seatbelt::{RecoveryInfo, ResilienceContext};
use serde::de::DeserializeOwned;
use tick::Clock;
use url::Url;

const LOG_TARGET: &str = "      http";

/// Base delay for exponential backoff between retries.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

const USER_AGENT: &str = "bluefin-releases";

/// Origins that may receive the GitHub credential in addition to configured ones.
pub const GITHUB_ORIGINS: [&str; 3] = ["https://api.github.com", "https://github.com", "https://raw.githubusercontent.com"];

/// Whether a request should carry the configured credential.
///
/// `Bearer` only attaches the credential when the request URL belongs to one of the
/// client's credential origins; any other host is contacted anonymously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Anonymous,
    Bearer,
}

/// Settings applied to every request made through an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Limit on each attempt.
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub token: Option<String>,

    /// Base URLs whose scheme, host and port may receive `token`.
    pub credential_origins: Vec<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_base_delay: RETRY_BASE_DELAY,
            token: None,
            credential_origins: GITHUB_ORIGINS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// `scheme://host:port` of a URL, with the host lowercased and the port made explicit.
fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let port = parsed.port_or_known_default()?;
    Some(format!("{}://{host}:{port}", parsed.scheme()))
}

/// One request as handed to the middleware stack; cloned for every attempt.
#[derive(Debug, Clone)]
struct Outgoing {
    url: String,
    authorization: Option<HeaderValue>,
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    authorization: Option<HeaderValue>,
    credential_origins: Vec<String>,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> crate::Result<Self> {
        let authorization = match settings.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => {
                let mut value = HeaderValue::from_str(&format!("Bearer {token}")).into_app_err("invalid credential")?;
                value.set_sensitive(true);
                Some(value)
            }
            _ => None,
        };

        let credential_origins = settings
            .credential_origins
            .iter()
            .map(|base| origin_of(base).ok_or_else(|| app_err!("'{base}' is not a valid credential origin")))
            .collect::<crate::Result<Vec<_>>>()?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .into_app_err("unable to create HTTP client")?;

        Ok(Self {
            client,
            authorization,
            credential_origins,
            timeout: settings.timeout,
            max_retries: settings.max_retries,
            retry_base_delay: settings.retry_base_delay,
        })
    }

    /// Whether a credential was configured.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authorization.is_some()
    }

    /// The credential to attach to a request for `url`, if any.
    fn credential_for(&self, url: &str, auth: Auth) -> Option<HeaderValue> {
        if auth == Auth::Anonymous {
            return None;
        }

        let value = self.authorization.as_ref()?;
        let origin = origin_of(url)?;
        if self.credential_origins.contains(&origin) {
            Some(value.clone())
        } else {
            log::debug!(target: LOG_TARGET, "Not sending the credential to '{origin}'");
            None
        }
    }

    /// Issue a GET request and classify the response.
    pub async fn get(&self, url: &str, auth: Auth) -> ProviderResult<reqwest::Response> {
        let request = Outgoing {
            url: url.to_string(),
            authorization: self.credential_for(url, auth),
        };

        match self.send(request).await {
            Ok(resp) => classify(resp).await,
            Err(e) => ProviderResult::error(e),
        }
    }

    /// Issue a GET request and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, auth: Auth) -> ProviderResult<T> {
        let resp = super::unwrap_found!(self.get(url, auth).await);
        resp.json::<T>()
            .await
            .into_app_err_with(|| format!("decoding response from '{url}'"))
            .into()
    }

    /// Issue a GET request and return the body as text.
    pub async fn get_text(&self, url: &str, auth: Auth) -> ProviderResult<String> {
        let resp = super::unwrap_found!(self.get(url, auth).await);
        resp.text()
            .await
            .into_app_err_with(|| format!("reading response from '{url}'"))
            .into()
    }

    async fn send(&self, request: Outgoing) -> crate::Result<reqwest::Response> {
        let clock = Clock::new_tokio();
        let context = ResilienceContext::new(&clock).name("http_get");

        let client = self.client.clone();
        let timeout = self.timeout;
        let service = (
            Retry::layer("retry", &context)
                .clone_input()
                .recovery_with(|result: &crate::Result<reqwest::Response>, _| should_retry(result))
                .max_retry_attempts(self.max_retries)
                .base_delay(self.retry_base_delay)
                .backoff(Backoff::Exponential)
                .on_retry(|_output, args| {
                    log::debug!(
                        target: LOG_TARGET,
                        "Retrying GET (attempt {}, delay {}ms)",
                        args.attempt().index() + 1,
                        args.retry_delay().as_millis(),
                    );
                }),
            Timeout::layer("timeout", &context)
                .timeout_error(move |_| app_err!("HTTP request timed out after {timeout:?}"))
                .timeout(timeout),
            Execute::new(move |request: Outgoing| {
                let client = client.clone();
                async move {
                    let mut builder = client.get(&request.url);
                    if let Some(value) = request.authorization {
                        builder = builder.header(AUTHORIZATION, value);
                    }
                    builder.send().await.into_app_err_with(|| format!("requesting '{}'", request.url))
                }
            }),
        )
            .into_service();

        service.execute(request).await
    }
}

/// Network errors, timeouts and server errors are transient. Rate limits are not
/// retried here; they trip the upstream's governor instead.
fn should_retry(result: &crate::Result<reqwest::Response>) -> RecoveryInfo {
    match result {
        Err(_) => RecoveryInfo::retry(),
        Ok(resp) if resp.status().is_server_error() => RecoveryInfo::retry(),
        Ok(_) => RecoveryInfo::never(),
    }
}

async fn classify(resp: reqwest::Response) -> ProviderResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return ProviderResult::Found(resp);
    }

    match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            ProviderResult::RateLimited(extract_rate_limit_from_headers(resp.headers()))
        }
        StatusCode::NOT_FOUND => ProviderResult::NotFound,
        _ => {
            let url = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            ProviderResult::error(app_err!("HTTP {status} from '{url}': {snippet}"))
        }
    }
}

/// Extract rate limit information from API response headers
fn extract_rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let remaining = headers.get("x-ratelimit-remaining")?.to_str().ok()?.parse::<usize>().ok()?;

    let reset_timestamp = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse::<i64>().ok()?;

    let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;

    Some(RateLimitInfo { remaining, reset_at })
}
