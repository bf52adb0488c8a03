//! Shared HTTP client construction policy.
//!
//! Every network-bound component (structured API, page fetcher, search engine,
//! model client) builds its client here so timeouts and compression stay
//! consistent.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use super::FetchError;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Timeouts applied to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl HttpSettings {
    /// Settings with the given overall request timeout.
    ///
    /// The connect timeout never exceeds the request timeout.
    #[must_use]
    pub fn with_request_timeout(request_timeout: Duration) -> Self {
        let connect_timeout = Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS).min(request_timeout);
        Self {
            connect_timeout,
            request_timeout,
        }
    }
}

/// Builds an HTTP client for `component` using the shared policy.
///
/// `component` is only used for logging and error messages.
///
/// # Errors
///
/// Returns [`FetchError::ClientBuild`] when construction fails.
pub fn build_http_client(
    component: &str,
    user_agent: &str,
    settings: &HttpSettings,
) -> Result<Client, FetchError> {
    match try_build_client(user_agent, settings, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // System proxy lookup can panic in sandboxed environments; retry
            // with env proxies only.
            warn!(
                component,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            try_build_client(user_agent, settings, true).map_err(|failure| match failure {
                BuildClientFailure::Panic => FetchError::ClientBuild {
                    reason: format!("{component}: client construction panicked"),
                },
                BuildClientFailure::Build(error) => FetchError::ClientBuild {
                    reason: format!("{component}: {error}"),
                },
            })
        }
        Err(BuildClientFailure::Build(error)) => Err(FetchError::ClientBuild {
            reason: format!("{component}: {error}"),
        }),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    user_agent: &str,
    settings: &HttpSettings,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind(AssertUnwindSafe(|| {
        let mut builder = base_builder(user_agent, settings);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(user_agent: &str, settings: &HttpSettings) -> ClientBuilder {
    Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .user_agent(user_agent)
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    for (scheme, names) in [
        ("https", ["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        ("http", ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
    ] {
        let Some(proxy) = names.iter().find_map(|name| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        }) else {
            continue;
        };
        let resolved = if scheme == "https" {
            Proxy::https(&proxy)
        } else {
            Proxy::http(&proxy)
        };
        if let Ok(resolved) = resolved {
            builder = builder.proxy(resolved);
        }
    }
    builder
}
