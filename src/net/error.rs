//! Error types for network fetches made by probes.

use thiserror::Error;

/// Errors from a single HTTP fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection-level failure (DNS, refused connection, reset, TLS).
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete within the configured timeout.
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Non-success HTTP status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// The response was not declared as JSON.
    #[error("expected JSON from {url} but got content-type '{content_type}'")]
    InvalidContentType {
        url: String,
        content_type: String,
        /// Raw body kept for the diagnostics side-channel.
        body: String,
    },

    /// The response claimed to be JSON but did not decode into the expected shape.
    #[error("invalid JSON from {url}: {reason}")]
    InvalidJson {
        url: String,
        reason: String,
        /// Raw body kept for the diagnostics side-channel.
        body: String,
    },

    /// The URL could not be built or parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// The HTTP client could not be constructed.
    #[error("HTTP client construction failed: {reason}\n  Suggestion: Check proxy and TLS settings")]
    ClientBuild { reason: String },
}

impl FetchError {
    /// Maps a reqwest error, separating timeouts from other network failures.
    #[must_use]
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an HTTP status error.
    #[must_use]
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Raw response body for format failures, if any.
    #[must_use]
    pub fn diagnostic_body(&self) -> Option<&str> {
        match self {
            Self::InvalidContentType { body, .. } | Self::InvalidJson { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_body_only_for_format_failures() {
        let err = FetchError::InvalidContentType {
            url: "https://example.com".to_string(),
            content_type: "text/html".to_string(),
            body: "<html>maintenance</html>".to_string(),
        };
        assert_eq!(err.diagnostic_body(), Some("<html>maintenance</html>"));
        assert!(FetchError::timeout("https://example.com").diagnostic_body().is_none());
    }

    #[test]
    fn test_http_status_message() {
        let msg = FetchError::http_status("https://example.com/api", 503).to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("example.com/api"));
    }
}
