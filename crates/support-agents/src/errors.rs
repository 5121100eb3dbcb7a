//! Pipeline error taxonomy with retry classification.
//!
//! Every failure a ticket run can hit is represented here. Callers query
//! `retry_category()` / `is_retriable()` instead of matching on message text.
//!
//! | Category   | Retriable | Raised by                                   |
//! |------------|-----------|---------------------------------------------|
//! | Transient  | yes       | network errors, 5xx, timeouts               |
//! | RateLimit  | yes       | HTTP 429                                    |
//! | ParseFailure | no      | model text without a usable JSON object     |
//! | Fatal      | no        | auth failures, bad config, internal errors  |

use std::fmt;

use thiserror::Error;

/// Classification used to decide whether a port call may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Network failure, timeout or 5xx from a backing service.
    Transient,
    /// Provider asked us to slow down.
    RateLimit,
    /// Model output could not be parsed. Re-asking is not part of the pipeline.
    ParseFailure,
    /// Nothing to gain from trying again.
    Fatal,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimit)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Which external collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Generation,
    Retrieval,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Retrieval => write!(f, "retrieval"),
        }
    }
}

/// Why a backing service did not answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailability {
    /// Connection refused, reset, DNS, 5xx.
    Network,
    /// HTTP 429.
    RateLimited,
    /// HTTP 401/403 or a rejected key.
    Unauthorized,
    /// The per-call deadline elapsed.
    Timeout,
    /// Any other non-success answer (4xx, malformed envelope).
    Rejected,
}

/// Unified error type for the ticket pipeline and its ports.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A generation response held no parseable JSON object.
    #[error("Malformed model output: {reason}")]
    MalformedOutput { reason: String, raw: String },

    /// The generation or retrieval service failed to respond usefully.
    #[error("{service} service unavailable ({kind:?}): {message}")]
    ServiceUnavailable {
        service: Service,
        kind: Unavailability,
        message: String,
    },

    /// Configuration is invalid or missing required fields.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Any other error that doesn't fit the above categories.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedOutput {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    pub fn unavailable(service: Service, kind: Unavailability, message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service,
            kind,
            message: message.into(),
        }
    }

    /// Map an HTTP status from a backing service onto the taxonomy.
    pub fn from_status(service: Service, status: reqwest::StatusCode, body: &str) -> Self {
        let kind = if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Unavailability::RateLimited
        } else if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            Unavailability::Unauthorized
        } else if status.is_server_error() {
            Unavailability::Network
        } else {
            Unavailability::Rejected
        };
        Self::unavailable(service, kind, format!("HTTP {status}: {body}"))
    }

    /// Map a transport-level reqwest failure.
    pub fn from_transport(service: Service, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            Unavailability::Timeout
        } else if let Some(status) = err.status() {
            return Self::from_status(service, status, &err.to_string());
        } else if err.is_decode() {
            Unavailability::Rejected
        } else {
            Unavailability::Network
        };
        Self::unavailable(service, kind, err.to_string())
    }

    /// Classify this error for retry logic.
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::MalformedOutput { .. } => RetryCategory::ParseFailure,
            Self::ServiceUnavailable { kind, .. } => match kind {
                Unavailability::Network | Unavailability::Timeout => RetryCategory::Transient,
                Unavailability::RateLimited => RetryCategory::RateLimit,
                Unavailability::Unauthorized | Unavailability::Rejected => RetryCategory::Fatal,
            },
            Self::Configuration(_) | Self::Internal(_) => RetryCategory::Fatal,
        }
    }

    /// Returns `true` if a port call may be attempted again after this error.
    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    /// Raw model text attached to a parse failure, for manual triage.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::MalformedOutput { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub fn is_malformed_output(&self) -> bool {
        matches!(self, Self::MalformedOutput { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_transient() {
        let err = PipelineError::unavailable(Service::Retrieval, Unavailability::Timeout, "30s");
        assert!(err.is_retriable());
        assert_eq!(err.retry_category(), RetryCategory::Transient);
    }

    #[test]
    fn malformed_output_keeps_raw_text() {
        let err = PipelineError::malformed("no JSON object found", "Sure! Here you go.");
        assert!(!err.is_retriable());
        assert_eq!(err.raw_output(), Some("Sure! Here you go."));
        assert!(err.is_malformed_output());
    }

    #[test]
    fn status_mapping() {
        let rate = PipelineError::from_status(
            Service::Generation,
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "slow down",
        );
        assert_eq!(rate.retry_category(), RetryCategory::RateLimit);

        let auth =
            PipelineError::from_status(Service::Retrieval, reqwest::StatusCode::UNAUTHORIZED, "");
        assert_eq!(auth.retry_category(), RetryCategory::Fatal);

        let bad_gateway =
            PipelineError::from_status(Service::Retrieval, reqwest::StatusCode::BAD_GATEWAY, "");
        assert!(bad_gateway.is_retriable());
    }

    #[test]
    fn configuration_is_fatal() {
        let err = PipelineError::Configuration("missing key".into());
        assert!(!err.is_retriable());
        assert!(err.raw_output().is_none());
    }

    #[test]
    fn display_names_the_service() {
        let err = PipelineError::unavailable(Service::Generation, Unavailability::Network, "reset");
        let message = err.to_string();
        assert!(message.starts_with("generation service unavailable"));
    }
}
