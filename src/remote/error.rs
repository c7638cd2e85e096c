// src/remote/error.rs

//! Transport-level failures of the content API and the retry predicate built
//! on top of them.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Transport failure class, mirroring the usual socket error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// ECONNRESET / broken pipe / connection closed mid-request.
    ConnectionReset,
    /// ENOTFOUND / DNS failure / connection refused.
    HostNotFound,
    /// ETIMEDOUT / request timeout.
    TimedOut,
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkErrorKind::ConnectionReset => "connection reset",
            NetworkErrorKind::HostNotFound => "host not found",
            NetworkErrorKind::TimedOut => "timed out",
            NetworkErrorKind::Other => "network error",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Non-2xx HTTP response.
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// Parsed `retry-after` header.
        retry_after: Option<Duration>,
        /// Whether a 403/429 was identified as a rate limit (header or body).
        rate_limited: bool,
    },

    #[error("{kind}: {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    /// 2xx response whose body could not be understood.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Build a status error, sniffing the body message for secondary rate
    /// limits.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let rate_limited = status == 429 || message.to_lowercase().contains("rate limit");
        ApiError::Status {
            status,
            message,
            retry_after: None,
            rate_limited,
        }
    }

    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        ApiError::Network {
            kind,
            message: message.into(),
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        if let ApiError::Status { retry_after, .. } = &mut self {
            *retry_after = Some(delay);
        }
        self
    }

    pub fn with_rate_limited(mut self, value: bool) -> Self {
        if let ApiError::Status { rate_limited, .. } = &mut self {
            *rate_limited = *rate_limited || value;
        }
        self
    }

    /// HTTP status code, if the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Retry predicate for remote calls.
    ///
    /// Network failures, 5xx and 429 are transient. A 403 is only transient
    /// when it is a rate limit; a plain permission 403 is terminal, like every
    /// other 4xx. Decode failures are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network { .. } => true,
            ApiError::Status {
                status,
                rate_limited,
                ..
            } => match *status {
                s if s >= 500 => true,
                429 => true,
                403 => *rate_limited,
                s if (400..500).contains(&s) => false,
                _ => true,
            },
            ApiError::Decode(_) => false,
        }
    }
}

/// Free-function form of [`ApiError::is_retryable`], convenient as a
/// `retry_if` argument.
pub fn remote_retry_condition(err: &ApiError) -> bool {
    err.is_retryable()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        assert!(ApiError::status(500, "boom").is_retryable());
        assert!(ApiError::status(503, "unavailable").is_retryable());
        assert!(ApiError::status(429, "slow down").is_retryable());
        assert!(ApiError::network(NetworkErrorKind::ConnectionReset, "reset").is_retryable());
        assert!(ApiError::network(NetworkErrorKind::TimedOut, "timeout").is_retryable());
    }

    #[test]
    fn client_errors_are_terminal() {
        assert!(!ApiError::status(401, "Bad credentials").is_retryable());
        assert!(!ApiError::status(404, "Not Found").is_retryable());
        assert!(!ApiError::status(422, "sha wasn't supplied").is_retryable());
        assert!(!ApiError::Decode("garbage".into()).is_retryable());
    }

    #[test]
    fn forbidden_is_retryable_only_when_rate_limited() {
        assert!(!ApiError::status(403, "Resource not accessible by integration").is_retryable());
        assert!(
            ApiError::status(403, "You have exceeded a secondary rate limit").is_retryable()
        );
        assert!(ApiError::status(403, "Forbidden").with_rate_limited(true).is_retryable());
    }
}
