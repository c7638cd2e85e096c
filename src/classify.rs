// src/classify.rs

//! Failure classification for human-readable reports.
//!
//! This is reporting only: control flow never branches on a
//! [`Classification`]. Retry decisions live in [`crate::remote::ApiError`].

use std::fmt;
use std::io;

use crate::errors::SyncError;
use crate::remote::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RemoteApi,
    Network,
    Filesystem,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::RemoteApi => "remote_api",
            ErrorKind::Network => "network",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub recoverable: bool,
    pub user_message: String,
    pub technical_message: String,
    pub suggestions: Vec<String>,
}

impl Classification {
    fn new(kind: ErrorKind, severity: Severity, recoverable: bool, user_message: &str) -> Self {
        Self {
            kind,
            severity,
            recoverable,
            user_message: user_message.to_string(),
            technical_message: String::new(),
            suggestions: Vec::new(),
        }
    }

    fn suggest(mut self, suggestions: &[&str]) -> Self {
        self.suggestions = suggestions.iter().map(|s| s.to_string()).collect();
        self
    }

    fn technical(mut self, message: impl fmt::Display) -> Self {
        self.technical_message = message.to_string();
        self
    }

    /// Multi-line report for logs.
    pub fn report(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "kind: {}", self.kind)?;
        writeln!(f, "severity: {}", self.severity)?;
        writeln!(f, "message: {}", self.user_message)?;
        if !self.suggestions.is_empty() {
            writeln!(f, "suggestions:")?;
            for (i, s) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, s)?;
            }
        }
        write!(f, "detail: {}", self.technical_message)
    }
}

/// Classify any crate error.
pub fn classify(err: &SyncError) -> Classification {
    match err {
        SyncError::RemoteAuth(api) | SyncError::RemoteTransient(api) | SyncError::RemoteRejected(api) => {
            classify_api(api)
        }
        SyncError::LocalFileMissing(_) | SyncError::PathUnavailable(_) => {
            classify_io_kind(io::ErrorKind::NotFound).technical(err)
        }
        SyncError::Io(io_err) => classify_io_kind(io_err.kind()).technical(err),
        _ => Classification::new(ErrorKind::Unknown, Severity::Medium, true, "unexpected error")
            .technical(err),
    }
}

/// Classify a transport-level failure.
pub fn classify_api(err: &ApiError) -> Classification {
    let base = match err {
        ApiError::Status { status, .. } => classify_status(*status),
        ApiError::Network { .. } => {
            Classification::new(ErrorKind::Network, Severity::Medium, true, "network connection error")
                .suggest(&["check network connectivity", "retry later"])
        }
        ApiError::Decode(_) => Classification::new(
            ErrorKind::RemoteApi,
            Severity::Medium,
            true,
            "unexpected response from the remote API",
        ),
    };
    base.technical(err)
}

fn classify_status(status: u16) -> Classification {
    let c = |sev, rec, msg| Classification::new(ErrorKind::RemoteApi, sev, rec, msg);
    match status {
        401 => c(Severity::High, false, "remote authentication failed")
            .suggest(&["check that the access token is correct", "check whether the token has expired"]),
        403 => c(Severity::High, true, "remote access denied").suggest(&[
            "check the token's permissions",
            "check repository access",
            "check whether a rate limit was hit",
        ]),
        404 => c(Severity::Medium, true, "remote resource not found")
            .suggest(&["check the repository name", "check that the branch exists"]),
        429 => c(Severity::Low, true, "remote API rate limit")
            .suggest(&["retry later", "reduce request frequency"]),
        422 => c(Severity::Medium, false, "remote rejected the request data")
            .suggest(&["check the file contents", "check the commit message"]),
        s if s >= 500 => c(Severity::Medium, true, "remote server error")
            .suggest(&["retry later", "check the remote service status"]),
        _ => Classification::new(ErrorKind::RemoteApi, Severity::Medium, true, "remote API error"),
    }
}

fn classify_io_kind(kind: io::ErrorKind) -> Classification {
    let c = |sev, rec, msg| Classification::new(ErrorKind::Filesystem, sev, rec, msg);
    match kind {
        io::ErrorKind::NotFound => {
            c(Severity::High, false, "file or directory not found").suggest(&["check the file path"])
        }
        io::ErrorKind::PermissionDenied => c(Severity::High, false, "insufficient file permissions")
            .suggest(&["check file permissions", "run with a user that can read the file"]),
        io::ErrorKind::ResourceBusy => c(Severity::Low, true, "file is in use")
            .suggest(&["retry later", "close programs holding the file"]),
        _ => c(Severity::Medium, true, "filesystem error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::NetworkErrorKind;
    use std::path::PathBuf;

    fn api(status: u16) -> Classification {
        classify(&SyncError::from(ApiError::status(status, "x")))
    }

    #[test]
    fn status_codes_map_to_severity_and_recoverability() {
        let table = [
            (401, Severity::High, false),
            (403, Severity::High, true),
            (404, Severity::Medium, true),
            (429, Severity::Low, true),
            (422, Severity::Medium, false),
            (502, Severity::Medium, true),
        ];
        for (status, severity, recoverable) in table {
            let c = api(status);
            assert_eq!(c.kind, ErrorKind::RemoteApi, "status {status}");
            assert_eq!(c.severity, severity, "status {status}");
            assert_eq!(c.recoverable, recoverable, "status {status}");
        }
    }

    #[test]
    fn network_errors_are_medium_and_recoverable() {
        let err = SyncError::from(ApiError::network(NetworkErrorKind::TimedOut, "deadline"));
        let c = classify(&err);
        assert_eq!(c.kind, ErrorKind::Network);
        assert_eq!(c.severity, Severity::Medium);
        assert!(c.recoverable);
    }

    #[test]
    fn filesystem_errors_follow_os_error_kind() {
        let missing = classify(&SyncError::LocalFileMissing(PathBuf::from("/w/a.txt")));
        assert_eq!(missing.kind, ErrorKind::Filesystem);
        assert_eq!(missing.severity, Severity::High);
        assert!(!missing.recoverable);

        let denied = classify(&SyncError::Io(io::Error::from(io::ErrorKind::PermissionDenied)));
        assert_eq!(denied.severity, Severity::High);
        assert!(!denied.recoverable);

        let busy = classify(&SyncError::Io(io::Error::from(io::ErrorKind::ResourceBusy)));
        assert_eq!(busy.severity, Severity::Low);
        assert!(busy.recoverable);
    }

    #[test]
    fn anything_else_is_unknown() {
        let c = classify(&SyncError::Config("bad".into()));
        assert_eq!(c.kind, ErrorKind::Unknown);
        assert_eq!(c.severity, Severity::Medium);
        assert!(c.recoverable);
    }

    #[test]
    fn report_lists_every_field() {
        let report = api(401).report();
        assert!(report.contains("kind: remote_api"));
        assert!(report.contains("severity: high"));
        assert!(report.contains("1. check that the access token is correct"));
        assert!(report.contains("detail: HTTP 401: x"));
    }
}
