//! Error types for reposync-gateway.

use std::time::Duration;

use thiserror::Error;

/// How the gateway treats a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network errors, timeouts, 5xx. Retried with backoff.
    Transient,
    /// The provider asked us to slow down. Retried after the reset instant.
    RateLimited,
    /// The request itself is wrong (403/404/422 and friends). Never retried.
    Permanent,
}

/// All errors surfaced by the gateway and the hosting client.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation}: transient failure{}: {message}", status_suffix(.status))]
    Transient {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("{operation}: rate limited: {message}")]
    RateLimited {
        operation: &'static str,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("{operation}: HTTP {status}: {message}")]
    Permanent {
        operation: &'static str,
        status: u16,
        message: String,
    },

    /// Retryable failures persisted past the attempt cap.
    #[error("{operation}: giving up after {attempts} attempts: {last}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        last: Box<GatewayError>,
    },

    /// The provider answered 2xx with a body we cannot interpret.
    #[error("{operation}: unexpected response: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl GatewayError {
    /// Class of the error. `Exhausted` reports the class of its last attempt.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transient { .. } => ErrorClass::Transient,
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::Permanent { .. } | Self::InvalidResponse { .. } => ErrorClass::Permanent,
            Self::Exhausted { last, .. } => last.class(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } => *status,
            Self::Permanent { status, .. } => Some(*status),
            Self::Exhausted { last, .. } => last.status(),
            Self::RateLimited { .. } | Self::InvalidResponse { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Permanent { status: 404, .. })
    }

    pub(crate) fn invalid(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_reports_class_of_last_attempt() {
        let err = GatewayError::Exhausted {
            operation: "list_tree",
            attempts: 3,
            last: Box::new(GatewayError::Transient {
                operation: "list_tree",
                status: Some(502),
                message: "bad gateway".into(),
            }),
        };
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(err.status(), Some(502));
        assert_eq!(
            err.to_string(),
            "list_tree: giving up after 3 attempts: list_tree: transient failure (HTTP 502): bad gateway"
        );
    }

    #[test]
    fn only_permanent_404_is_not_found() {
        let missing = GatewayError::Permanent {
            operation: "get_branch",
            status: 404,
            message: "Not Found".into(),
        };
        assert!(missing.is_not_found());
        let forbidden = GatewayError::Permanent {
            operation: "get_branch",
            status: 403,
            message: "Forbidden".into(),
        };
        assert!(!forbidden.is_not_found());
    }
}
