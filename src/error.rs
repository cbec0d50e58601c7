//! Error types surfaced by the gateway and the punctuality store.
//!
//! Every `Display` message is meant to be shown to an operator as-is.

use thiserror::Error;

/// A single request to the punctuality service failed.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request never produced a usable HTTP response.
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    ///
    /// `message` is the server-supplied message when the body carried one.
    #[error("{message}")]
    Status { code: i64, message: String },

    /// The response body could not be decoded for the requested resource.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

impl RequestError {
    pub fn status(code: i64, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }
}

/// Threshold configuration rejected before it was sent to the server.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must be a finite number of seconds")]
    NotFinite { field: &'static str },

    /// Ordering of the thresholds the classifier would use, defaults included.
    #[error(
        "thresholds must satisfy early ({early}s) <= on-time ({on_time}s) <= very-late ({very_late}s)"
    )]
    InvalidThresholds {
        early: f64,
        on_time: f64,
        very_late: f64,
    },
}

/// Failure of an orchestration that runs several fetches concurrently.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// All sub-operations ran to completion and at least one failed.
    #[error("failed to fetch: {}", .failed.join(", "))]
    Partial { failed: Vec<&'static str> },

    /// The first sub-operation to fail, reported as-is.
    #[error("{source}")]
    FailFast {
        operation: &'static str,
        #[source]
        source: RequestError,
    },
}

impl AggregateError {
    /// Names of the sub-operations that failed.
    pub fn failed_operations(&self) -> Vec<&'static str> {
        match self {
            AggregateError::Partial { failed } => failed.clone(),
            AggregateError::FailFast { operation, .. } => vec![*operation],
        }
    }
}

/// Failure of a threshold configuration update.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Invalid(#[from] ConfigError),

    #[error(transparent)]
    Request(#[from] RequestError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_displays_server_message() {
        let err = RequestError::status(500, "query failed: relation missing");
        assert_eq!(err.to_string(), "query failed: relation missing");
    }

    #[test]
    fn test_partial_error_joins_names() {
        let err = AggregateError::Partial {
            failed: vec!["overview", "route punctuality"],
        };
        assert_eq!(err.to_string(), "failed to fetch: overview, route punctuality");
        assert_eq!(err.failed_operations(), vec!["overview", "route punctuality"]);
    }

    #[test]
    fn test_fail_fast_error_keeps_first_message() {
        let err = AggregateError::FailFast {
            operation: "realtime delays",
            source: RequestError::status(503, "service unavailable"),
        };
        assert_eq!(err.to_string(), "service unavailable");
        assert_eq!(err.failed_operations(), vec!["realtime delays"]);
    }
}
