// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the metrics subsystem.
//!
//! Build defects ([`MetricError`]) are kept apart from environmental failures
//! ([`ExportError`], [`SamplingError`]) so call sites can log them differently.

use reqwest::StatusCode;

/// A metric could not be added to a batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("metric value {value:?} is not numeric")]
    UnparseableValue { value: String },

    #[error("metric {name} has non-finite value {value}")]
    NonFiniteValue { name: String, value: f64 },

    #[error("metric name must not be empty")]
    EmptyName,
}

/// Shipping a batch to the collector failed.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("failed to serialize payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("collector request timed out")]
    Timeout,

    #[error("collector transport error: {0}")]
    Transport(reqwest::Error),

    #[error("{status}: collector rejected batch: {body}")]
    Status { status: StatusCode, body: String },
}

impl From<reqwest::Error> for ExportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExportError::Timeout
        } else {
            ExportError::Transport(err)
        }
    }
}

/// Host resource statistics were unavailable.
#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: &'static str,
        source: std::io::Error,
    },

    #[error("malformed {path}: {reason}")]
    Malformed { path: &'static str, reason: String },

    #[error("host resource sampling is not supported on this platform")]
    Unsupported,
}

/// Invalid metrics configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = MetricError::UnparseableValue {
            value: "abc".to_string(),
        };
        assert_eq!(error.to_string(), "metric value \"abc\" is not numeric");

        let error = ConfigError::Invalid("interval must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: interval must be greater than 0"
        );
    }

    #[test]
    fn test_status_error_display() {
        let error = ExportError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: "bad key".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "401 Unauthorized: collector rejected batch: bad key"
        );
    }

    #[test]
    fn test_sampling_error_display() {
        let error = SamplingError::Malformed {
            path: "/proc/loadavg",
            reason: "empty".to_string(),
        };
        assert_eq!(error.to_string(), "malformed /proc/loadavg: empty");
    }
}
