// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::metric::MetricKind;

/// Errors raised while recording a sample into the buffer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InsertError {
    #[error("metric {key} is stored as {existing}, cannot record a {attempted} sample")]
    KindMismatch {
        key: String,
        existing: MetricKind,
        attempted: MetricKind,
    },
}

/// Errors raised while reducing a drained buffer entry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatsError {
    #[error("no samples to summarize for {0}")]
    EmptySamples(String),
}

/// Errors raised by the outbound transport. None of these leave the publisher.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection refused by {0}")]
    Refused(String),
    #[error("connecting to {0} timed out")]
    Timeout(String),
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("writing to {0} timed out")]
    WriteTimeout(String),
    #[error("outbound queue is full")]
    QueueFull,
    #[error("transport is not connected")]
    NotConnected,
}

/// Errors raised while loading or validating configuration.
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
        let error = InsertError::KindMismatch {
            key: "cpu".to_string(),
            existing: MetricKind::Gauge,
            attempted: MetricKind::Throughput,
        };
        assert_eq!(
            error.to_string(),
            "metric cpu is stored as gauge, cannot record a throughput sample"
        );

        let error = ConfigError::Invalid("port must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: port must be greater than 0"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let error: TransportError = io.into();
        assert!(matches!(error, TransportError::Io(_)));
    }
}
