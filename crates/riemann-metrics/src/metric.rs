// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sample kinds, status buckets and metric key derivation.

use derive_more::Display;
use std::str::FromStr;

/// How a sample is aggregated between flushes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Request latency; summarized as a distribution.
    #[display("duration")]
    Duration,
    /// HTTP status observation; counted per status bucket.
    #[display("status")]
    Status,
    /// One per request; counted.
    #[display("throughput")]
    Throughput,
    /// Point-in-time reading such as CPU load; summarized as a distribution.
    #[display("gauge")]
    Gauge,
}

impl MetricKind {
    /// Counter kinds keep a running integer instead of the raw samples.
    pub fn is_counter(self) -> bool {
        matches!(self, MetricKind::Status | MetricKind::Throughput)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized metric kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for MetricKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duration" => Ok(MetricKind::Duration),
            "status" => Ok(MetricKind::Status),
            "throughput" | "throughput-count" | "tpt" => Ok(MetricKind::Throughput),
            "gauge" => Ok(MetricKind::Gauge),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// HTTP status class used to count responses instead of aggregating codes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusBucket {
    #[display("2xx")]
    Success,
    #[display("3xx")]
    Redirect,
    #[display("4xx")]
    ClientError,
    #[display("5xx")]
    ServerError,
}

/// Classifies a status code. Codes that are not positive count as server
/// errors, as does anything from 500 upwards.
pub fn status_bucket(code: i64) -> StatusBucket {
    match code {
        c if c <= 0 || c >= 500 => StatusBucket::ServerError,
        400..=499 => StatusBucket::ClientError,
        300..=399 => StatusBucket::Redirect,
        _ => StatusBucket::Success,
    }
}

/// Key under which a status observation is counted, e.g. `route_http_status_4xx`.
pub fn status_key(key: &str, code: i64) -> String {
    format!("{}_{}", key, status_bucket(code))
}

/// Turns a route path into a metric key: `/v1/account/` becomes `v1_account`.
/// Names without a separator pass through untouched.
pub fn canonical_key(route: &str) -> String {
    if route.contains('/') {
        route.trim_matches('/').replace('/', "_")
    } else {
        route.to_string()
    }
}

/// A typed observation from the instrumentation source.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// Process CPU usage ratio.
    Cpu { process: f64 },
    /// Average event loop latency for the last sampling period.
    EventLoop { latency_avg: f64 },
    /// A completed HTTP request. `url` is either a route path or a name that
    /// was already mapped by the caller.
    Http {
        url: String,
        duration: f64,
        status_code: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bucket_boundaries() {
        assert_eq!(status_bucket(-1), StatusBucket::ServerError);
        assert_eq!(status_bucket(0), StatusBucket::ServerError);
        assert_eq!(status_bucket(1), StatusBucket::Success);
        assert_eq!(status_bucket(199), StatusBucket::Success);
        assert_eq!(status_bucket(200), StatusBucket::Success);
        assert_eq!(status_bucket(299), StatusBucket::Success);
        assert_eq!(status_bucket(300), StatusBucket::Redirect);
        assert_eq!(status_bucket(399), StatusBucket::Redirect);
        assert_eq!(status_bucket(400), StatusBucket::ClientError);
        assert_eq!(status_bucket(499), StatusBucket::ClientError);
        assert_eq!(status_bucket(500), StatusBucket::ServerError);
        assert_eq!(status_bucket(600), StatusBucket::ServerError);
    }

    #[test]
    fn test_status_key() {
        assert_eq!(status_key("foo_http_status", 404), "foo_http_status_4xx");
        assert_eq!(status_key("foo_http_status", 201), "foo_http_status_2xx");
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!(canonical_key("/v1/account/summary/"), "v1_account_summary");
        assert_eq!(canonical_key("v1/account"), "v1_account");
        assert_eq!(canonical_key("/states"), "states");
        assert_eq!(canonical_key("get_states"), "get_states");
        assert_eq!(canonical_key(""), "");
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("duration".parse::<MetricKind>(), Ok(MetricKind::Duration));
        assert_eq!("gauge".parse::<MetricKind>(), Ok(MetricKind::Gauge));
        assert_eq!(
            "throughput-count".parse::<MetricKind>(),
            Ok(MetricKind::Throughput)
        );
        assert!("histogram".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_counter_kinds() {
        assert!(MetricKind::Status.is_counter());
        assert!(MetricKind::Throughput.is_counter());
        assert!(!MetricKind::Duration.is_counter());
        assert!(!MetricKind::Gauge.is_counter());
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn status_bucket_is_total(code in any::<i64>()) {
                let bucket = status_bucket(code);
                let expected = if code <= 0 || code >= 500 {
                    StatusBucket::ServerError
                } else if code >= 400 {
                    StatusBucket::ClientError
                } else if code >= 300 {
                    StatusBucket::Redirect
                } else {
                    StatusBucket::Success
                };
                prop_assert_eq!(bucket, expected);
            }
        }
    }
}
