// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::buffer::MetricBuffer;
use crate::metric::{canonical_key, status_key, MetricKind, Sample};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Entry point for the instrumentation source.
///
/// Every call returns immediately; a sample that cannot be recorded is logged
/// and dropped so that instrumentation never observes a failure.
#[derive(Debug, Clone)]
pub struct Aggregator {
    buffer: Arc<MetricBuffer>,
}

impl Aggregator {
    pub fn new(buffer: Arc<MetricBuffer>) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> &Arc<MetricBuffer> {
        &self.buffer
    }

    /// Records one raw value. Status values are turned into an observation of
    /// their bucket under `<key>_<bucket>`.
    pub fn record(&self, kind: MetricKind, key: &str, value: f64) {
        if !value.is_finite() {
            debug!("Ignoring non-finite sample for {key}: {value}");
            return;
        }

        let result = match kind {
            MetricKind::Status => {
                self.buffer
                    .record(kind, &status_key(key, value as i64), value)
            }
            _ => self.buffer.record(kind, key, value),
        };

        if let Err(e) = result {
            warn!("Failed to record sample: {e}");
        }
    }

    /// Records a value whose kind arrives as text. Unknown kinds are ignored.
    pub fn record_tagged(&self, kind: &str, key: &str, value: f64) {
        match kind.parse::<MetricKind>() {
            Ok(kind) => self.record(kind, key, value),
            Err(e) => trace!("Skipping sample for {key}: {e}"),
        }
    }

    /// Records a typed instrumentation sample under its derived keys.
    pub fn observe(&self, sample: Sample) {
        match sample {
            Sample::Cpu { process } => self.record(MetricKind::Gauge, "cpu", process),
            Sample::EventLoop { latency_avg } => {
                self.record(MetricKind::Gauge, "eventloop", latency_avg)
            }
            Sample::Http {
                url,
                duration,
                status_code,
            } => {
                let route = canonical_key(&url);
                self.record(
                    MetricKind::Duration,
                    &format!("{route}_http_duration"),
                    duration,
                );
                self.record(
                    MetricKind::Status,
                    &format!("{route}_http_status"),
                    status_code as f64,
                );
                self.record(MetricKind::Throughput, &format!("{route}_http_tpt"), 1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Entry;
    use tracing_test::traced_test;

    fn aggregator() -> Aggregator {
        Aggregator::new(Arc::new(MetricBuffer::new()))
    }

    #[test]
    fn test_http_sample_fans_out() {
        let aggregator = aggregator();
        aggregator.observe(Sample::Http {
            url: "/v1/withdrawal/".to_string(),
            duration: 12.5,
            status_code: 201,
        });
        aggregator.observe(Sample::Http {
            url: "/v1/withdrawal/".to_string(),
            duration: 7.5,
            status_code: 503,
        });

        let buffer = aggregator.buffer();
        assert_eq!(
            buffer.peek("v1_withdrawal_http_duration"),
            Some(Entry::Samples {
                kind: MetricKind::Duration,
                values: vec![12.5, 7.5],
            })
        );
        assert_eq!(
            buffer.peek("v1_withdrawal_http_status_2xx"),
            Some(Entry::Counter {
                kind: MetricKind::Status,
                count: 1,
            })
        );
        assert_eq!(
            buffer.peek("v1_withdrawal_http_status_5xx"),
            Some(Entry::Counter {
                kind: MetricKind::Status,
                count: 1,
            })
        );
        assert_eq!(
            buffer.peek("v1_withdrawal_http_tpt"),
            Some(Entry::Counter {
                kind: MetricKind::Throughput,
                count: 2,
            })
        );
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_process_samples() {
        let aggregator = aggregator();
        aggregator.observe(Sample::Cpu { process: 0.3 });
        aggregator.observe(Sample::EventLoop { latency_avg: 1.5 });

        assert_eq!(
            aggregator.buffer().peek("cpu"),
            Some(Entry::Samples {
                kind: MetricKind::Gauge,
                values: vec![0.3],
            })
        );
        assert_eq!(
            aggregator.buffer().peek("eventloop"),
            Some(Entry::Samples {
                kind: MetricKind::Gauge,
                values: vec![1.5],
            })
        );
    }

    #[test]
    fn test_unknown_kind_is_ignored() {
        let aggregator = aggregator();
        aggregator.record_tagged("histogram", "cpu", 1.0);
        assert!(aggregator.buffer().is_empty());

        aggregator.record_tagged("status", "foo_http_status", 404.0);
        assert!(aggregator.buffer().peek("foo_http_status_4xx").is_some());
    }

    #[test]
    fn test_non_finite_is_ignored() {
        let aggregator = aggregator();
        aggregator.record(MetricKind::Gauge, "cpu", f64::NAN);
        aggregator.record(MetricKind::Duration, "route", f64::INFINITY);
        assert!(aggregator.buffer().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_kind_mismatch_is_logged_not_raised() {
        let aggregator = aggregator();
        aggregator.record(MetricKind::Gauge, "cpu", 0.5);
        aggregator.record(MetricKind::Throughput, "cpu", 1.0);

        assert!(logs_contain("Failed to record sample"));
        assert_eq!(aggregator.buffer().len(), 1);
    }
}
