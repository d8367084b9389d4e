// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reduction of a drained buffer entry into summary statistics.
//!
//! Percentiles use linear interpolation between the two closest ranks, with
//! rank `p * (n - 1)` over the sorted samples. The median is the 50th
//! percentile under the same definition, so even-sized batches average the
//! two middle values.

use crate::buffer::Entry;
use crate::constants::{COUNT_SUFFIX, DISTRIBUTION_SUFFIXES};
use crate::errors::StatsError;
use crate::metric::MetricKind;

const DISTRIBUTION_QUANTILES: [f64; 4] = [0.5, 0.95, 0.99, 0.995];

/// One computed value. An empty suffix means the value is reported under the
/// bare metric key.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistic {
    pub suffix: &'static str,
    pub value: f64,
}

/// Percentile over already sorted samples. `sorted` must not be empty.
fn interpolate(sorted: &[f64], quantile: f64) -> f64 {
    let last = sorted.len() - 1;
    let rank = quantile.clamp(0.0, 1.0) * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// `median`, `p95`, `p99` and `p995` for a non-empty batch.
pub fn summarize(key: &str, samples: &[f64]) -> Result<Vec<Statistic>, StatsError> {
    if samples.is_empty() {
        return Err(StatsError::EmptySamples(key.to_string()));
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    Ok(DISTRIBUTION_SUFFIXES
        .into_iter()
        .zip(DISTRIBUTION_QUANTILES)
        .map(|(suffix, quantile)| Statistic {
            suffix,
            value: interpolate(&sorted, quantile),
        })
        .collect())
}

/// Statistics for one drained entry, picked by the entry's kind.
pub fn compute(key: &str, entry: &Entry) -> Result<Vec<Statistic>, StatsError> {
    match entry {
        Entry::Samples { values, .. } => summarize(key, values),
        Entry::Counter { kind, count } => {
            let suffix = match kind {
                MetricKind::Status => COUNT_SUFFIX,
                _ => "",
            };
            Ok(vec![Statistic {
                suffix,
                value: *count as f64,
            }])
        }
    }
}
