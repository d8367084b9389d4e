// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Configuration parameters for reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt after a failure.
    pub initial: Duration,
    /// Upper bound for any delay.
    pub ceiling: Duration,
}

/// Tracks the delay before the next reconnect attempt.
///
/// The first failure waits `initial`; every further consecutive failure
/// doubles the wait up to `ceiling`. A successful connect starts over.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    next_delay: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            next_delay: config.initial.min(config.ceiling),
            config,
        }
    }

    /// Registers a failure and returns the delay to wait before retrying.
    pub fn register_failure(&mut self) -> Duration {
        let delay = self.next_delay;
        self.next_delay = delay.saturating_mul(2).min(self.config.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.next_delay = self.config.initial.min(self.config.ceiling);
    }

    /// Delay the next failure would produce.
    pub fn peek(&self) -> Duration {
        self.next_delay
    }
}
