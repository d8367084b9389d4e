// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_NAMESPACE: &str = "app";
pub const DEFAULT_TAG: &str = "app";

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_RECONNECT_DELAY_CEILING: Duration = Duration::from_millis(10_000);
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// How long shutdown waits for a pending connect and for queued frames.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Frames queued for the socket writer before sends start failing.
pub const FRAME_QUEUE_CAPACITY: usize = 64;

/// Reserved tag marking heartbeat events.
pub const KEEPALIVE_TAG: &str = "keepalive";
pub const KEEPALIVE_DESCRIPTION: &str = "keepAlive";
pub const KEEPALIVE_SERVICE: &str = "keepalive";

// Riemann frames are prefixed with a 4 byte big-endian length. Responses from
// the collector are tiny; anything above this is treated as a corrupt stream.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Statistic suffixes emitted for distribution metrics, in emission order.
pub const DISTRIBUTION_SUFFIXES: [&str; 4] = ["median", "p95", "p99", "p995"];
pub const COUNT_SUFFIX: &str = "count";
