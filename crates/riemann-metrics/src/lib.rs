// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Riemann Metrics
//!
//! Buffers numeric telemetry produced by an instrumented process, reduces it
//! to summary statistics on a fixed interval and ships the result to a Riemann
//! collector over a connection that heals itself after failures.
//!
//! ## Architecture
//!
//! - [`aggregator`]: facade classifying instrumentation samples
//! - [`buffer`]: the shared sample registry with an atomic swap
//! - [`stats`]: percentile and counter reduction of drained entries
//! - [`flusher`]: the periodic drain-and-publish loop
//! - [`publisher`]: the connection state machine with backoff and keepalive
//! - [`transport`]: the Riemann TCP transport the publisher drives
//! - [`pipeline`]: wiring of all of the above behind one handle, configured
//!   through [`config::PipelineConfig`]
//!
//! Publishing is a best-effort side channel: every failure is logged and
//! converted into a dropped event or a skipped batch, never an error returned
//! to the instrumented workload.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod backoff;
pub mod buffer;
pub mod config;
pub mod constants;
pub mod errors;
pub mod event;
pub mod flusher;
pub mod metric;
pub mod pipeline;
pub mod publisher;
pub mod stats;
pub mod transport;
pub mod util;
