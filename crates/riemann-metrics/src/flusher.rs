// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::buffer::{Drained, MetricBuffer};
use crate::event::Event;
use crate::publisher::PublisherHandle;
use crate::stats;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Destination for the events built on each flush.
pub trait EventSink: Send + Sync + 'static {
    fn publish(&self, events: Vec<Event>);
}

impl EventSink for PublisherHandle {
    fn publish(&self, events: Vec<Event>) {
        PublisherHandle::publish(self, events);
    }
}

pub struct FlusherConfig {
    pub buffer: Arc<MetricBuffer>,
    pub sink: Arc<dyn EventSink>,
    /// Prefix of every service name.
    pub namespace: String,
    /// Tags attached to every event.
    pub tags: Vec<String>,
}

#[derive(Clone)]
pub struct Flusher {
    buffer: Arc<MetricBuffer>,
    sink: Arc<dyn EventSink>,
    namespace: String,
    tags: Vec<String>,
}

impl Flusher {
    pub fn new(config: FlusherConfig) -> Self {
        Flusher {
            buffer: config.buffer,
            sink: config.sink,
            namespace: config.namespace,
            tags: config.tags,
        }
    }

    fn service_name(&self, key: &str, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("{}_{key}", self.namespace)
        } else {
            format!("{}_{key}_{suffix}", self.namespace)
        }
    }

    /// Turns drained entries into events. A key whose statistics cannot be
    /// computed is logged and skipped; the others still go out.
    pub fn build_events(&self, drained: &Drained) -> Vec<Event> {
        let mut events = Vec::with_capacity(drained.len() * 4);
        for (key, entry) in drained {
            match stats::compute(key, entry) {
                Ok(statistics) => {
                    events.extend(statistics.into_iter().map(|statistic| {
                        Event::new(
                            self.service_name(key, statistic.suffix),
                            statistic.value,
                            self.tags.clone(),
                        )
                    }));
                }
                Err(e) => error!("Skipping metric {key}: {e}"),
            }
        }
        events
    }

    /// Drains the buffer and hands the resulting events to the sink. Returns
    /// the number of events published.
    pub fn flush(&self) -> usize {
        let drained = self.buffer.swap_and_clear();
        if drained.is_empty() {
            debug!("Nothing to flush");
            return 0;
        }

        let events = self.build_events(&drained);
        let n_events = events.len();
        debug!("Flushing {n_events} events for {} metrics", drained.len());
        if n_events > 0 {
            self.sink.publish(events);
        }
        n_events
    }

    /// Flushes every `period` until `cancel` fires. A flush that panics loses
    /// its batch but does not stop the loop.
    pub async fn run(self, period: Duration, cancel: CancellationToken) {
        let mut flush_interval = interval(period);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        flush_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = flush_interval.tick() => {
                    let flusher = self.clone();
                    if let Err(err) = tokio::spawn(async move { flusher.flush() }).await {
                        error!("Failed to flush metrics: {err}");
                    }
                }
            }
        }
        debug!("Flush loop stopped");
    }
}
