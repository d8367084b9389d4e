// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wiring of the buffer, the publisher service and the flush loop.

use crate::aggregator::Aggregator;
use crate::buffer::MetricBuffer;
use crate::config::PipelineConfig;
use crate::constants::DEFAULT_SHUTDOWN_GRACE;
use crate::event::Event;
use crate::flusher::{Flusher, FlusherConfig};
use crate::publisher::{PublisherConfig, PublisherService};
use crate::transport::{TcpTransport, Transport};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A running pipeline. Dropping it without [`Pipeline::shutdown`] leaves the
/// background tasks running until the runtime stops.
pub struct Pipeline {
    aggregator: Aggregator,
    flusher: Flusher,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Starts a pipeline publishing to the configured collector over TCP.
    /// Must be called from within a tokio runtime.
    pub fn start(config: &PipelineConfig) -> Self {
        let transport = TcpTransport::new(
            &config.host,
            config.port,
            config.connect_timeout,
            config.write_timeout,
        );
        info!("Publishing metrics to Riemann at {}", transport.addr());
        Self::start_with_transport(config, transport)
    }

    pub fn start_with_transport<T: Transport>(config: &PipelineConfig, transport: T) -> Self {
        let cancel = CancellationToken::new();
        let buffer = Arc::new(MetricBuffer::new());

        let (service, publisher) = PublisherService::new(
            transport,
            PublisherConfig {
                backoff: config.backoff(),
                keepalive_interval: config.keepalive_interval,
                keepalive_event: Event::keepalive(&config.namespace, &config.tag),
                shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            },
            cancel.clone(),
        );

        let flusher = Flusher::new(FlusherConfig {
            buffer: Arc::clone(&buffer),
            sink: Arc::new(publisher),
            namespace: config.namespace.clone(),
            tags: vec![config.tag.clone()],
        });

        let tasks = vec![
            tokio::spawn(service.run()),
            tokio::spawn(flusher.clone().run(config.flush_interval, cancel.clone())),
        ];
        debug!(
            "Metric pipeline started, flushing every {}ms",
            config.flush_interval.as_millis()
        );

        Pipeline {
            aggregator: Aggregator::new(buffer),
            flusher,
            cancel,
            tasks,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Runs one flush right away instead of waiting for the next tick.
    pub fn flush_now(&self) -> usize {
        self.flusher.flush()
    }

    /// Publishes what is still buffered, then stops the flush loop and the
    /// publisher. The publisher gets a short grace period to deliver the last
    /// batch before the connection is closed.
    pub async fn shutdown(self) {
        let published = self.flush_now();
        debug!("Final flush queued {published} event(s)");
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Pipeline task failed during shutdown: {e}");
            }
        }
        debug!("Metric pipeline stopped");
    }
}
