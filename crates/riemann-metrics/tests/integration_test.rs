// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests against a mock Riemann collector on a local socket.

use prost::Message;
use riemann_metrics::config::PipelineConfig;
use riemann_metrics::event::{decode_msg, frame_len, proto};
use riemann_metrics::metric::{MetricKind, Sample};
use riemann_metrics::pipeline::Pipeline;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Mock collector that forwards every received event and acknowledges every
/// message.
struct MockRiemann {
    port: u16,
    events: mpsc::UnboundedReceiver<proto::Event>,
    cancel: CancellationToken,
}

impl MockRiemann {
    async fn start(port: u16) -> Self {
        let listener = TcpListener::bind(format!("127.0.0.1:{port}"))
            .await
            .expect("Failed to bind mock collector");
        let port = listener.local_addr().unwrap().port();
        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let accept_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_cancel.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((socket, _)) = accepted else { break };
                        tokio::spawn(Self::serve(socket, tx.clone(), accept_cancel.clone()));
                    }
                }
            }
        });

        MockRiemann {
            port,
            events,
            cancel,
        }
    }

    async fn serve(
        mut socket: TcpStream,
        tx: mpsc::UnboundedSender<proto::Event>,
        cancel: CancellationToken,
    ) {
        loop {
            let mut prefix = [0u8; 4];
            tokio::select! {
                _ = cancel.cancelled() => return,
                read = socket.read_exact(&mut prefix) => {
                    if read.is_err() {
                        return;
                    }
                }
            }

            let mut body = vec![0u8; frame_len(prefix).unwrap()];
            if socket.read_exact(&mut body).await.is_err() {
                return;
            }
            let msg = decode_msg(&body).expect("client sent an undecodable message");
            for event in msg.events {
                let _ = tx.send(event);
            }

            let reply = proto::Msg {
                ok: Some(true),
                ..Default::default()
            }
            .encode_to_vec();
            let mut frame = (reply.len() as u32).to_be_bytes().to_vec();
            frame.extend_from_slice(&reply);
            if socket.write_all(&frame).await.is_err() {
                return;
            }
        }
    }

    /// Waits for the first event whose service matches.
    async fn expect_service(&mut self, service: &str) -> proto::Event {
        timeout(Duration::from_secs(10), async {
            loop {
                let event = self.events.recv().await.expect("collector stopped");
                if event.service.as_deref() == Some(service) {
                    return event;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {service} event received"))
    }

    /// Stops accepting and closes every open connection.
    fn stop(self) -> u16 {
        self.cancel.cancel();
        self.port
    }
}

fn config(port: u16) -> PipelineConfig {
    PipelineConfig {
        host: "127.0.0.1".to_string(),
        port,
        namespace: "mercury".to_string(),
        tag: "payments".to_string(),
        flush_interval: Duration::from_millis(100),
        initial_reconnect_delay: Duration::from_millis(50),
        reconnect_delay_ceiling: Duration::from_millis(200),
        keepalive_interval: Duration::from_millis(150),
        connect_timeout: Duration::from_secs(1),
        write_timeout: Duration::from_secs(1),
        log_level: "error".to_string(),
    }
}

/// Keeps feeding samples so every flush has something to publish.
fn feed(pipeline: &Pipeline, cancel: CancellationToken) {
    let aggregator = pipeline.aggregator().clone();
    tokio::spawn(async move {
        while !cancel.is_cancelled() {
            aggregator.observe(Sample::Http {
                url: "/api/charge".to_string(),
                duration: 12.0,
                status_code: 200,
            });
            aggregator.observe(Sample::Cpu { process: 0.25 });
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });
}

#[tokio::test]
async fn test_flush_reaches_collector() {
    let mut collector = MockRiemann::start(0).await;
    let pipeline = Pipeline::start(&config(collector.port));
    let feeding = CancellationToken::new();
    feed(&pipeline, feeding.clone());

    let median = collector
        .expect_service("mercury_api_charge_http_duration_median")
        .await;
    assert_eq!(median.metric_d, Some(12.0));
    assert_eq!(median.tags, vec!["payments".to_string()]);
    assert!(median.time.is_some());

    let count = collector
        .expect_service("mercury_api_charge_http_status_2xx_count")
        .await;
    assert!(count.metric_d.unwrap() >= 1.0);

    let cpu = collector.expect_service("mercury_cpu_p99").await;
    assert_eq!(cpu.metric_d, Some(0.25));

    feeding.cancel();
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_keepalive_reaches_collector() {
    let mut collector = MockRiemann::start(0).await;
    let pipeline = Pipeline::start(&config(collector.port));

    let keepalive = collector.expect_service("mercury_keepalive").await;
    assert_eq!(
        keepalive.tags,
        vec!["payments".to_string(), "keepalive".to_string()]
    );
    assert_eq!(keepalive.description.as_deref(), Some("keepAlive"));

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_collector_restart() {
    let mut collector = MockRiemann::start(0).await;
    let pipeline = Pipeline::start(&config(collector.port));
    let feeding = CancellationToken::new();
    feed(&pipeline, feeding.clone());

    collector.expect_service("mercury_cpu_median").await;

    let port = collector.stop();
    // Let the pipeline notice and fail a few reconnects.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let mut collector = MockRiemann::start(port).await;
    let cpu = collector.expect_service("mercury_cpu_median").await;
    assert_eq!(cpu.metric_d, Some(0.25));

    feeding.cancel();
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_while_collector_unreachable() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let pipeline = Pipeline::start(&config(port));
    pipeline.aggregator().record(MetricKind::Gauge, "cpu", 0.5);
    tokio::time::sleep(Duration::from_millis(300)).await;

    timeout(Duration::from_secs(5), pipeline.shutdown())
        .await
        .expect("shutdown hung");
}

#[tokio::test]
async fn test_shutdown_publishes_buffered_samples() {
    let mut collector = MockRiemann::start(0).await;
    let pipeline = Pipeline::start(&PipelineConfig {
        flush_interval: Duration::from_secs(600),
        ..config(collector.port)
    });
    pipeline.aggregator().record(MetricKind::Gauge, "queue_depth", 7.0);

    timeout(Duration::from_secs(5), pipeline.shutdown())
        .await
        .expect("shutdown hung");

    let median = collector.expect_service("mercury_queue_depth_median").await;
    assert_eq!(median.metric_d, Some(7.0));
}
