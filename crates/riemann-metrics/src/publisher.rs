// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connection state machine for the collector link.
//!
//! [`PublisherConnection`] owns the transport, the backoff state and the two
//! connection timers. All transitions go through [`PublisherConnection::on_signal`]
//! and the timer callbacks, which [`PublisherService::run`] dispatches from a
//! single loop. Callers reach the service through a cheap [`PublisherHandle`].

use crate::backoff::{Backoff, BackoffConfig};
use crate::event::Event;
use crate::transport::{SignalKind, SignalSender, Transport, TransportSignal};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout_at, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Dropped,
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub backoff: BackoffConfig,
    pub keepalive_interval: Duration,
    /// Event sent on every keepalive tick.
    pub keepalive_event: Event,
    /// Bound on the time shutdown spends delivering what is still queued.
    pub shutdown_grace: Duration,
}

pub struct PublisherConnection<T: Transport> {
    transport: T,
    state: ConnectionState,
    backoff: Backoff,
    generation: u64,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
    reconnect: Option<Pin<Box<Sleep>>>,
    keepalive: Option<Interval>,
    keepalive_interval: Duration,
    keepalive_event: Event,
    dropped: u64,
}

impl<T: Transport> PublisherConnection<T> {
    pub fn new(
        transport: T,
        config: PublisherConfig,
        signal_tx: mpsc::UnboundedSender<TransportSignal>,
    ) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            backoff: Backoff::new(config.backoff),
            generation: 0,
            signal_tx,
            reconnect: None,
            keepalive: None,
            keepalive_interval: config.keepalive_interval,
            keepalive_event: config.keepalive_event,
            dropped: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Instant at which the pending reconnect fires, if one is scheduled.
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect.as_ref().map(|sleep| sleep.deadline())
    }

    pub fn keepalive_active(&self) -> bool {
        self.keepalive.is_some()
    }

    /// Number of events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Tears down whatever handle is left and starts a new connect attempt.
    pub fn connect(&mut self) {
        self.reconnect = None;
        self.keepalive = None;
        self.transport.teardown();

        self.generation = self.generation.wrapping_add(1);
        self.state = ConnectionState::Connecting;
        debug!("Connecting to Riemann (attempt generation {})", self.generation);
        self.transport
            .connect(SignalSender::new(self.generation, self.signal_tx.clone()));
    }

    /// Applies one lifecycle signal from the transport.
    pub fn on_signal(&mut self, signal: TransportSignal) {
        if signal.generation != self.generation {
            trace!(
                "Ignoring signal from stale connection {} (current {})",
                signal.generation,
                self.generation
            );
            return;
        }

        match signal.kind {
            SignalKind::Connected => {
                if self.state != ConnectionState::Connecting {
                    debug!("Unexpected connect acknowledgement in state {:?}", self.state);
                    return;
                }
                info!("Connected to Riemann");
                self.state = ConnectionState::Connected;
                self.backoff.reset();
                self.reconnect = None;
                self.start_keepalive();
            }
            SignalKind::Disconnected => {
                warn!("Riemann connection closed");
                self.fail();
            }
            SignalKind::Error(e) => {
                error!("Riemann connection failed: {e}");
                self.fail();
            }
        }
    }

    /// Called when the reconnect timer fires.
    pub fn on_reconnect_due(&mut self) {
        self.reconnect = None;
        info!("Reconnecting to Riemann");
        self.connect();
    }

    /// Called on every keepalive tick.
    pub fn on_keepalive_due(&mut self) {
        let event = self.keepalive_event.clone();
        self.try_send(event);
    }

    /// Transmits `event` if connected, otherwise drops it.
    pub fn try_send(&mut self, event: Event) -> SendOutcome {
        self.try_send_batch(vec![event])
    }

    /// Transmits `events` as one message if connected, otherwise drops them.
    pub fn try_send_batch(&mut self, events: Vec<Event>) -> SendOutcome {
        if events.is_empty() {
            return SendOutcome::Sent;
        }
        if self.state != ConnectionState::Connected {
            self.dropped = self.dropped.saturating_add(events.len() as u64);
            info!(
                "Cannot send {} event(s). Riemann is not connected",
                events.len()
            );
            return SendOutcome::Dropped;
        }

        match self.transport.send(&events) {
            Ok(()) => SendOutcome::Sent,
            Err(e) => {
                self.dropped = self.dropped.saturating_add(events.len() as u64);
                error!("Error trying to send {} event(s) to Riemann: {e}", events.len());
                SendOutcome::Dropped
            }
        }
    }

    /// Releases both timers and stops accepting events. Returns the
    /// transport task still delivering queued messages, if any.
    pub fn close(&mut self) -> Option<JoinHandle<()>> {
        self.reconnect = None;
        self.keepalive = None;
        self.state = ConnectionState::Disconnected;
        debug!("Publisher connection closed");
        self.transport.close()
    }

    fn fail(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.keepalive = None;
        self.schedule_reconnect();
    }

    // At most one reconnect is ever pending; further failures reported for the
    // same connection neither stack timers nor grow the delay again.
    fn schedule_reconnect(&mut self) {
        if self.reconnect.is_some() {
            debug!("Reconnect already scheduled");
            return;
        }
        let delay = self.backoff.register_failure();
        info!("Reconnecting to Riemann in {}ms", delay.as_millis());
        self.reconnect = Some(Box::pin(sleep(delay)));
    }

    fn start_keepalive(&mut self) {
        let period = self.keepalive_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.keepalive = Some(ticker);
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn keepalive_due(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[derive(Debug)]
pub enum PublisherCommand {
    Publish(Vec<Event>),
}

/// Cloneable, non-blocking entry point to a running [`PublisherService`].
#[derive(Debug, Clone)]
pub struct PublisherHandle {
    tx: mpsc::UnboundedSender<PublisherCommand>,
}

impl PublisherHandle {
    pub fn try_send(&self, event: Event) {
        self.publish(vec![event]);
    }

    pub fn publish(&self, events: Vec<Event>) {
        if let Err(e) = self.tx.send(PublisherCommand::Publish(events)) {
            let PublisherCommand::Publish(events) = e.0;
            debug!("Publisher stopped, dropping {} event(s)", events.len());
        }
    }
}

enum Step {
    Command(Option<PublisherCommand>),
    Signal(TransportSignal),
    ReconnectDue,
    KeepaliveDue,
    Cancelled,
}

pub struct PublisherService<T: Transport> {
    connection: PublisherConnection<T>,
    signals: mpsc::UnboundedReceiver<TransportSignal>,
    rx: mpsc::UnboundedReceiver<PublisherCommand>,
    cancel: CancellationToken,
    shutdown_grace: Duration,
}

impl<T: Transport> PublisherService<T> {
    pub fn new(
        transport: T,
        config: PublisherConfig,
        cancel: CancellationToken,
    ) -> (Self, PublisherHandle) {
        let (signal_tx, signals) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown_grace = config.shutdown_grace;

        let service = Self {
            connection: PublisherConnection::new(transport, config, signal_tx),
            signals,
            rx,
            cancel,
            shutdown_grace,
        };

        (service, PublisherHandle { tx })
    }

    pub async fn run(mut self) {
        debug!("Publisher service started");
        self.connection.connect();

        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Cancelled,
                command = self.rx.recv() => Step::Command(command),
                Some(signal) = self.signals.recv() => Step::Signal(signal),
                _ = reconnect_due(&mut self.connection.reconnect) => Step::ReconnectDue,
                _ = keepalive_due(&mut self.connection.keepalive) => Step::KeepaliveDue,
            };

            match step {
                Step::Command(Some(PublisherCommand::Publish(events))) => {
                    self.connection.try_send_batch(events);
                }
                Step::Signal(signal) => self.connection.on_signal(signal),
                Step::ReconnectDue => self.connection.on_reconnect_due(),
                Step::KeepaliveDue => self.connection.on_keepalive_due(),
                Step::Command(None) | Step::Cancelled => break,
            }
        }

        self.finish().await;
        debug!(
            "Publisher service stopped ({} event(s) dropped)",
            self.connection.dropped()
        );
    }

    /// Lets a connect in flight land, publishes whatever is still queued and
    /// closes the connection, all within the shutdown grace period.
    async fn finish(&mut self) {
        let deadline = Instant::now() + self.shutdown_grace;
        while self.connection.state() == ConnectionState::Connecting {
            match timeout_at(deadline, self.signals.recv()).await {
                Ok(Some(signal)) => self.connection.on_signal(signal),
                Ok(None) | Err(_) => break,
            }
        }

        self.rx.close();
        while let Ok(PublisherCommand::Publish(events)) = self.rx.try_recv() {
            self.connection.try_send_batch(events);
        }

        if let Some(mut task) = self.connection.close() {
            match timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Riemann connection task failed: {e}"),
                Err(_) => {
                    warn!("Riemann connection did not drain before shutdown");
                    task.abort();
                }
            }
        }
    }
}
