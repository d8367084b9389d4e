// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The outbound connection the publisher drives.
//!
//! A transport never reports lifecycle changes through return values. It
//! starts work in [`Transport::connect`] and later emits [`TransportSignal`]s
//! on the channel it was handed. Every signal carries the generation of the
//! connect call that produced it, so the publisher can discard signals from a
//! connection it already tore down.

use crate::constants::FRAME_QUEUE_CAPACITY;
use crate::errors::TransportError;
use crate::event::{decode_msg, encode_frame, frame_len, Event};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[derive(Debug)]
pub enum SignalKind {
    Connected,
    Disconnected,
    Error(TransportError),
}

#[derive(Debug)]
pub struct TransportSignal {
    pub generation: u64,
    pub kind: SignalKind,
}

/// Emits signals for one connect attempt.
#[derive(Debug, Clone)]
pub struct SignalSender {
    generation: u64,
    tx: mpsc::UnboundedSender<TransportSignal>,
}

impl SignalSender {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TransportSignal>) -> Self {
        Self { generation, tx }
    }

    pub fn connected(&self) {
        self.emit(SignalKind::Connected);
    }

    pub fn disconnected(&self) {
        self.emit(SignalKind::Disconnected);
    }

    pub fn error(&self, error: TransportError) {
        self.emit(SignalKind::Error(error));
    }

    fn emit(&self, kind: SignalKind) {
        let signal = TransportSignal {
            generation: self.generation,
            kind,
        };
        // The publisher owns the receiver; once it is gone nobody cares.
        if self.tx.send(signal).is_err() {
            trace!("Publisher gone, discarding transport signal");
        }
    }
}

pub trait Transport: Send + 'static {
    /// Starts connecting. The outcome arrives later through `signals`.
    fn connect(&mut self, signals: SignalSender);

    /// Queues `events` as one message on the live connection. Must not block.
    fn send(&mut self, events: &[Event]) -> Result<(), TransportError>;

    /// Drops the live or pending connection without emitting any signal.
    fn teardown(&mut self);

    /// Stops accepting sends and lets already queued messages go out. The
    /// returned task, if any, completes once the connection is closed.
    fn close(&mut self) -> Option<JoinHandle<()>> {
        self.teardown();
        None
    }
}

struct Link {
    frames: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Riemann over TCP: length-prefixed protobuf messages, one response per
/// message.
///
/// At most [`FRAME_QUEUE_CAPACITY`] frames wait for the socket; a send beyond
/// that fails with [`TransportError::QueueFull`]. A write that makes no
/// progress within `write_timeout` fails the connection.
pub struct TcpTransport {
    addr: String,
    connect_timeout: Duration,
    write_timeout: Duration,
    link: Option<Link>,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16, connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            connect_timeout,
            write_timeout,
            link: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, signals: SignalSender) {
        self.teardown();

        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_connection(
            self.addr.clone(),
            self.connect_timeout,
            self.write_timeout,
            frames_rx,
            signals,
            cancel.clone(),
        ));

        self.link = Some(Link {
            frames: frames_tx,
            cancel,
            task,
        });
    }

    fn send(&mut self, events: &[Event]) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        let frame = encode_frame(events)?;
        link.frames.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::NotConnected,
        })
    }

    fn teardown(&mut self) {
        if let Some(link) = self.link.take() {
            link.cancel.cancel();
        }
    }

    fn close(&mut self) -> Option<JoinHandle<()>> {
        // Dropping the sender lets the writer drain what is queued, then stop.
        let Link { frames, task, .. } = self.link.take()?;
        drop(frames);
        Some(task)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn open(addr: &str, connect_timeout: Duration) -> Result<TcpStream, TransportError> {
    match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            Err(TransportError::Refused(addr.to_string()))
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(TransportError::Timeout(addr.to_string())),
    }
}

/// Reads collector responses until the peer closes the stream.
async fn read_responses(mut reader: OwnedReadHalf) -> Result<(), TransportError> {
    loop {
        let mut prefix = [0u8; 4];
        match reader.read_exact(&mut prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let mut body = vec![0u8; frame_len(prefix)?];
        reader.read_exact(&mut body).await?;

        match decode_msg(&body) {
            Ok(msg) if msg.ok == Some(false) => {
                warn!(
                    "Riemann rejected message: {}",
                    msg.error.as_deref().unwrap_or("no reason given")
                );
            }
            Ok(_) => trace!("Riemann acknowledged message"),
            Err(e) => warn!("Failed to decode Riemann response: {e}"),
        }
    }
}

async fn run_connection(
    addr: String,
    connect_timeout: Duration,
    write_timeout: Duration,
    mut frames: mpsc::Receiver<Vec<u8>>,
    signals: SignalSender,
    cancel: CancellationToken,
) {
    let stream = tokio::select! {
        _ = cancel.cancelled() => return,
        result = open(&addr, connect_timeout) => match result {
            Ok(stream) => stream,
            Err(e) => {
                signals.error(e);
                return;
            }
        },
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle on {addr}: {e}");
    }
    signals.connected();

    let (reader, mut writer) = stream.into_split();
    let responses = read_responses(reader);
    tokio::pin!(responses);

    // None: torn down or closed locally, the publisher already knows.
    let outcome: Option<Result<(), TransportError>> = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,
            frame = frames.recv() => match frame {
                Some(frame) => match timeout(write_timeout, writer.write_all(&frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break Some(Err(e.into())),
                    Err(_) => break Some(Err(TransportError::WriteTimeout(addr.clone()))),
                },
                None => {
                    if let Err(e) = writer.shutdown().await {
                        debug!("Failed to close write side to {addr}: {e}");
                    }
                    // Unread acknowledgements would reset the stream on drop,
                    // so wait for the collector to hang up first.
                    if timeout(write_timeout, &mut responses).await.is_err() {
                        debug!("Riemann at {addr} did not close in time");
                    }
                    break None;
                }
            },
            result = &mut responses => break Some(result),
        }
    };

    match outcome {
        Some(Ok(())) => {
            debug!("Riemann at {addr} closed the connection");
            signals.disconnected();
        }
        Some(Err(e)) => signals.error(e),
        None => debug!("Connection to {addr} closed locally"),
    }
}
