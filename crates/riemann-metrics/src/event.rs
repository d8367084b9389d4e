// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Outbound events and their Riemann protobuf encoding.

use crate::constants::{KEEPALIVE_DESCRIPTION, KEEPALIVE_SERVICE, KEEPALIVE_TAG, MAX_FRAME_SIZE};
use crate::errors::TransportError;
use prost::Message;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single summary value bound for the collector.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub service: String,
    pub metric: f64,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

impl Event {
    pub fn new(service: impl Into<String>, metric: f64, tags: Vec<String>) -> Self {
        Self {
            service: service.into(),
            metric,
            tags,
            description: None,
        }
    }

    /// The heartbeat sent while connected.
    pub fn keepalive(namespace: &str, tag: &str) -> Self {
        Self {
            service: format!("{namespace}_{KEEPALIVE_SERVICE}"),
            metric: 0.0,
            tags: vec![tag.to_string(), KEEPALIVE_TAG.to_string()],
            description: Some(KEEPALIVE_DESCRIPTION.to_string()),
        }
    }

    pub fn is_keepalive(&self) -> bool {
        self.tags.iter().any(|t| t == KEEPALIVE_TAG)
    }

    fn to_proto(&self, time: i64) -> proto::Event {
        proto::Event {
            time: Some(time),
            service: Some(self.service.clone()),
            description: self.description.clone(),
            tags: self.tags.clone(),
            metric_d: Some(self.metric),
            ..Default::default()
        }
    }
}

/// Riemann message models. Field numbers follow the collector's `proto.proto`.
pub mod proto {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Event {
        #[prost(int64, optional, tag = "1")]
        pub time: Option<i64>,
        #[prost(string, optional, tag = "2")]
        pub state: Option<String>,
        #[prost(string, optional, tag = "3")]
        pub service: Option<String>,
        #[prost(string, optional, tag = "4")]
        pub host: Option<String>,
        #[prost(string, optional, tag = "5")]
        pub description: Option<String>,
        #[prost(string, repeated, tag = "7")]
        pub tags: Vec<String>,
        #[prost(float, optional, tag = "8")]
        pub ttl: Option<f32>,
        #[prost(double, optional, tag = "14")]
        pub metric_d: Option<f64>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Msg {
        #[prost(bool, optional, tag = "2")]
        pub ok: Option<bool>,
        #[prost(string, optional, tag = "3")]
        pub error: Option<String>,
        #[prost(message, repeated, tag = "6")]
        pub events: Vec<Event>,
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Encodes events as one length-prefixed `Msg` frame.
pub fn encode_frame(events: &[Event]) -> Result<Vec<u8>, TransportError> {
    let now = unix_now();
    let msg = proto::Msg {
        events: events.iter().map(|e| e.to_proto(now)).collect(),
        ..Default::default()
    };

    let len = msg.encoded_len();
    let prefix = u32::try_from(len).map_err(|_| {
        TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("message of {len} bytes does not fit a frame"),
        ))
    })?;

    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&prefix.to_be_bytes());
    msg.encode(&mut frame)?;
    Ok(frame)
}

/// Decodes the body of a frame (without its length prefix).
pub fn decode_msg(body: &[u8]) -> Result<proto::Msg, prost::DecodeError> {
    proto::Msg::decode(body)
}

/// Validates a frame length read off the wire.
pub fn frame_len(prefix: [u8; 4]) -> Result<usize, TransportError> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        )));
    }
    Ok(len)
}
