//! Event types shared by the Event Hubs producer and consumer.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AzureError;

/// An event to publish.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingEvent {
    pub body: Vec<u8>,
    /// Application properties attached to the event.
    pub properties: BTreeMap<String, String>,
}

impl OutgoingEvent {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn text(body: &str) -> Self {
        Self::new(body.as_bytes())
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, AzureError> {
        let body =
            serde_json::to_vec(value).map_err(|e| AzureError::InvalidPayload(e.to_string()))?;
        Ok(Self::new(body))
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Where a send is routed.
///
/// With neither field set the service picks the partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendTarget {
    /// Send directly to this partition.
    pub partition_id: Option<String>,
    /// Hash this key to pick the partition.
    pub partition_key: Option<String>,
}

impl SendTarget {
    pub fn partition(id: impl Into<String>) -> Self {
        Self {
            partition_id: Some(id.into()),
            partition_key: None,
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self {
            partition_id: None,
            partition_key: Some(key.into()),
        }
    }

    /// Reject targets naming both a partition and a partition key.
    pub fn validate(&self) -> Result<(), AzureError> {
        if self.partition_id.is_some() && self.partition_key.is_some() {
            return Err(AzureError::InvalidPayload(
                "partition_id and partition_key are mutually exclusive".to_owned(),
            ));
        }
        Ok(())
    }
}

/// How a single event is sent for a given [`SendTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendRoute {
    /// Plain send, optionally pinned to a partition.
    Direct { partition_id: Option<String> },
    /// One-event batch; single sends cannot carry a partition key.
    KeyedBatch,
}

impl SendTarget {
    pub fn route(&self) -> Result<SendRoute, AzureError> {
        self.validate()?;
        if self.partition_key.is_some() {
            Ok(SendRoute::KeyedBatch)
        } else {
            Ok(SendRoute::Direct {
                partition_id: self.partition_id.clone(),
            })
        }
    }
}

/// Outcome of a batched send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub events: usize,
    /// Number of SDK batches the events were split into.
    pub batches: usize,
}

/// Where a new receiver starts reading a partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartFrom {
    Earliest,
    /// Only events enqueued after the receiver opens.
    #[default]
    Latest,
    /// Events from this sequence number on, inclusive.
    SequenceNumber(i64),
}

impl FromStr for StartFrom {
    type Err = AzureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "earliest" => Ok(Self::Earliest),
            "latest" => Ok(Self::Latest),
            other => other.parse::<i64>().map(Self::SequenceNumber).map_err(|_| {
                AzureError::Configuration(format!(
                    "invalid start position '{s}' (expected 'earliest', 'latest', or a sequence number)"
                ))
            }),
        }
    }
}

impl fmt::Display for StartFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Earliest => f.write_str("earliest"),
            Self::Latest => f.write_str("latest"),
            Self::SequenceNumber(n) => write!(f, "{n}"),
        }
    }
}

/// Options for receiving from an event hub.
#[derive(Debug, Clone, Default)]
pub struct ReceiveOptions {
    /// Partitions to read. `None` reads every partition of the hub.
    pub partitions: Option<Vec<String>>,
    pub start: StartFrom,
}

/// An event read from a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedEvent {
    pub partition_id: String,
    pub sequence_number: Option<i64>,
    pub body: Vec<u8>,
    /// Application properties set by the sender.
    pub properties: BTreeMap<String, String>,
}

impl ReceivedEvent {
    /// The body as UTF-8, with invalid sequences replaced.
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Await `fut`, failing with [`AzureError::Timeout`] once `timeout` elapses.
///
/// A zero timeout means no timeout.
pub async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T, AzureError>
where
    F: Future<Output = Result<T, AzureError>>,
{
    match timeout.filter(|limit| !limit.is_zero()) {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| AzureError::Timeout(limit))?,
        None => fut.await,
    }
}

/// Forward events from one partition's stream into `sink`.
///
/// Stops when `cancel` fires, the stream ends, or the sink is dropped.
/// Returns the number of events forwarded; a stream error ends the pump
/// with that error.
pub async fn pump_partition<S>(
    partition_id: &str,
    stream: S,
    sink: &mpsc::Sender<ReceivedEvent>,
    cancel: &CancellationToken,
) -> Result<u64, AzureError>
where
    S: Stream<Item = Result<ReceivedEvent, AzureError>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut count = 0;
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                debug!(partition_id, "receive cancelled");
                break;
            }
            next = stream.next() => next,
        };
        let Some(event) = next else {
            debug!(partition_id, "partition stream ended");
            break;
        };
        let event = event?;
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(partition_id, "receive cancelled while the sink was full");
                break;
            }
            sent = sink.send(event) => {
                if sent.is_err() {
                    debug!(partition_id, "event sink closed");
                    break;
                }
            }
        }
        count += 1;
    }
    Ok(count)
}
