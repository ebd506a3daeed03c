//! DurableStream - append-only log with consumer groups
//!
//! Used for:
//! - Publishing categorisation progress and final results
//! - Publishing predictive validation verdicts
//! - Competing downstream consumers with explicit acknowledgment

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::StoreError;
use crate::codec::EncodedFields;

/// Log-assigned record identity, totally ordered within a stream.
///
/// Formats as `<millis>-<seq>`, the same shape Redis uses for stream ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamRecordId {
    pub millis: u64,
    pub seq: u64,
}

impl StreamRecordId {
    pub const ZERO: StreamRecordId = StreamRecordId { millis: 0, seq: 0 };

    pub fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// Smallest id strictly greater than `self` given the current clock.
    pub fn next_after(&self, now_millis: u64) -> Self {
        if now_millis > self.millis {
            Self::new(now_millis, 0)
        } else {
            Self::new(self.millis, self.seq + 1)
        }
    }
}

impl fmt::Display for StreamRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for StreamRecordId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidId(s.to_string());
        let (millis, seq) = match s.split_once('-') {
            Some((millis, seq)) => (millis, seq),
            None => (s, "0"),
        };
        Ok(Self {
            millis: millis.parse().map_err(|_| invalid())?,
            seq: seq.parse().map_err(|_| invalid())?,
        })
    }
}

/// One record of a stream. Field values are scalar-only.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub id: StreamRecordId,
    pub stream: String,
    pub fields: EncodedFields,
}

/// Where a new consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Replay every retained record.
    Beginning,
    /// Only records appended after the group is created.
    Tail,
    /// Records strictly after the given id.
    After(StreamRecordId),
}

impl StartPosition {
    /// Redis `XGROUP CREATE` id argument.
    pub fn as_redis_id(&self) -> String {
        match self {
            Self::Beginning => "0".to_string(),
            Self::Tail => "$".to_string(),
            Self::After(id) => id.to_string(),
        }
    }
}

/// A record delivered to a consumer group but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: StreamRecordId,
    pub consumer: String,
    pub delivery_count: u64,
    /// Time since the last delivery.
    pub idle: Duration,
}

/// DurableStream trait - async interface for the record log
///
/// Delivery is at-least-once per consumer group. Redelivery only happens
/// through `reclaim_pending`; nothing is redelivered on a timer.
#[async_trait]
pub trait DurableStream: Send + Sync {
    /// Append a record, creating the stream on first use. `max_len` trims the
    /// oldest records approximately.
    async fn append(
        &self,
        stream: &str,
        fields: EncodedFields,
        max_len: Option<usize>,
    ) -> Result<StreamRecordId, StoreError>;

    /// Create a consumer group. Creating an existing group succeeds.
    async fn create_consumer_group(
        &self,
        stream: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<(), StoreError>;

    /// Read records never delivered to any consumer of `group`, marking them
    /// pending for `consumer`. Waits up to `block` for new records.
    async fn read_as_consumer(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamRecord>, StoreError>;

    /// Remove a record from the group's pending set. Returns whether anything
    /// was pending under that id; unknown ids are not an error.
    async fn ack(&self, stream: &str, group: &str, id: StreamRecordId)
        -> Result<bool, StoreError>;

    /// Transfer up to `count` entries idle for at least `min_idle` to
    /// `consumer` and return their records.
    async fn reclaim_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamRecord>, StoreError>;

    /// Pending entries of a group, oldest first.
    async fn pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StoreError>;

    /// Retained records oldest first, optionally limited to `count`.
    async fn range(&self, stream: &str, count: Option<usize>)
        -> Result<Vec<StreamRecord>, StoreError>;

    /// Number of retained records.
    async fn len(&self, stream: &str) -> Result<usize, StoreError>;
}

#[async_trait]
impl DurableStream for Arc<dyn DurableStream> {
    async fn append(
        &self,
        stream: &str,
        fields: EncodedFields,
        max_len: Option<usize>,
    ) -> Result<StreamRecordId, StoreError> {
        (**self).append(stream, fields, max_len).await
    }

    async fn create_consumer_group(
        &self,
        stream: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<(), StoreError> {
        (**self).create_consumer_group(stream, group, start).await
    }

    async fn read_as_consumer(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        (**self)
            .read_as_consumer(stream, group, consumer, count, block)
            .await
    }

    async fn ack(
        &self,
        stream: &str,
        group: &str,
        id: StreamRecordId,
    ) -> Result<bool, StoreError> {
        (**self).ack(stream, group, id).await
    }

    async fn reclaim_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        (**self)
            .reclaim_pending(stream, group, consumer, min_idle, count)
            .await
    }

    async fn pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StoreError> {
        (**self).pending(stream, group, count).await
    }

    async fn range(
        &self,
        stream: &str,
        count: Option<usize>,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        (**self).range(stream, count).await
    }

    async fn len(&self, stream: &str) -> Result<usize, StoreError> {
        (**self).len(stream).await
    }
}
