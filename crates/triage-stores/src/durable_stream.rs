//! DurableStream implementations
//!
//! - InMemoryDurableStream: process-local log for development and tests
//! - RedisDurableStream: Redis streams (XADD, XREADGROUP, XACK, XPENDING, XCLAIM)

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::streams::{
    StreamClaimReply, StreamId, StreamMaxlen, StreamPendingCountReply, StreamRangeReply,
    StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use triage_core::codec::{EncodedFields, FieldValue};
use triage_core::store::{
    DurableStream, PendingEntry, StartPosition, StoreError, StreamRecord, StreamRecordId,
};

/// Upper bound of pending entries inspected by one Redis reclaim.
const RECLAIM_SCAN_LIMIT: usize = 1_000;

fn no_group(stream: &str, group: &str) -> StoreError {
    StoreError::NoGroup {
        stream: stream.to_string(),
        group: group.to_string(),
    }
}

fn empty_record() -> StoreError {
    StoreError::Serialization("stream records need at least one field".to_string())
}

fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

struct PendingState {
    consumer: String,
    delivery_count: u64,
    delivered_at: Instant,
}

#[derive(Default)]
struct GroupState {
    last_delivered: StreamRecordId,
    pending: BTreeMap<StreamRecordId, PendingState>,
}

#[derive(Default)]
struct StreamState {
    records: VecDeque<StreamRecord>,
    last_id: StreamRecordId,
    groups: HashMap<String, GroupState>,
}

impl StreamState {
    /// Evict the oldest records once the overflow reaches a tenth of `max_len`.
    fn trim(&mut self, max_len: usize) -> usize {
        let batch = (max_len / 10).max(1);
        if self.records.len() < max_len.saturating_add(batch) {
            return 0;
        }
        let evict = self.records.len() - max_len;
        self.records.drain(..evict);
        evict
    }
}

/// In-memory implementation for development and testing
pub struct InMemoryDurableStream {
    streams: Mutex<HashMap<String, StreamState>>,
    appended: Notify,
}

impl InMemoryDurableStream {
    /// Create a new in-memory stream store
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            appended: Notify::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StreamState>>, StoreError> {
        self.streams
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    fn deliver_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        let mut streams = self.lock()?;
        let StreamState {
            records, groups, ..
        } = streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;
        let group_state = groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;

        let now = Instant::now();
        let batch: Vec<StreamRecord> = records
            .iter()
            .filter(|r| r.id > group_state.last_delivered)
            .take(count)
            .cloned()
            .collect();

        for record in &batch {
            group_state.pending.insert(
                record.id,
                PendingState {
                    consumer: consumer.to_string(),
                    delivery_count: 1,
                    delivered_at: now,
                },
            );
        }
        if let Some(last) = batch.last() {
            group_state.last_delivered = last.id;
        }
        Ok(batch)
    }
}

impl Default for InMemoryDurableStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStream for InMemoryDurableStream {
    async fn append(
        &self,
        stream: &str,
        fields: EncodedFields,
        max_len: Option<usize>,
    ) -> Result<StreamRecordId, StoreError> {
        if fields.is_empty() {
            return Err(empty_record());
        }

        let id = {
            let mut streams = self.lock()?;
            let state = streams.entry(stream.to_string()).or_default();
            let id = state.last_id.next_after(now_millis());
            state.last_id = id;
            state.records.push_back(StreamRecord {
                id,
                stream: stream.to_string(),
                fields,
            });
            if let Some(max_len) = max_len {
                let evicted = state.trim(max_len);
                if evicted > 0 {
                    debug!(stream = %stream, evicted, "trimmed stream");
                }
            }
            id
        };

        self.appended.notify_waiters();
        Ok(id)
    }

    async fn create_consumer_group(
        &self,
        stream: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<(), StoreError> {
        let mut streams = self.lock()?;
        let state = streams.entry(stream.to_string()).or_default();
        let tail = state.last_id;
        state
            .groups
            .entry(group.to_string())
            .or_insert_with(|| GroupState {
                last_delivered: match start {
                    StartPosition::Beginning => StreamRecordId::ZERO,
                    StartPosition::Tail => tail,
                    StartPosition::After(id) => id,
                },
                pending: BTreeMap::new(),
            });
        Ok(())
    }

    async fn read_as_consumer(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        let deadline = block
            .filter(|d| !d.is_zero())
            .map(|d| Instant::now() + d);

        loop {
            // Register before checking so an append in between is not missed.
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.deliver_new(stream, group, consumer, count)?;
            if !batch.is_empty() || count == 0 {
                return Ok(batch);
            }
            let Some(deadline) = deadline else {
                return Ok(batch);
            };
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(
        &self,
        stream: &str,
        group: &str,
        id: StreamRecordId,
    ) -> Result<bool, StoreError> {
        let mut streams = self.lock()?;
        let group_state = streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .ok_or_else(|| no_group(stream, group))?;
        Ok(group_state.pending.remove(&id).is_some())
    }

    async fn reclaim_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        let mut streams = self.lock()?;
        let StreamState {
            records, groups, ..
        } = streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;
        let group_state = groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let now = Instant::now();
        let idle: Vec<StreamRecordId> = group_state
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.delivered_at) >= min_idle)
            .map(|(id, _)| *id)
            .collect();

        let mut claimed = Vec::new();
        for id in idle {
            if claimed.len() >= count {
                break;
            }
            match records.binary_search_by_key(&id, |r| r.id) {
                Ok(pos) => {
                    if let Some(entry) = group_state.pending.get_mut(&id) {
                        entry.consumer = consumer.to_string();
                        entry.delivery_count += 1;
                        entry.delivered_at = now;
                    }
                    claimed.push(records[pos].clone());
                }
                Err(_) => {
                    // record was trimmed away while pending
                    group_state.pending.remove(&id);
                    debug!(stream = %stream, group = %group, id = %id, "dropped pending entry of trimmed record");
                }
            }
        }
        Ok(claimed)
    }

    async fn pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StoreError> {
        let streams = self.lock()?;
        let group_state = streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .ok_or_else(|| no_group(stream, group))?;
        let now = Instant::now();
        Ok(group_state
            .pending
            .iter()
            .take(count)
            .map(|(id, p)| PendingEntry {
                id: *id,
                consumer: p.consumer.clone(),
                delivery_count: p.delivery_count,
                idle: now.duration_since(p.delivered_at),
            })
            .collect())
    }

    async fn range(
        &self,
        stream: &str,
        count: Option<usize>,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        let streams = self.lock()?;
        Ok(streams
            .get(stream)
            .map(|s| {
                s.records
                    .iter()
                    .take(count.unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn len(&self, stream: &str) -> Result<usize, StoreError> {
        let streams = self.lock()?;
        Ok(streams.get(stream).map(|s| s.records.len()).unwrap_or(0))
    }
}

/// Redis streams implementation.
pub struct RedisDurableStream {
    client: redis::Client,
}

impl RedisDurableStream {
    /// Create a new Redis stream store from a connection URL.
    pub fn new(connection_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_url)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

fn group_error(stream: &str, group: &str, err: redis::RedisError) -> StoreError {
    if err.code() == Some("NOGROUP") {
        no_group(stream, group)
    } else {
        StoreError::Connection(err.to_string())
    }
}

fn millis_arg(duration: Duration) -> usize {
    usize::try_from(duration.as_millis()).unwrap_or(usize::MAX)
}

fn parse_entry(stream: &str, entry: StreamId) -> Result<StreamRecord, StoreError> {
    let id = entry.id.parse()?;
    let mut fields = EncodedFields::new();
    for (name, value) in entry.map {
        let bytes: Vec<u8> = redis::from_redis_value(&value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fields.insert(name, FieldValue::from_bytes(bytes));
    }
    Ok(StreamRecord {
        id,
        stream: stream.to_string(),
        fields,
    })
}

#[async_trait]
impl DurableStream for RedisDurableStream {
    async fn append(
        &self,
        stream: &str,
        fields: EncodedFields,
        max_len: Option<usize>,
    ) -> Result<StreamRecordId, StoreError> {
        if fields.is_empty() {
            return Err(empty_record());
        }
        let items: Vec<(String, Vec<u8>)> = fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_bytes()))
            .collect();

        let mut conn = self.connection().await?;
        let id: redis::RedisResult<String> = match max_len {
            Some(max_len) => {
                conn.xadd_maxlen(stream, StreamMaxlen::Approx(max_len), "*", items.as_slice())
                    .await
            }
            None => conn.xadd(stream, "*", items.as_slice()).await,
        };
        id.map_err(|e| StoreError::Connection(e.to_string()))?
            .parse()
    }

    async fn create_consumer_group(
        &self,
        stream: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(stream, group, start.as_redis_id())
            .await;
        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream = %stream, group = %group, "consumer group already exists");
                Ok(())
            }
            Err(e) => Err(StoreError::Connection(e.to_string())),
        }
    }

    async fn read_as_consumer(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count);
        if let Some(block) = block.filter(|d| !d.is_zero()) {
            options = options.block(millis_arg(block));
        }

        let mut conn = self.connection().await?;
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[stream], &[">"], &options)
            .await
            .map_err(|e| group_error(stream, group, e))?;

        let mut records = Vec::new();
        for key in reply.map(|r| r.keys).unwrap_or_default() {
            for entry in key.ids {
                records.push(parse_entry(stream, entry)?);
            }
        }
        Ok(records)
    }

    async fn ack(
        &self,
        stream: &str,
        group: &str,
        id: StreamRecordId,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let acked: i64 = conn
            .xack(stream, group, &[id.to_string()])
            .await
            .map_err(|e| group_error(stream, group, e))?;
        Ok(acked > 0)
    }

    async fn reclaim_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let pending: StreamPendingCountReply = conn
            .xpending_count(stream, group, "-", "+", RECLAIM_SCAN_LIMIT)
            .await
            .map_err(|e| group_error(stream, group, e))?;

        let min_idle_ms = millis_arg(min_idle);
        let ids: Vec<String> = pending
            .ids
            .into_iter()
            .filter(|p| p.last_delivered_ms >= min_idle_ms)
            .take(count)
            .map(|p| p.id)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // XCLAIM re-checks idleness and bumps the delivery counter.
        let claimed: StreamClaimReply = conn
            .xclaim(stream, group, consumer, min_idle_ms, ids.as_slice())
            .await
            .map_err(|e| group_error(stream, group, e))?;
        claimed
            .ids
            .into_iter()
            .map(|entry| parse_entry(stream, entry))
            .collect()
    }

    async fn pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let reply: StreamPendingCountReply = conn
            .xpending_count(stream, group, "-", "+", count)
            .await
            .map_err(|e| group_error(stream, group, e))?;
        reply
            .ids
            .into_iter()
            .map(|p| {
                Ok(PendingEntry {
                    id: p.id.parse()?,
                    consumer: p.consumer,
                    delivery_count: p.times_delivered as u64,
                    idle: Duration::from_millis(p.last_delivered_ms as u64),
                })
            })
            .collect()
    }

    async fn range(
        &self,
        stream: &str,
        count: Option<usize>,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let reply: redis::RedisResult<StreamRangeReply> = match count {
            Some(count) => conn.xrange_count(stream, "-", "+", count).await,
            None => conn.xrange_all(stream).await,
        };
        reply
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .ids
            .into_iter()
            .map(|entry| parse_entry(stream, entry))
            .collect()
    }

    async fn len(&self, stream: &str) -> Result<usize, StoreError> {
        let mut conn = self.connection().await?;
        conn.xlen(stream)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}
