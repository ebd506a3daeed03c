//! Consumer-group reading for downstream tools.

use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures_util::Stream;
use tracing::{debug, info};

use triage_core::{DurableStream, StartPosition, StoreError, StreamRecord};

/// How a [`tail`] reads its group.
#[derive(Debug, Clone)]
pub struct TailOptions {
    pub group: String,
    pub consumer: String,
    pub start: StartPosition,
    /// Records per read.
    pub count: usize,
    /// Wait this long for new records on each read. `None` or a zero
    /// duration stops at the first empty read.
    pub block: Option<Duration>,
    /// Take over entries left pending by other consumers for this long
    /// before reading new ones.
    pub reclaim_idle: Option<Duration>,
}

impl TailOptions {
    pub fn new(group: impl Into<String>, consumer: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            consumer: consumer.into(),
            start: StartPosition::Beginning,
            count: 10,
            block: None,
            reclaim_idle: None,
        }
    }
}

/// Records of `stream_name` delivered to one consumer of a group.
///
/// The group is created if needed. Records are left pending; the caller acks
/// them once handled.
pub fn tail(
    stream: Arc<dyn DurableStream>,
    stream_name: String,
    options: TailOptions,
) -> impl Stream<Item = Result<StreamRecord, StoreError>> {
    try_stream! {
        stream
            .create_consumer_group(&stream_name, &options.group, options.start)
            .await?;
        info!(stream = %stream_name, group = %options.group, consumer = %options.consumer, "tailing stream");

        if let Some(min_idle) = options.reclaim_idle {
            let reclaimed = stream
                .reclaim_pending(&stream_name, &options.group, &options.consumer, min_idle, options.count)
                .await?;
            debug!(reclaimed = reclaimed.len(), "reclaimed idle entries");
            for record in reclaimed {
                yield record;
            }
        }

        loop {
            let batch = stream
                .read_as_consumer(
                    &stream_name,
                    &options.group,
                    &options.consumer,
                    options.count,
                    options.block,
                )
                .await?;
            if batch.is_empty() && options.block.map_or(true, |d| d.is_zero()) {
                break;
            }
            for record in batch {
                yield record;
            }
        }
    }
}
