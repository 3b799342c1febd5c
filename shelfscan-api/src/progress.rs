//! Per-job progress channels
//!
//! Each scan job owns exactly one channel, addressed by job id through
//! the `ProgressChannels` registry, so every participant for one job
//! reaches the same fan-out point and jobs never interfere with each
//! other. Delivery is best-effort: a push with no subscribers is a
//! silent no-op, a slow subscriber may lag and lose events, and nothing
//! is buffered for late listeners. The job record remains the
//! authoritative outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shelfscan_common::events::{ProgressEvent, ScanEvent};

const CHANNEL_CAPACITY: usize = 64;

/// Fan-out point for one job's progress events
///
/// States: Empty (no subscribers) → Ready (client signaled) → Closed
/// (terminal). Pushes after close are no-ops.
pub struct ProgressChannel {
    tx: broadcast::Sender<ScanEvent>,
    ready: AtomicBool,
    closed: AtomicBool,
}

impl ProgressChannel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Attach one subscriber; `None` once the channel has closed
    pub fn attach(&self) -> Option<broadcast::Receiver<ScanEvent>> {
        if self.is_closed() {
            return None;
        }
        Some(self.tx.subscribe())
    }

    /// Idempotently flag that a listener is attached and ready
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Best-effort fan-out of one progress event
    ///
    /// Zero subscribers or a closed channel is a silent no-op; there is
    /// no retry and no buffering for late listeners.
    pub fn push(&self, event: ProgressEvent) {
        if self.is_closed() {
            return;
        }
        let _ = self.tx.send(ScanEvent::Progress(event));
    }

    /// Send the final close event and refuse all further traffic
    ///
    /// Subscribers observe the `Closed` event and end their streams.
    /// Calling close twice keeps the first reason.
    pub fn close(&self, reason: impl Into<String>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(ScanEvent::Closed {
            reason: reason.into(),
        });
    }
}

/// Registry of live progress channels, one per active job
#[derive(Clone, Default)]
pub struct ProgressChannels {
    inner: Arc<RwLock<HashMap<Uuid, Arc<ProgressChannel>>>>,
}

impl ProgressChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or return) the channel for a job
    pub async fn open(&self, job_id: Uuid) -> Arc<ProgressChannel> {
        let mut map = self.inner.write().await;
        map.entry(job_id)
            .or_insert_with(|| {
                debug!(job_id = %job_id, "Opened progress channel");
                Arc::new(ProgressChannel::new())
            })
            .clone()
    }

    pub async fn get(&self, job_id: Uuid) -> Option<Arc<ProgressChannel>> {
        self.inner.read().await.get(&job_id).cloned()
    }

    /// Drop the registry entry; existing subscribers keep their receivers
    pub async fn remove(&self, job_id: Uuid) {
        self.inner.write().await.remove(&job_id);
    }

    /// Push to a job's channel if it still exists
    pub async fn push(&self, job_id: Uuid, event: ProgressEvent) {
        if let Some(channel) = self.get(job_id).await {
            channel.push(event);
        }
    }

    /// Close a job's channel with a reason and drop the registry entry
    pub async fn close(&self, job_id: Uuid, reason: impl Into<String>) {
        let channel = {
            let mut map = self.inner.write().await;
            map.remove(&job_id)
        };
        if let Some(channel) = channel {
            channel.close(reason);
        }
    }
}
