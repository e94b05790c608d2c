use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use flume::{Receiver, Sender};
use tokio::sync::RwLock;
use tracing::debug;

/// Fan-out bus for pushing live events from ingestion to stream
/// subscribers. Uses flume channels for lock-free message passing;
/// each subscriber owns a bounded receiver.
pub struct EventBus<E> {
    subscribers: Arc<RwLock<Vec<Sender<E>>>>,
    capacity: usize,
    metrics: Arc<EventBusMetrics>,
}

// Manual impl: `derive(Clone)` would require `E: Clone` on the handle
// itself even though only publish needs it.
impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
            capacity: self.capacity,
            metrics: self.metrics.clone(),
        }
    }
}

/// Throughput counters for monitoring the bus
#[derive(Default)]
pub struct EventBusMetrics {
    pub events_published: AtomicU64,
    pub events_dropped: AtomicU64,
    pub subscribers_count: AtomicU64,
}

impl<E> EventBus<E>
where
    E: Clone + Send + 'static,
{
    /// Bus whose subscribers each get a bounded channel of `capacity`
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            capacity,
            metrics: Arc::new(EventBusMetrics::default()),
        }
    }

    /// Register a subscriber and return its receiving end. The
    /// subscription ends when the receiver is dropped; the dead sender
    /// is pruned on the next publish.
    pub async fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = flume::bounded(self.capacity);
        let mut subscribers = self.subscribers.write().await;
        subscribers.push(tx);
        self.metrics
            .subscribers_count
            .store(subscribers.len() as u64, Ordering::Relaxed);
        rx
    }

    /// Deliver `event` to every live subscriber. A full subscriber
    /// channel counts a drop and is skipped; slow consumers rely on the
    /// transport's own buffering, not on backpressure here.
    pub async fn publish(&self, event: E) {
        self.metrics
            .events_published
            .fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.write().await;
        let before = subscribers.len();

        subscribers.retain(|tx| {
            match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(flume::TrySendError::Full(_)) => {
                    self.metrics
                        .events_dropped
                        .fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(flume::TrySendError::Disconnected(_)) => false,
            }
        });

        if subscribers.len() != before {
            debug!(
                pruned = before - subscribers.len(),
                remaining = subscribers.len(),
                "Pruned disconnected stream subscribers"
            );
        }

        self.metrics
            .subscribers_count
            .store(subscribers.len() as u64, Ordering::Relaxed);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub fn metrics(&self) -> &EventBusMetrics { &self.metrics }
}
