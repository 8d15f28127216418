use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::bus::{Acker, Delivery, EventBus, Subscription};
use crate::error::BusError;

#[derive(Debug, Clone)]
struct Message {
    subject: String,
    payload: Vec<u8>,
    attempt: u32,
}

struct Queue {
    consumer: String,
    tx: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct BusState {
    queues: HashMap<String, Vec<Queue>>,
    published: Vec<(String, Vec<u8>)>,
    publish_attempts: usize,
    fail_publish_on: Option<usize>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Stats {
    acked: AtomicUsize,
    naked: AtomicUsize,
}

/// In-memory event bus for tests and single-process runs.
///
/// Each `(subject, consumer)` pair gets its own queue, so every subscriber
/// sees every message published after it subscribed. A `nak` puts the
/// message back on the same queue after `redelivery_delay`.
#[derive(Clone)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
    stats: Arc<Stats>,
    redelivery_delay: Duration,
    max_deliveries: Option<u32>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Creates a new bus with a short redelivery delay and no delivery limit.
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            stats: Arc::default(),
            redelivery_delay: Duration::from_millis(10),
            max_deliveries: None,
        }
    }

    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    /// Stops redelivering a message once it has been delivered `max` times.
    pub fn with_max_deliveries(mut self, max: u32) -> Self {
        self.max_deliveries = Some(max);
        self
    }

    /// Makes the `n`-th publish attempt (1-based, counted from bus creation)
    /// fail with a transport error.
    pub async fn fail_publish_on(&self, n: usize) {
        self.state.lock().await.fail_publish_on = Some(n);
    }

    /// Every successfully published `(subject, payload)` pair, in order.
    pub async fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().await.published.clone()
    }

    /// Number of publish calls, including failed ones.
    pub async fn publish_attempts(&self) -> usize {
        self.state.lock().await.publish_attempts
    }

    /// Consumers currently subscribed to `subject`.
    pub async fn subscribers(&self, subject: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .queues
            .get(subject)
            .map(|qs| {
                qs.iter()
                    .filter(|q| !q.tx.is_closed())
                    .map(|q| q.consumer.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn acked(&self) -> usize {
        self.stats.acked.load(Ordering::SeqCst)
    }

    pub fn naked(&self) -> usize {
        self.stats.naked.load(Ordering::SeqCst)
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BusError::Closed);
        }

        state.publish_attempts += 1;
        if state.fail_publish_on == Some(state.publish_attempts) {
            return Err(BusError::Transport(format!(
                "injected failure publishing to {subject}"
            )));
        }

        state.published.push((subject.to_string(), payload.clone()));
        if let Some(queues) = state.queues.get_mut(subject) {
            queues.retain(|queue| {
                queue
                    .tx
                    .send(Message {
                        subject: format!("{subject}.{}", queue.consumer),
                        payload: payload.clone(),
                        attempt: 1,
                    })
                    .is_ok()
            });
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str, consumer: &str) -> Result<Subscription, BusError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BusError::Closed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state
            .queues
            .entry(subject.to_string())
            .or_default()
            .push(Queue {
                consumer: consumer.to_string(),
                tx: tx.clone(),
            });

        let requeue = Requeue {
            tx: tx.downgrade(),
            stats: self.stats.clone(),
            delay: self.redelivery_delay,
            max_deliveries: self.max_deliveries,
        };
        let stream = futures_util::stream::unfold((rx, requeue), |(mut rx, requeue)| async move {
            let message = rx.recv().await?;
            let delivery = Delivery::new(
                message.subject.clone(),
                message.payload.clone(),
                message.attempt,
                Box::new(MemoryAcker {
                    message,
                    requeue: requeue.clone(),
                }),
            );
            Some((delivery, (rx, requeue)))
        });

        Ok(Subscription::new(
            format!("{subject}.{consumer}"),
            Box::pin(stream),
        ))
    }

    async fn close(&self) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.queues.clear();
        Ok(())
    }
}

#[derive(Clone)]
struct Requeue {
    tx: mpsc::WeakUnboundedSender<Message>,
    stats: Arc<Stats>,
    delay: Duration,
    max_deliveries: Option<u32>,
}

struct MemoryAcker {
    message: Message,
    requeue: Requeue,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self) -> Result<(), BusError> {
        self.requeue.stats.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nak(&self) -> Result<(), BusError> {
        self.requeue.stats.naked.fetch_add(1, Ordering::SeqCst);

        if let Some(max) = self.requeue.max_deliveries
            && self.message.attempt >= max
        {
            tracing::warn!(
                subject = %self.message.subject,
                attempt = self.message.attempt,
                "max deliveries reached, dropping message"
            );
            return Ok(());
        }

        let Some(tx) = self.requeue.tx.upgrade() else {
            return Err(BusError::Closed);
        };
        let mut message = self.message.clone();
        message.attempt += 1;
        let delay = self.requeue.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The subscriber may be gone by now; nothing to redeliver to then.
            let _ = tx.send(message);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_fans_out_to_each_consumer() {
        let bus = InMemoryEventBus::new();
        let mut a = bus.subscribe("ordersvc.EventOrderCreated", "inventorysvc").await.unwrap();
        let mut b = bus.subscribe("ordersvc.EventOrderCreated", "paymentsvc").await.unwrap();
        assert_eq!(a.subject(), "ordersvc.EventOrderCreated.inventorysvc");

        bus.publish("ordersvc.EventOrderCreated", b"x".to_vec()).await.unwrap();

        let da = a.next().await.unwrap();
        let db = b.next().await.unwrap();
        assert_eq!(da.subject, "ordersvc.EventOrderCreated.inventorysvc");
        assert_eq!(db.subject, "ordersvc.EventOrderCreated.paymentsvc");
        assert_eq!(da.payload, b"x");
        da.ack().await.unwrap();
        db.ack().await.unwrap();
        assert_eq!(bus.acked(), 2);
    }

    #[tokio::test]
    async fn nak_redelivers_with_next_attempt() {
        let bus = InMemoryEventBus::new().with_redelivery_delay(Duration::ZERO);
        let mut sub = bus.subscribe("s", "c").await.unwrap();
        bus.publish("s", b"m".to_vec()).await.unwrap();

        let first = sub.next().await.unwrap();
        assert_eq!(first.attempt, 1);
        first.nak().await.unwrap();

        let second = sub.next().await.unwrap();
        assert_eq!(second.attempt, 2);
        assert_eq!(second.payload, b"m");
        assert_eq!(bus.naked(), 1);
    }

    #[tokio::test]
    async fn injected_failure_hits_only_that_attempt() {
        let bus = InMemoryEventBus::new();
        bus.fail_publish_on(2).await;
        bus.publish("s", b"1".to_vec()).await.unwrap();
        assert!(bus.publish("s", b"2".to_vec()).await.is_err());
        bus.publish("s", b"3".to_vec()).await.unwrap();
        assert_eq!(bus.publish_attempts().await, 3);
        assert_eq!(bus.published().await.len(), 2);
    }

    #[tokio::test]
    async fn closed_bus_rejects_traffic_and_ends_streams() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe("s", "c").await.unwrap();
        bus.close().await.unwrap();

        assert!(matches!(bus.publish("s", vec![]).await, Err(BusError::Closed)));
        assert!(bus.subscribe("s", "c").await.is_err());
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn dropped_subscription_stops_receiving() {
        let bus = InMemoryEventBus::new();
        let sub = bus.subscribe("s", "c").await.unwrap();
        assert_eq!(bus.subscribers("s").await, vec!["c".to_string()]);
        drop(sub);
        bus.publish("s", vec![]).await.unwrap();
        assert!(bus.subscribers("s").await.is_empty());
    }
}
