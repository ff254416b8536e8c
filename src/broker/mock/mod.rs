//! Mock broker implementation for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{BrokerConnection, BrokerPool, PublishBatch, Subscription};
use crate::error::{Result, VoteShareError};

/// In-memory broker that records what the pipelines do with it.
///
/// Cloning shares the recorded state, so a test can keep one handle while
/// the pipeline under test owns another.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    acquired: AtomicUsize,
    unsubscribed: AtomicUsize,
    shut_down: AtomicBool,
    fail_on_publish: AtomicBool,
    fail_on_subscribe: AtomicBool,
    fail_on_unsubscribe: AtomicBool,
    published: Mutex<Vec<PublishBatch>>,
    subscribers: Mutex<Vec<(Vec<u8>, mpsc::UnboundedSender<Bytes>)>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_subscribe(&self, fail: bool) {
        self.state.fail_on_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_unsubscribe(&self, fail: bool) {
        self.state.fail_on_unsubscribe.store(fail, Ordering::SeqCst);
    }

    /// Number of connections borrowed via `acquire`.
    pub fn acquired_count(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    pub fn unsubscribed_count(&self) -> usize {
        self.state.unsubscribed.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = lock(&self.state.subscribers);
        subscribers.retain(|(_, tx)| !tx.is_closed());
        subscribers.len()
    }

    /// Committed publish batches, in commit order.
    pub fn published(&self) -> Vec<PublishBatch> {
        lock(&self.state.published).clone()
    }

    pub fn take_published(&self) -> Vec<PublishBatch> {
        std::mem::take(&mut *lock(&self.state.published))
    }

    /// Deliver `payload` to every live subscription on `channel`.
    ///
    /// Returns the number of subscriptions it reached.
    pub fn deliver(&self, channel: &[u8], payload: impl Into<Bytes>) -> usize {
        let payload = payload.into();
        lock(&self.state.subscribers)
            .iter()
            .filter(|(subscribed, _)| subscribed.as_slice() == channel)
            .filter(|(_, tx)| tx.send(payload.clone()).is_ok())
            .count()
    }

    /// Drop every subscription's sending side, as if the broker went away.
    pub fn disconnect_subscribers(&self) {
        lock(&self.state.subscribers).clear();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(VoteShareError::IllegalState(
                "mock broker has been shut down".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerPool for MockBroker {
    async fn acquire(&self) -> Result<Box<dyn BrokerConnection>> {
        self.ensure_open()?;
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
        }))
    }

    async fn subscribe(&self, channel: &[u8]) -> Result<Box<dyn Subscription>> {
        self.ensure_open()?;
        if self.state.fail_on_subscribe.load(Ordering::SeqCst) {
            return Err(VoteShareError::Broker(
                "Mock subscribe failure".to_string(),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state.subscribers).push((channel.to_vec(), tx));
        Ok(Box::new(MockSubscription {
            state: self.state.clone(),
            rx,
        }))
    }

    fn shutdown(&self) {
        self.state.shut_down.store(true, Ordering::SeqCst);
    }

    fn is_shut_down(&self) -> bool {
        self.state.shut_down.load(Ordering::SeqCst)
    }
}

struct MockConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl BrokerConnection for MockConnection {
    async fn publish_batch(&mut self, batch: PublishBatch) -> Result<()> {
        if self.state.fail_on_publish.load(Ordering::SeqCst) {
            return Err(VoteShareError::Broker("Mock publish failure".to_string()));
        }
        lock(&self.state.published).push(batch);
        Ok(())
    }
}

struct MockSubscription {
    state: Arc<MockState>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

#[async_trait]
impl Subscription for MockSubscription {
    async fn next_message(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    async fn unsubscribe(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.rx.close();
        if this.state.fail_on_unsubscribe.load(Ordering::SeqCst) {
            return Err(VoteShareError::Broker(
                "Mock unsubscribe failure".to_string(),
            ));
        }
        this.state.unsubscribed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
