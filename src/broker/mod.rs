//! Pub/sub broker access for the relay pipelines.
//!
//! This module contains:
//! - `BrokerPool` trait: borrow publishing connections, open subscriptions
//! - `BrokerConnection` trait: one borrowed connection, released on drop
//! - `Subscription` trait: a long-lived channel subscription
//! - Implementations: Redis (pooled), Mock

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub mod mock;
#[cfg(feature = "redis")]
pub mod redis;

pub use mock::MockBroker;
#[cfg(feature = "redis")]
pub use self::redis::RedisBrokerPool;

/// The single broker channel votes are relayed on.
pub const CHANNEL_NAME: &[u8] = b"voteshare";

// ============================================================================
// Traits
// ============================================================================

/// A set of reusable broker connections.
///
/// Connections are borrowed for the duration of one operation and returned
/// when the borrowed handle is dropped, on every exit path. The pool never
/// retries a failed operation; that is left to the caller.
///
/// Implementations:
/// - `RedisBrokerPool`: deadpool-managed Redis connections
/// - `MockBroker`: In-memory recorder for testing
#[async_trait]
pub trait BrokerPool: Send + Sync {
    /// Borrow a connection for publishing.
    ///
    /// Fails with `IllegalState` after [`shutdown`](Self::shutdown).
    async fn acquire(&self) -> Result<Box<dyn BrokerConnection>>;

    /// Open a subscription to `channel` on a connection held until unsubscribe.
    ///
    /// Fails with `IllegalState` after [`shutdown`](Self::shutdown).
    async fn subscribe(&self, channel: &[u8]) -> Result<Box<dyn Subscription>>;

    /// Close all pooled connections.
    fn shutdown(&self);

    fn is_shut_down(&self) -> bool;
}

/// A borrowed broker connection.
#[async_trait]
pub trait BrokerConnection: Send {
    /// Send every message in `batch` as a single pipelined round-trip.
    async fn publish_batch(&mut self, batch: PublishBatch) -> Result<()>;
}

/// A subscription holding its own connection.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message payload on the subscribed channel.
    ///
    /// Returns `None` once the underlying connection has closed.
    async fn next_message(&mut self) -> Option<Bytes>;

    /// Unsubscribe and release the connection.
    async fn unsubscribe(self: Box<Self>) -> Result<()>;
}

// ============================================================================
// Publish batch
// ============================================================================

/// Messages queued for one pipelined publish transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishBatch {
    channel: Vec<u8>,
    payloads: Vec<Bytes>,
}

impl PublishBatch {
    pub fn new(channel: &[u8]) -> Self {
        Self {
            channel: channel.to_vec(),
            payloads: Vec::new(),
        }
    }

    /// Queue one message on the batch's channel.
    pub fn publish(&mut self, payload: Bytes) {
        self.payloads.push(payload);
    }

    pub fn channel(&self) -> &[u8] {
        &self.channel
    }

    pub fn payloads(&self) -> &[Bytes] {
        &self.payloads
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn into_payloads(self) -> Vec<Bytes> {
        self.payloads
    }
}
