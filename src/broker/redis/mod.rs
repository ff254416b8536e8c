//! Redis broker backend.
//!
//! Publishing connections come from a deadpool-managed pool of multiplexed
//! connections. Each subscription opens its own dedicated pub/sub
//! connection, since a connection in subscribed mode cannot issue
//! ordinary commands and must not be handed back to the pool.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{Connection, Manager, Pool, PoolError, Runtime, TimeoutType};
use futures::StreamExt;
use redis::aio::PubSub;
use redis::{Client, ConnectionInfo, IntoConnectionInfo};
use tracing::{debug, info};

use super::{BrokerConnection, BrokerPool, PublishBatch, Subscription};
use crate::config::RedisConfig;
use crate::error::{Result, VoteShareError};

/// Longest `acquire` waits for a free pooled connection.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pooled Redis connections for publishing and subscribing.
pub struct RedisBrokerPool {
    pool: Pool,
    client: Client,
    address: String,
}

impl RedisBrokerPool {
    /// Create a pool for the configured Redis server.
    ///
    /// Connections are opened lazily; a bad address or credential surfaces on
    /// the first `acquire` or `subscribe`. A `max-idle` of zero is rejected
    /// with `InvalidArgument`, since no connection could ever be borrowed.
    pub fn new(config: &RedisConfig) -> Result<Self> {
        if config.max_idle == Some(0) {
            return Err(VoteShareError::InvalidArgument(
                "redis.max-idle must be at least 1".to_string(),
            ));
        }

        let info = connection_info(config)?;
        let address = format!("{}:{}", config.host, config.port);

        let manager = Manager::new(info.clone())?;
        let mut builder = Pool::builder(manager)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(ACQUIRE_TIMEOUT));
        if let Some(max_idle) = config.max_idle {
            builder = builder.max_size(max_idle);
        }
        let pool = builder
            .build()
            .map_err(|e| VoteShareError::Broker(format!("Failed to build pool: {}", e)))?;

        let client = Client::open(info)?;

        info!(
            address = %address,
            authenticated = config.auth_password().is_some(),
            max_idle = ?config.max_idle,
            "Redis broker pool created"
        );

        Ok(Self {
            pool,
            client,
            address,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(closed_error());
        }
        Ok(())
    }
}

/// Build connection parameters from host, port and optional password.
pub fn connection_info(config: &RedisConfig) -> Result<ConnectionInfo> {
    let mut info = (config.host.as_str(), config.port).into_connection_info()?;
    info.redis.password = config.auth_password().map(str::to_string);
    Ok(info)
}

fn closed_error() -> VoteShareError {
    VoteShareError::IllegalState("Redis broker pool has been shut down".to_string())
}

fn map_pool_error(e: PoolError) -> VoteShareError {
    match e {
        PoolError::Closed => closed_error(),
        PoolError::Timeout(TimeoutType::Wait) => VoteShareError::Broker(format!(
            "No pooled connection became free within {:?}",
            ACQUIRE_TIMEOUT
        )),
        other => VoteShareError::Broker(other.to_string()),
    }
}

#[async_trait]
impl BrokerPool for RedisBrokerPool {
    async fn acquire(&self) -> Result<Box<dyn BrokerConnection>> {
        self.ensure_open()?;
        let conn = self.pool.get().await.map_err(map_pool_error)?;
        Ok(Box::new(RedisConnection { conn }))
    }

    async fn subscribe(&self, channel: &[u8]) -> Result<Box<dyn Subscription>> {
        self.ensure_open()?;
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        info!(
            address = %self.address,
            channel = %String::from_utf8_lossy(channel),
            "Subscribed to Redis channel"
        );

        Ok(Box::new(RedisSubscription {
            pubsub,
            channel: channel.to_vec(),
        }))
    }

    fn shutdown(&self) {
        self.pool.close();
        info!(address = %self.address, "Redis broker pool closed");
    }

    fn is_shut_down(&self) -> bool {
        self.pool.is_closed()
    }
}

/// A pooled connection; returned to the pool when dropped.
struct RedisConnection {
    conn: Connection,
}

#[async_trait]
impl BrokerConnection for RedisConnection {
    async fn publish_batch(&mut self, batch: PublishBatch) -> Result<()> {
        let count = batch.len();
        let mut pipe = redis::pipe();
        for payload in batch.payloads() {
            pipe.publish(batch.channel(), payload.as_ref()).ignore();
        }

        let _: () = pipe.query_async(&mut self.conn).await?;

        debug!(messages = count, "Published pipelined batch");
        Ok(())
    }
}

struct RedisSubscription {
    pubsub: PubSub,
    channel: Vec<u8>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next_message(&mut self) -> Option<Bytes> {
        let stream = self.pubsub.on_message();
        futures::pin_mut!(stream);
        let msg = stream.next().await?;
        Some(Bytes::copy_from_slice(msg.get_payload_bytes()))
    }

    async fn unsubscribe(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let channel = std::mem::take(&mut this.channel);
        this.pubsub.unsubscribe(channel.as_slice()).await?;
        Ok(())
    }
}
