//! Relay lifecycle.
//!
//! A [`VoteRelay`] owns the broker pool and exactly one pipeline, chosen by
//! the configured mode. Hosts call [`VoteRelay::start`] when enabled and
//! [`VoteRelay::stop`] when disabled; nothing is held in statics, so several
//! relays can coexist in one process.

use std::sync::Arc;

use tracing::info;

use crate::broker::BrokerPool;
use crate::config::{Config, ListenerMode};
use crate::dispatch::VoteDispatcher;
use crate::services::{
    BroadcastService, BroadcastSettings, DependencyDisabledHook, ReceiverService, VoteArrivalHook,
};

enum Pipeline {
    Broadcast(BroadcastService),
    Receiver(ReceiverService),
}

/// A running relay in either producer or consumer mode.
pub struct VoteRelay {
    mode: ListenerMode,
    pool: Arc<dyn BrokerPool>,
    pipeline: Pipeline,
}

impl VoteRelay {
    /// Create the Redis pool from `config` and start the selected pipeline.
    ///
    /// `dispatcher` receives votes in RECEIVER mode and is unused otherwise.
    #[cfg(feature = "redis")]
    pub fn start(config: &Config, dispatcher: Arc<dyn VoteDispatcher>) -> crate::Result<Self> {
        let pool = crate::broker::RedisBrokerPool::new(&config.redis)?;
        Ok(Self::start_with_pool(config, Arc::new(pool), dispatcher))
    }

    /// Start the selected pipeline on an existing pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_with_pool(
        config: &Config,
        pool: Arc<dyn BrokerPool>,
        dispatcher: Arc<dyn VoteDispatcher>,
    ) -> Self {
        let mode = config.mode;
        info!(mode = %mode, "Running in {} mode", mode);

        let pipeline = match mode {
            ListenerMode::Broadcast => {
                let service =
                    BroadcastService::new(pool.clone(), BroadcastSettings::from_config(config));
                service.start();
                Pipeline::Broadcast(service)
            }
            ListenerMode::Receiver => {
                let service = ReceiverService::new(pool.clone(), dispatcher);
                service.start();
                Pipeline::Receiver(service)
            }
        };

        Self {
            mode,
            pool,
            pipeline,
        }
    }

    pub fn mode(&self) -> ListenerMode {
        self.mode
    }

    /// The producer, when running in BROADCAST mode.
    pub fn broadcast(&self) -> Option<&BroadcastService> {
        match &self.pipeline {
            Pipeline::Broadcast(service) => Some(service),
            Pipeline::Receiver(_) => None,
        }
    }

    /// Vote-arrival hook to register with the upstream listener.
    ///
    /// `None` in RECEIVER mode, where local votes are not relayed.
    pub fn arrival_hook(&self) -> Option<VoteArrivalHook> {
        self.broadcast().map(BroadcastService::arrival_hook)
    }

    /// Hook for the host's "plugin disabled" event. `None` in RECEIVER mode.
    pub fn dependency_hook(&self) -> Option<DependencyDisabledHook> {
        self.broadcast().map(BroadcastService::dependency_hook)
    }

    /// Stop the pipeline and destroy the pool.
    ///
    /// Hosts call this on disable even after the dependency hook fired; the
    /// hook already refused further votes and destroyed the pool, and this
    /// joins the stopped timer task.
    pub async fn stop(self) {
        match &self.pipeline {
            Pipeline::Broadcast(service) => service.stop().await,
            Pipeline::Receiver(service) => service.stop().await,
        }

        info!("Destroying pool");
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MockBroker, CHANNEL_NAME};
    use crate::codec;
    use crate::vote::Vote;
    use std::time::Duration;

    fn config(mode: ListenerMode) -> Config {
        Config {
            mode,
            ..Default::default()
        }
    }

    fn noop_dispatcher() -> Arc<dyn VoteDispatcher> {
        Arc::new(|_: Vote| {})
    }

    #[tokio::test]
    async fn test_broadcast_mode_exposes_hooks() {
        let broker = MockBroker::new();
        let relay = VoteRelay::start_with_pool(
            &config(ListenerMode::Broadcast),
            Arc::new(broker.clone()),
            noop_dispatcher(),
        );

        assert_eq!(relay.mode(), ListenerMode::Broadcast);
        let hook = relay.arrival_hook().unwrap();
        assert!(relay.dependency_hook().is_some());

        let vote = Vote::new("svc", "1", "alice", "10.0.0.1:25565");
        assert!(hook.on_vote(vote.clone()));
        assert_eq!(relay.broadcast().unwrap().flush().await.unwrap(), 1);

        let batches = broker.published();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].payloads(), &[codec::encode(&vote).unwrap()]);

        relay.stop().await;
        assert!(broker.is_shut_down());
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_receiver_mode_has_no_hooks() {
        let broker = MockBroker::new();
        let relay = VoteRelay::start_with_pool(
            &config(ListenerMode::Receiver),
            Arc::new(broker.clone()),
            noop_dispatcher(),
        );

        assert_eq!(relay.mode(), ListenerMode::Receiver);
        assert!(relay.arrival_hook().is_none());
        assert!(relay.dependency_hook().is_none());
        assert!(relay.broadcast().is_none());

        for _ in 0..100 {
            if broker.subscriber_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(broker.subscriber_count(), 1);
        assert_eq!(broker.acquired_count(), 0);

        relay.stop().await;
        assert_eq!(broker.unsubscribed_count(), 1);
        assert!(broker.is_shut_down());
        assert_eq!(broker.deliver(CHANNEL_NAME, &b"late"[..]), 0);
    }

    #[tokio::test]
    async fn test_stop_after_dependency_disabled() {
        let broker = MockBroker::new();
        let relay = VoteRelay::start_with_pool(
            &config(ListenerMode::Broadcast),
            Arc::new(broker.clone()),
            noop_dispatcher(),
        );

        relay.arrival_hook().unwrap().on_vote(Vote::new("svc", "1", "a", "b"));
        assert!(relay.dependency_hook().unwrap().on_plugin_disabled("Votifier"));
        assert_eq!(relay.broadcast().unwrap().pending(), 0);
        assert!(broker.is_shut_down());
        assert!(!relay.arrival_hook().unwrap().on_vote(Vote::new("svc", "2", "c", "d")));

        relay.stop().await;
        assert!(broker.is_shut_down());
        assert!(broker.published().is_empty());
    }
}
