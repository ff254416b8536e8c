//! Redis broker integration tests using testcontainers.
//!
//! Run with: cargo test --test broker_redis -- --ignored --nocapture
//!
//! These tests spin up Redis in a container using testcontainers-rs.

use std::sync::Arc;
use std::time::Duration;

use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage, ImageExt,
};
use tokio::sync::mpsc;

use voteshare::broker::{BrokerPool, PublishBatch, RedisBrokerPool, CHANNEL_NAME};
use voteshare::config::{Config, ListenerMode, RedisConfig};
use voteshare::dispatch::VoteDispatcher;
use voteshare::{codec, Vote, VoteRelay, VoteShareError};

/// Start a Redis container and return its connection settings.
async fn start_redis() -> (testcontainers::ContainerAsync<GenericImage>, RedisConfig) {
    let image = GenericImage::new("redis", "7")
        .with_exposed_port(6379.tcp())
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));

    let container = image
        .with_startup_timeout(Duration::from_secs(60))
        .start()
        .await
        .expect("Failed to start Redis container");

    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get mapped port");

    let host = container
        .get_host()
        .await
        .expect("Failed to get container host");

    println!("Redis available at: {}:{}", host, port);

    let config = RedisConfig {
        host: host.to_string(),
        port,
        ..Default::default()
    };
    (container, config)
}

fn vote(username: &str) -> Vote {
    Vote::new("PlanetMinecraft", "1700000000", username, "10.0.0.1:25565")
}

fn channel_dispatcher() -> (Arc<dyn VoteDispatcher>, mpsc::UnboundedReceiver<Vote>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = move |vote: Vote| {
        let _ = tx.send(vote);
    };
    (Arc::new(dispatcher), rx)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_pipelined_batch_reaches_subscriber_in_order() {
    let (_container, redis) = start_redis().await;
    let pool = RedisBrokerPool::new(&redis).expect("Failed to create pool");

    let mut subscription = pool
        .subscribe(CHANNEL_NAME)
        .await
        .expect("Failed to subscribe");

    let votes = [vote("alice"), vote("bob"), vote("carol")];
    let mut batch = PublishBatch::new(CHANNEL_NAME);
    for vote in &votes {
        batch.publish(codec::encode(vote).unwrap());
    }

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    conn.publish_batch(batch).await.expect("Failed to publish");

    for expected in &votes {
        let payload = tokio::time::timeout(Duration::from_secs(5), subscription.next_message())
            .await
            .expect("Timed out waiting for message")
            .expect("Subscription closed");
        assert_eq!(&codec::decode(&payload).unwrap(), expected);
    }

    subscription
        .unsubscribe()
        .await
        .expect("Failed to unsubscribe");
    pool.shutdown();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_relays_end_to_end() {
    let (_container, redis) = start_redis().await;

    let (dispatcher, mut rx) = channel_dispatcher();
    let receiver_config = Config {
        mode: ListenerMode::Receiver,
        redis: redis.clone(),
        ..Default::default()
    };
    let receiver = VoteRelay::start(&receiver_config, dispatcher).expect("Failed to start receiver");

    let broadcast_config = Config {
        mode: ListenerMode::Broadcast,
        redis,
        ..Default::default()
    };
    let (unused, _) = channel_dispatcher();
    let broadcaster = VoteRelay::start(&broadcast_config, unused).expect("Failed to start broadcaster");

    // Give the receiver time to issue SUBSCRIBE before publishing.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let hook = broadcaster.arrival_hook().unwrap();
    assert!(hook.on_vote(vote("alice")));
    assert!(hook.on_vote(vote("bob")));
    let published = broadcaster.broadcast().unwrap().flush().await.unwrap();
    assert_eq!(published, 2);

    for expected in [vote("alice"), vote("bob")] {
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("Timed out waiting for vote");
        assert_eq!(received, Some(expected));
    }

    broadcaster.stop().await;
    receiver.stop().await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_pool_rejects_use_after_shutdown() {
    let (_container, redis) = start_redis().await;
    let pool = RedisBrokerPool::new(&redis).expect("Failed to create pool");

    pool.acquire().await.expect("Failed to acquire connection");
    pool.shutdown();

    assert!(pool.is_shut_down());
    assert!(matches!(
        pool.acquire().await,
        Err(VoteShareError::IllegalState(_))
    ));
}
