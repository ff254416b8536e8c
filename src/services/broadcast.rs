//! Producer side of the relay.
//!
//! Votes arriving from the upstream listener are buffered, and a recurring
//! timer flushes the buffer to the broker channel as one pipelined batch
//! per tick. A batch that fails mid-publish is logged and dropped; its
//! votes are not re-buffered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::cancelled;
use crate::broker::{BrokerPool, PublishBatch, CHANNEL_NAME};
use crate::buffer::VoteBuffer;
use crate::codec;
use crate::config::{ticks, Config, MIN_SAFE_POLL_INTERVAL};
use crate::error::Result;
use crate::vote::Vote;

/// Name of the upstream vote listener whose shutdown stops the producer.
pub const UPSTREAM_LISTENER: &str = "Votifier";

/// Timer and buffer settings for the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Period between flushes.
    pub poll_interval: Duration,
    /// Delay before the first flush.
    pub initial_delay: Duration,
    /// Buffer capacity.
    pub queue_capacity: usize,
}

impl BroadcastSettings {
    /// Derive settings from config, applying the poll interval floor.
    pub fn from_config(config: &Config) -> Self {
        if config.poll_interval_clamped() {
            warn!(
                configured = config.poll_interval,
                effective = MIN_SAFE_POLL_INTERVAL,
                "poll-interval is too low and has been raised"
            );
            warn!("set allow-unsafe-interval to true to keep the configured value");
        }
        Self {
            poll_interval: ticks(config.effective_poll_interval()),
            initial_delay: ticks(config.initial_delay),
            queue_capacity: config.queue_capacity,
        }
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Buffers local votes and periodically publishes them.
pub struct BroadcastService {
    buffer: Arc<VoteBuffer>,
    pool: Arc<dyn BrokerPool>,
    settings: BroadcastSettings,
    stopped: Arc<AtomicBool>,
    cancel: Arc<watch::Sender<bool>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastService {
    pub fn new(pool: Arc<dyn BrokerPool>, settings: BroadcastSettings) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            buffer: Arc::new(VoteBuffer::new(settings.queue_capacity)),
            pool,
            settings,
            stopped: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(cancel),
            task: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &BroadcastSettings {
        &self.settings
    }

    /// Whether `stop` or the dependency hook has shut the producer down.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Number of votes waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Hook for the upstream listener's vote-arrival event.
    pub fn arrival_hook(&self) -> VoteArrivalHook {
        VoteArrivalHook {
            buffer: self.buffer.clone(),
            stopped: self.stopped.clone(),
        }
    }

    /// Hook for the host's "plugin disabled" event.
    pub fn dependency_hook(&self) -> DependencyDisabledHook {
        DependencyDisabledHook {
            buffer: self.buffer.clone(),
            pool: self.pool.clone(),
            stopped: self.stopped.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Start the recurring flush timer. Calling this twice, or after the
    /// producer has stopped, has no effect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() || self.is_stopped() {
            return;
        }

        let buffer = self.buffer.clone();
        let pool = self.pool.clone();
        let settings = self.settings.clone();
        let mut cancel_rx = self.cancel.subscribe();

        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(
                Instant::now() + settings.initial_delay,
                settings.poll_interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                poll_interval = ?settings.poll_interval,
                initial_delay = ?settings.initial_delay,
                capacity = settings.queue_capacity,
                "Broadcast timer started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = flush(&buffer, pool.as_ref()).await;
                    }
                    _ = cancelled(&mut cancel_rx) => {
                        info!("Broadcast timer stopped");
                        break;
                    }
                }
            }
        }));
    }

    /// Run one tick immediately.
    ///
    /// Returns the number of votes published.
    pub async fn flush(&self) -> Result<usize> {
        flush(&self.buffer, self.pool.as_ref()).await
    }

    /// Stop the timer and discard anything still buffered. Votes offered
    /// afterwards are refused.
    ///
    /// A tick already publishing is allowed to finish. Safe to call more
    /// than once. The pool is left to its owner.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel.send_replace(true);

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Broadcast timer task failed");
            }
        }

        self.buffer.clear();
    }
}

/// Drain the buffer and publish every vote in one pipelined batch.
///
/// An empty buffer is a no-op that does not touch the pool. A failure to
/// acquire a connection leaves the buffer intact; a failure after draining
/// loses that tick's votes.
async fn flush(buffer: &VoteBuffer, pool: &dyn BrokerPool) -> Result<usize> {
    if buffer.is_empty() {
        return Ok(0);
    }

    let mut conn = pool.acquire().await.map_err(|e| {
        error!(error = %e, pending = buffer.len(), "Error acquiring broker connection for pending votes");
        e
    })?;

    let votes = buffer.drain_all();
    let mut batch = PublishBatch::new(CHANNEL_NAME);
    for vote in &votes {
        match codec::encode(vote) {
            Ok(payload) => batch.publish(payload),
            Err(e) => error!(error = %e, username = %vote.username, "Dropping unencodable vote"),
        }
    }

    if batch.is_empty() {
        return Ok(0);
    }

    let count = batch.len();
    match conn.publish_batch(batch).await {
        Ok(()) => {
            debug!(published = count, "Flushed pending votes");
            Ok(count)
        }
        Err(e) => {
            error!(error = %e, lost = count, "Error processing pending votes");
            Err(e)
        }
    }
}

/// Feeds votes from the upstream listener into the producer buffer.
///
/// Cheap to clone and safe to call from any thread; never blocks.
#[derive(Clone)]
pub struct VoteArrivalHook {
    buffer: Arc<VoteBuffer>,
    stopped: Arc<AtomicBool>,
}

impl VoteArrivalHook {
    /// Offer a vote to the buffer. Returns `false` if it was refused,
    /// either because the buffer is full or the producer has stopped.
    pub fn on_vote(&self, vote: Vote) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            debug!(username = %vote.username, "Producer stopped, dropping vote");
            return false;
        }
        if self.buffer.offer(vote) {
            return true;
        }
        warn!(
            capacity = self.buffer.capacity(),
            "Queue refused offered vote, it is most likely full"
        );
        warn!("You may want to decrease the poll-interval config option");
        false
    }
}

/// Stops the producer when the upstream listener is disabled.
#[derive(Clone)]
pub struct DependencyDisabledHook {
    buffer: Arc<VoteBuffer>,
    pool: Arc<dyn BrokerPool>,
    stopped: Arc<AtomicBool>,
    cancel: Arc<watch::Sender<bool>>,
}

impl DependencyDisabledHook {
    /// Handle a "plugin disabled" notification.
    ///
    /// Returns `true` if `plugin_name` was the upstream listener. The
    /// producer then refuses further votes, its timer stops, the buffer is
    /// discarded and the pool is destroyed. The owning `VoteRelay` still
    /// needs `stop` to join the timer task.
    pub fn on_plugin_disabled(&self, plugin_name: &str) -> bool {
        if !plugin_name.eq_ignore_ascii_case(UPSTREAM_LISTENER) {
            return false;
        }
        info!(plugin = %plugin_name, "{} was disabled, disabling self", UPSTREAM_LISTENER);
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel.send_replace(true);
        self.buffer.clear();

        info!("Destroying pool");
        self.pool.shutdown();
        true
    }
}
