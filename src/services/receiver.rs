//! Consumer side of the relay.
//!
//! Holds one subscription to the broker channel for the life of the
//! service and forwards each decoded vote to the host's dispatcher.
//! Subscribe and unsubscribe failures are logged; there is no reconnect.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::cancelled;
use crate::broker::{BrokerPool, CHANNEL_NAME};
use crate::dispatch::{dispatch_message, VoteDispatcher};

/// Subscribes to the channel and dispatches received votes.
pub struct ReceiverService {
    pool: Arc<dyn BrokerPool>,
    dispatcher: Arc<dyn VoteDispatcher>,
    cancel: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReceiverService {
    pub fn new(pool: Arc<dyn BrokerPool>, dispatcher: Arc<dyn VoteDispatcher>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            pool,
            dispatcher,
            cancel,
            task: Mutex::new(None),
        }
    }

    /// Spawn the subscription task. Calling this twice has no effect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }

        let pool = self.pool.clone();
        let dispatcher = self.dispatcher.clone();
        let mut cancel_rx = self.cancel.subscribe();

        *task = Some(tokio::spawn(async move {
            let subscribed = tokio::select! {
                result = pool.subscribe(CHANNEL_NAME) => result,
                _ = cancelled(&mut cancel_rx) => return,
            };
            let mut subscription = match subscribed {
                Ok(subscription) => subscription,
                Err(e) => {
                    error!(error = %e, "Failed to subscribe to channel");
                    return;
                }
            };

            info!(
                channel = %String::from_utf8_lossy(CHANNEL_NAME),
                "Receiving votes"
            );

            loop {
                tokio::select! {
                    message = subscription.next_message() => match message {
                        Some(payload) => {
                            dispatch_message(dispatcher.as_ref(), &payload);
                        }
                        None => {
                            warn!("Subscription connection closed, no longer receiving votes");
                            return;
                        }
                    },
                    _ = cancelled(&mut cancel_rx) => break,
                }
            }

            info!("Attempting to unsubscribe from the channel");
            if let Err(e) = subscription.unsubscribe().await {
                error!(error = %e, "Failed to unsubscribe from channel");
            }
        }));
    }

    /// Unsubscribe and wait for the subscription task to finish.
    ///
    /// Safe to call more than once.
    pub async fn stop(&self) {
        self.cancel.send_replace(true);

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Receiver task failed");
            }
        }
    }
}
