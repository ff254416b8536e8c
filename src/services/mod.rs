//! Relay pipelines.
//!
//! - `BroadcastService`: buffers local votes, publishes them on a timer
//! - `ReceiverService`: subscribes to the channel, dispatches received votes

pub mod broadcast;
pub mod receiver;

pub use broadcast::{
    BroadcastService, BroadcastSettings, DependencyDisabledHook, VoteArrivalHook,
    UPSTREAM_LISTENER,
};
pub use receiver::ReceiverService;

use tokio::sync::watch;

/// Resolve once cancellation has been signalled or the sender is gone.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
