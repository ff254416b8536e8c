//! Hand-off of received votes to the host application.

use tracing::{debug, error, info};

use crate::codec;
use crate::vote::Vote;

/// Receives each vote decoded from the broker channel.
///
/// Called once per inbound message from the subscription task, never from
/// the caller of `start`. What happens to the vote afterwards is up to the
/// host.
pub trait VoteDispatcher: Send + Sync {
    fn dispatch(&self, vote: Vote);
}

impl<F> VoteDispatcher for F
where
    F: Fn(Vote) + Send + Sync,
{
    fn dispatch(&self, vote: Vote) {
        self(vote)
    }
}

/// Dispatcher that only logs each vote. Used by the standalone binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl VoteDispatcher for LogDispatcher {
    fn dispatch(&self, vote: Vote) {
        info!(
            service = %vote.service_name,
            username = %vote.username,
            address = %vote.address,
            timestamp = %vote.timestamp,
            "Vote received"
        );
    }
}

/// Result of processing one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// Decoded and handed to the dispatcher.
    Dispatched,
    /// Message could not be decoded and was dropped.
    DecodeError,
}

/// Decode `payload` and forward it to `dispatcher`.
///
/// Undecodable payloads are logged and dropped.
pub fn dispatch_message(dispatcher: &dyn VoteDispatcher, payload: &[u8]) -> DispatchResult {
    match codec::decode(payload) {
        Ok(vote) => {
            debug!(username = %vote.username, service = %vote.service_name, "Dispatching vote");
            dispatcher.dispatch(vote);
            DispatchResult::Dispatched
        }
        Err(e) => {
            error!(error = %e, bytes = payload.len(), "Dropping undecodable vote message");
            DispatchResult::DecodeError
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_dispatch_message_decodes_and_forwards() {
        let received = Mutex::new(Vec::new());
        let dispatcher = |vote: Vote| received.lock().unwrap().push(vote);

        let vote = Vote::new("svc", "1", "alice", "127.0.0.1:1");
        let payload = codec::encode(&vote).unwrap();

        assert_eq!(
            dispatch_message(&dispatcher, &payload),
            DispatchResult::Dispatched
        );
        assert_eq!(*received.lock().unwrap(), vec![vote]);
    }

    #[test]
    fn test_dispatch_message_drops_garbage() {
        let received = Mutex::new(Vec::new());
        let dispatcher = |vote: Vote| received.lock().unwrap().push(vote);

        assert_eq!(
            dispatch_message(&dispatcher, b"\x00\x09short"),
            DispatchResult::DecodeError
        );
        assert!(received.lock().unwrap().is_empty());
    }
}
