//! VoteShare - cross-server vote relay
//!
//! Relays vote notifications between game servers over a single Redis
//! pub/sub channel. A server in BROADCAST mode buffers the votes its
//! listener receives and publishes them in batches on a timer; servers in
//! RECEIVER mode subscribe to the channel and hand each decoded vote to
//! the host application.

pub mod broker;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod relay;
pub mod services;
pub mod utils;
pub mod vote;

pub use error::{Result, VoteShareError};
pub use relay::VoteRelay;
pub use vote::Vote;
