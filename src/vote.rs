//! The vote record relayed between servers.

use serde::Deserialize;

/// A single vote as delivered by the upstream notification listener.
///
/// All four fields are opaque text. `timestamp` keeps whatever format the
/// notification protocol used; `address` is usually the voter's `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Vote {
    pub service_name: String,
    pub timestamp: String,
    pub username: String,
    pub address: String,
}

impl Vote {
    pub fn new(
        service_name: impl Into<String>,
        timestamp: impl Into<String>,
        username: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            timestamp: timestamp.into(),
            username: username.into(),
            address: address.into(),
        }
    }
}
