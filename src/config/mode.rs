//! Relay mode selection.

use std::fmt;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

/// Which side of the relay this process runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListenerMode {
    /// Buffer local votes and publish them to the channel.
    Broadcast,
    /// Subscribe to the channel and dispatch received votes locally.
    #[default]
    Receiver,
}

impl ListenerMode {
    /// Map a configured value to a mode.
    ///
    /// Matching is case-sensitive. Anything other than `BROADCAST` or
    /// `RECEIVER` falls back to `Receiver`.
    pub fn from_config(value: &str) -> Self {
        match value {
            "BROADCAST" => ListenerMode::Broadcast,
            "RECEIVER" => ListenerMode::Receiver,
            _ => ListenerMode::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerMode::Broadcast => "BROADCAST",
            ListenerMode::Receiver => "RECEIVER",
        }
    }
}

impl fmt::Display for ListenerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deserialize a mode without ever failing: unknown strings and non-string
/// values both become `Receiver`.
pub(crate) fn lenient_mode<'de, D>(deserializer: D) -> Result<ListenerMode, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawMode {
        Text(String),
        Other(IgnoredAny),
    }

    Ok(match RawMode::deserialize(deserializer)? {
        RawMode::Text(value) => ListenerMode::from_config(&value),
        RawMode::Other(_) => ListenerMode::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_exact_names() {
        assert_eq!(
            ListenerMode::from_config("BROADCAST"),
            ListenerMode::Broadcast
        );
        assert_eq!(ListenerMode::from_config("RECEIVER"), ListenerMode::Receiver);
    }

    #[test]
    fn test_from_config_is_case_sensitive() {
        assert_eq!(ListenerMode::from_config("broadcast"), ListenerMode::Receiver);
        assert_eq!(ListenerMode::from_config("Broadcast"), ListenerMode::Receiver);
    }

    #[test]
    fn test_from_config_unknown_defaults_to_receiver() {
        assert_eq!(ListenerMode::from_config(""), ListenerMode::Receiver);
        assert_eq!(ListenerMode::from_config("BOTH"), ListenerMode::Receiver);
    }

    #[test]
    fn test_display_round_trips() {
        for mode in [ListenerMode::Broadcast, ListenerMode::Receiver] {
            assert_eq!(ListenerMode::from_config(&mode.to_string()), mode);
        }
    }
}
