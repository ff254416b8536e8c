//! Broker connection configuration.

use serde::Deserialize;

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RedisConfig {
    /// Redis host.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Password; empty means no authentication.
    pub auth: String,
    /// Maximum pooled connections. Unset leaves the pool's default.
    pub max_idle: Option<usize>,
}

impl RedisConfig {
    /// The configured password, if authentication is enabled.
    pub fn auth_password(&self) -> Option<&str> {
        if self.auth.is_empty() {
            None
        } else {
            Some(&self.auth)
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            auth: String::new(),
            max_idle: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_default() {
        let config = RedisConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6379);
        assert_eq!(config.auth_password(), None);
        assert_eq!(config.max_idle, None);
    }

    #[test]
    fn test_auth_password() {
        let config = RedisConfig {
            auth: "s3cret".to_string(),
            ..Default::default()
        };
        assert_eq!(config.auth_password(), Some("s3cret"));
    }
}
