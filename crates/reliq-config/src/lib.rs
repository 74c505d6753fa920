//! # reliq-config
//!
//! Configuration for the reliq pub/sub client, supporting defaults, TOML
//! files, and environment variable overrides.
//!
//! Configuration faults are startup faults: `Config::validate` runs before
//! any delivery loop is spawned, so a missing identity or a malformed Redis
//! URL fails fast instead of surfacing mid-delivery.

pub mod error;
pub mod loader;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters, Default)]
#[setters(strip_option, into)]
#[serde(default)]
pub struct Config {
    /// Own participant name; required, used as the producer identity when
    /// publishing and as the consumer identity when subscribing
    pub identity: String,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Delivery configuration
    pub delivery: DeliveryConfig,
}

/// Redis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Option<Duration>,
    /// Command timeout for non-blocking commands
    pub command_timeout: Option<Duration>,
}

/// Which in-flight record scoping and re-arm timing the delivery loop uses.
///
/// The two variants have genuinely different concurrency and recovery
/// trade-offs, so the choice is explicit configuration rather than an
/// implementation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// One in-flight record per consumer identity, shared by restarts.
    /// The loop re-arms right after dispatch and leftover entries are
    /// replayed on startup. Only one running instance per identity is safe.
    #[default]
    SharedRecoverable,
    /// One in-flight record per running process, scoped by an instance
    /// tag. The loop re-arms only after acknowledgment, giving natural
    /// backpressure and safe concurrent instances; a crashed instance's
    /// record is orphaned and not replayed.
    PerInstance,
}

/// Delivery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Delivery policy
    pub policy: DeliveryPolicy,
    /// TTL applied to stored message payloads; `None` disables expiry
    pub message_ttl: Option<Duration>,
    /// Retry policy for transient store faults
    pub retry: RetryPolicy,
}

/// Retry policy for transient store faults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts; `None` retries indefinitely
    pub max_attempts: Option<u32>,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Exponential backoff multiplier
    pub multiplier: f64,
    /// Upper bound on the backoff delay
    pub max_delay: Duration,
    /// Add jitter to avoid thundering herd
    pub jitter: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Some(Duration::from_secs(5)),
            command_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            policy: DeliveryPolicy::default(),
            message_ttl: Some(Duration::from_secs(60 * 60 * 24)),
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never gives up, for operations whose loss would leak
    /// a message (the read-counter decrement)
    pub fn unbounded(mut self) -> Self {
        self.max_attempts = None;
        self
    }
}

impl Config {
    /// Create a configuration with the given identity and defaults elsewhere
    pub fn new(identity: impl Into<String>) -> Self {
        Self::default().identity(identity)
    }

    /// Load configuration from default sources
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &str) -> Result<Self> {
        ConfigLoader::new().with_file(path).load()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.identity.is_empty() {
            return Err(ConfigError::validation("identity is required"));
        }
        self.validate_redis()?;
        self.validate_retry()?;
        Ok(())
    }

    fn validate_redis(&self) -> Result<()> {
        if self.redis.url.is_empty() {
            return Err(ConfigError::validation("Redis URL cannot be empty"));
        }

        url::Url::parse(&self.redis.url)
            .map_err(|e| ConfigError::validation(format!("Invalid Redis URL: {e}")))?;

        Ok(())
    }

    fn validate_retry(&self) -> Result<()> {
        let retry = &self.delivery.retry;
        if retry.multiplier < 1.0 {
            return Err(ConfigError::validation("Retry multiplier must be >= 1.0"));
        }
        if retry.initial_delay > retry.max_delay {
            return Err(ConfigError::validation(
                "Retry initial_delay must not exceed max_delay",
            ));
        }
        if retry.max_attempts == Some(0) {
            return Err(ConfigError::validation(
                "Retry max_attempts must be > 0 when bounded",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_default() {
        let actual = Config::default();
        assert_eq!(actual.identity, "");
        assert_eq!(actual.redis.url, "redis://localhost:6379");
        assert_eq!(actual.delivery.policy, DeliveryPolicy::SharedRecoverable);
    }

    #[test]
    fn test_redis_config_default() {
        let actual = RedisConfig::default();
        let expected = RedisConfig {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Some(Duration::from_secs(5)),
            command_timeout: Some(Duration::from_secs(30)),
        };
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_delivery_config_default() {
        let actual = DeliveryConfig::default();
        assert_eq!(actual.policy, DeliveryPolicy::SharedRecoverable);
        assert_eq!(actual.message_ttl, Some(Duration::from_secs(86400)));
    }

    #[test]
    fn test_retry_policy_default() {
        let actual = RetryPolicy::default();
        assert_eq!(actual.max_attempts, Some(5));
        assert_eq!(actual.initial_delay, Duration::from_millis(100));
        assert_eq!(actual.multiplier, 2.0);
        assert_eq!(actual.max_delay, Duration::from_secs(30));
        assert!(actual.jitter);
    }

    #[test]
    fn test_retry_policy_unbounded() {
        let actual = RetryPolicy::default().unbounded();
        assert_eq!(actual.max_attempts, None);
    }

    #[test]
    fn test_config_setters() {
        let actual = Config::new("order-service")
            .redis(RedisConfig::default().url("redis://cache:6379"))
            .delivery(DeliveryConfig::default().policy(DeliveryPolicy::PerInstance));

        assert_eq!(actual.identity, "order-service");
        assert_eq!(actual.redis.url, "redis://cache:6379");
        assert_eq!(actual.delivery.policy, DeliveryPolicy::PerInstance);
    }

    #[test]
    fn test_config_validation_success() {
        let fixture = Config::new("order-service");
        let actual = fixture.validate();
        assert!(actual.is_ok());
    }

    #[test]
    fn test_config_validation_missing_identity() {
        let fixture = Config::default();
        let actual = fixture.validate();
        assert!(actual.is_err());
    }

    #[test]
    fn test_config_validation_invalid_redis_url() {
        let fixture = Config::new("a").redis(RedisConfig::default().url("not a url"));
        let actual = fixture.validate();
        assert!(actual.is_err());
    }

    #[test]
    fn test_config_validation_bad_multiplier() {
        let fixture = Config::new("a").delivery(
            DeliveryConfig::default().retry(RetryPolicy::default().multiplier(0.5)),
        );
        let actual = fixture.validate();
        assert!(actual.is_err());
    }

    #[test]
    fn test_delivery_policy_serialization() {
        let actual = serde_json::to_string(&DeliveryPolicy::PerInstance);
        assert!(actual.is_ok());
        assert_eq!(actual.unwrap(), "\"per_instance\"");
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let fixture = Config::new("order-service");
        let serialized = toml::to_string(&fixture).unwrap();
        let actual: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(actual, fixture);
    }
}
