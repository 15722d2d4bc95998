//! Partition handler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shardline_messaging::ChannelName;

use crate::error::{PartitionError, Result};

/// Smallest delay honoured between two polling rounds.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Immutable configuration for a [`PartitionHandler`](crate::PartitionHandler).
///
/// Durations are written in milliseconds when (de)serialized:
///
/// ```json
/// { "grid_size": 4, "step_name": "worker", "poll_interval_ms": 500, "timeout_ms": 60000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Number of partitions requested from the splitter
    pub grid_size: usize,

    /// Delay between polling rounds (polling mode only)
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,

    /// Bound from the end of dispatch to full aggregation
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,

    /// Remote step each dispatched child should run
    pub step_name: String,

    /// Channel to receive replies on; the gateway default when unset
    pub reply_channel: Option<ChannelName>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            grid_size: 1,
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(300), // 5 minutes
            step_name: String::new(),
            reply_channel: None,
        }
    }
}

impl HandlerConfig {
    /// Create a configuration for `step_name` with default settings.
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PartitionError::InvalidConfig(e.to_string()))
    }

    /// Set the partition count.
    pub fn with_grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size;
        self
    }

    /// Set the polling interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the overall timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the reply channel.
    pub fn with_reply_channel(mut self, channel: ChannelName) -> Self {
        self.reply_channel = Some(channel);
        self
    }

    /// Polling interval clamped to [`MIN_POLL_INTERVAL`].
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }

    /// Reject configurations the handler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.step_name.trim().is_empty() {
            return Err(PartitionError::InvalidConfig(
                "step_name must not be empty".to_string(),
            ));
        }
        if self.grid_size == 0 {
            return Err(PartitionError::InvalidConfig(
                "grid_size must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(PartitionError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HandlerConfig::default();
        assert_eq!(config.grid_size, 1);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert!(config.reply_channel.is_none());
    }

    #[test]
    fn test_validate_requires_step_name() {
        let err = HandlerConfig::default().validate().unwrap_err();
        assert!(matches!(err, PartitionError::InvalidConfig(_)));
        assert!(HandlerConfig::new("step1").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_grid_and_timeout() {
        assert!(HandlerConfig::new("step1").with_grid_size(0).validate().is_err());
        assert!(HandlerConfig::new("step1")
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_poll_interval_is_clamped() {
        let config = HandlerConfig::new("step1").with_poll_interval(Duration::ZERO);
        assert_eq!(config.effective_poll_interval(), MIN_POLL_INTERVAL);

        let config = HandlerConfig::new("step1").with_poll_interval(Duration::from_millis(500));
        assert_eq!(config.effective_poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_from_json_uses_millis_and_defaults() {
        let config = HandlerConfig::from_json_str(
            r#"{"step_name":"worker","grid_size":4,"timeout_ms":1000,"reply_channel":"out"}"#,
        )
        .unwrap();

        assert_eq!(config.step_name, "worker");
        assert_eq!(config.grid_size, 4);
        assert_eq!(config.timeout, Duration::from_millis(1000));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.reply_channel, Some(ChannelName::new("out")));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        let err = HandlerConfig::from_json_str("{\"grid_size\": \"many\"}").unwrap_err();
        assert!(matches!(err, PartitionError::InvalidConfig(_)));
    }
}
