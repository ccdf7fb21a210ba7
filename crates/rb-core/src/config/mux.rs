//! Multiplexer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use rb_protocol::{MAX_MESSAGE_SIZE, SESSION_ID_SIZE};

use crate::error::ConfigError;

/// Tuning for one tunnel's multiplexing engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Capacity of the control (session close) queue.
    ///
    /// Close messages are tiny and rare, so this only needs to cover a burst
    /// of sessions closing at once.
    pub control_queue_capacity: usize,

    /// Capacity of the data queue; producers block when it is full
    pub data_queue_capacity: usize,

    /// Bytes read from a downstream socket per data message
    pub read_buffer_size: usize,

    /// Largest encoded message the transport accepts
    pub max_message_size: usize,

    /// How long shutdown waits for forward tasks to exit, in seconds.
    ///
    /// Fractions are allowed: `shutdown_grace = 0.5`.
    #[serde(with = "grace_secs")]
    pub shutdown_grace: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            control_queue_capacity: 4096,
            data_queue_capacity: 16384,
            read_buffer_size: 32 * 1024,
            max_message_size: MAX_MESSAGE_SIZE,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl MuxConfig {
    /// Check that the values can drive a multiplexer
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "control_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.data_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "data_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.max_message_size > u32::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "max_message_size {} exceeds the 4-byte length prefix",
                self.max_message_size
            )));
        }
        if self.read_buffer_size + SESSION_ID_SIZE > self.max_message_size {
            return Err(ConfigError::Invalid(format!(
                "read_buffer_size {} does not fit in max_message_size {}",
                self.read_buffer_size, self.max_message_size
            )));
        }
        Ok(())
    }
}

/// `shutdown_grace` as (possibly fractional) seconds
mod grace_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(grace: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(grace.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| de::Error::custom(format!("invalid shutdown_grace: {}", secs)))
    }
}
