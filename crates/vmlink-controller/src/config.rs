//! Controller configuration.
//!
//! Every duration is (de)serialized as whole milliseconds. Missing fields fall
//! back to the board defaults, so an empty JSON object is a valid config:
//!
//! ```json
//! {
//!   "timeouts": {
//!     "default_timeout_ms": 3000,
//!     "dispense_timeout_ms": 120000,
//!     "check_timeout_ms": 30000,
//!     "firmware_max_retries": 10
//!   },
//!   "sync_exchange": {
//!     "first_wait_ms": 3000,
//!     "poll_interval_ms": 100,
//!     "poll_budget": 30
//!   },
//!   "service": {
//!     "poll_interval_ms": 10,
//!     "event_capacity": 100,
//!     "request_capacity": 16
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vmlink_core::constants::{
    CHECK_TIMEOUT_MS, DEFAULT_RECEIVE_TIMEOUT_MS, DISPENSE_TIMEOUT_MS, FIRMWARE_MAX_RETRIES,
    MAX_TIMEOUT_MS, SYNC_FIRST_WAIT_MS, SYNC_POLL_BUDGET, SYNC_POLL_INTERVAL_MS,
};
use vmlink_core::{Error, Result};
use vmlink_protocol::TimeoutClass;

/// Longest timeout the controller accepts.
///
/// Deadlines are computed as `now + timeout`, so every configured duration
/// must stay well inside the range of an [`Instant`](tokio::time::Instant).
pub const MAX_TIMEOUT: Duration = Duration::from_millis(MAX_TIMEOUT_MS);

/// Reply deadlines and the silent firmware retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
    /// Deadline for single-shot replies.
    #[serde(rename = "default_timeout_ms", with = "duration_ms")]
    pub default_timeout: Duration,

    /// Deadline while the board completes a mechanical dispense phase.
    #[serde(rename = "dispense_timeout_ms", with = "duration_ms")]
    pub dispense_timeout: Duration,

    /// Deadline for explicitly requested cargo and door checks.
    #[serde(rename = "check_timeout_ms", with = "duration_ms")]
    pub check_timeout: Duration,

    /// Number of silent firmware information retries.
    pub firmware_max_retries: u32,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(DEFAULT_RECEIVE_TIMEOUT_MS),
            dispense_timeout: Duration::from_millis(DISPENSE_TIMEOUT_MS),
            check_timeout: Duration::from_millis(CHECK_TIMEOUT_MS),
            firmware_max_retries: FIRMWARE_MAX_RETRIES,
        }
    }
}

impl TimeoutPolicy {
    /// Duration of a deadline of the given class.
    pub fn duration(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Default => self.default_timeout,
            TimeoutClass::Dispense => self.dispense_timeout,
            TimeoutClass::Check => self.check_timeout,
        }
    }
}

/// Poll schedule of the blocking compressor exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncExchangeConfig {
    /// Wait for the first bytes of the reply.
    #[serde(rename = "first_wait_ms", with = "duration_ms")]
    pub first_wait: Duration,

    /// Wait of each follow-up poll.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,

    /// Maximum number of follow-up polls.
    pub poll_budget: u32,
}

impl Default for SyncExchangeConfig {
    fn default() -> Self {
        Self {
            first_wait: Duration::from_millis(SYNC_FIRST_WAIT_MS),
            poll_interval: Duration::from_millis(SYNC_POLL_INTERVAL_MS),
            poll_budget: SYNC_POLL_BUDGET,
        }
    }
}

/// Settings of the async link service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// How often the transport is checked for new bytes.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,

    /// Capacity of the event channel.
    pub event_capacity: usize,

    /// Capacity of the request channel.
    pub request_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            event_capacity: 100,
            request_capacity: 16,
        }
    }
}

/// Complete controller configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub timeouts: TimeoutPolicy,
    pub sync_exchange: SyncExchangeConfig,
    pub service: ServiceConfig,
}

impl ControllerConfig {
    /// Parse a JSON config and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid controller config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Reject settings the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("default_timeout_ms", self.timeouts.default_timeout),
            ("dispense_timeout_ms", self.timeouts.dispense_timeout),
            ("check_timeout_ms", self.timeouts.check_timeout),
            ("sync_exchange.first_wait_ms", self.sync_exchange.first_wait),
            ("sync_exchange.poll_interval_ms", self.sync_exchange.poll_interval),
            ("service.poll_interval_ms", self.service.poll_interval),
        ];
        for (name, value) in checks {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be positive")));
            }
            if value > MAX_TIMEOUT {
                return Err(Error::Config(format!(
                    "{name} must not exceed {MAX_TIMEOUT_MS}ms"
                )));
            }
        }

        if self.service.event_capacity == 0 || self.service.request_capacity == 0 {
            return Err(Error::Config("channel capacities must be positive".into()));
        }
        Ok(())
    }
}

/// Serde helper for durations stored as milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
