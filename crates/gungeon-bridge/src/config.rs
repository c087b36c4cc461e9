//! Bridge configuration and reconnect policy.

use std::time::Duration;

use gungeon_protocol::DEFAULT_MAX_FRAME_BYTES;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default producer port, matching the game-side plugin.
pub const DEFAULT_PORT: u16 = 18475;

// ---------------------------------------------------------------------------
// ReconnectPolicy
// ---------------------------------------------------------------------------

/// How long to wait before the next connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReconnectPolicy {
    /// Same delay after every failure.
    /// The producer is a local game process, so this is usually enough.
    Fixed {
        /// Delay between attempts.
        delay: Duration,
    },
    /// Doubling delay, capped at `max`, reset after a successful connect.
    Exponential {
        /// Delay after the first failure.
        initial: Duration,
        /// Upper bound on the base delay.
        max: Duration,
        /// Up to this much random extra delay is added to each wait.
        jitter: Duration,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed {
            delay: Duration::from_secs(1),
        }
    }
}

impl ReconnectPolicy {
    /// Lower bound on any retry delay so the worker never spins.
    pub const MIN_DELAY: Duration = Duration::from_millis(10);

    /// Delay before retry number `attempt` (0 = first retry after a failure).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = match *self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                initial,
                max,
                jitter,
            } => {
                let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                let backoff = initial.saturating_mul(factor).min(max);
                let extra = if jitter.is_zero() {
                    Duration::ZERO
                } else {
                    let us = rand::rng().random_range(0..=jitter.as_micros() as u64);
                    Duration::from_micros(us)
                };
                backoff + extra
            }
        };
        base.max(Self::MIN_DELAY)
    }
}

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Bridge`](crate::Bridge).
///
/// Every field has a default that matches the game-side plugin; override
/// only what you need:
///
/// ```rust
/// use std::time::Duration;
/// use gungeon_bridge::BridgeConfig;
///
/// let config = BridgeConfig {
///     port: 19000,
///     queue_capacity: 16,
///     ..BridgeConfig::default()
/// }
/// .with_read_timeout(Duration::from_millis(500));
/// assert_eq!(config.addr(), "127.0.0.1:19000");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Producer host.
    pub host: String,

    /// Producer TCP port.
    pub port: u16,

    /// Upper bound on a single connection attempt.
    pub connect_timeout: Duration,

    /// A read that sees no bytes for this long drops the connection.
    /// Also bounds how long [`Bridge::close`](crate::Bridge::close) can
    /// wait on a stuck worker.
    pub read_timeout: Duration,

    /// Delay curve between connection attempts.
    pub reconnect: ReconnectPolicy,

    /// Snapshots held for consumers before the oldest is dropped.
    pub queue_capacity: usize,

    /// Size cap for one frame. `None` trusts the producer completely.
    pub max_frame_bytes: Option<usize>,

    /// How long `close()` waits for the worker thread to exit.
    pub join_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            reconnect: ReconnectPolicy::default(),
            queue_capacity: 128,
            max_frame_bytes: Some(DEFAULT_MAX_FRAME_BYTES),
            join_timeout: Duration::from_secs(1),
        }
    }
}

impl BridgeConfig {
    /// Smallest timeout accepted for connect and read.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(10);

    /// Config pointing at a specific producer, defaults otherwise.
    pub fn with_addr(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Sets the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the reconnect policy.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// `host:port`, for connecting and logging.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`Bridge::new`](crate::Bridge::new) and
    /// [`ConnectionManager::new`](crate::ConnectionManager::new). A validated
    /// config passes through unchanged. Rules:
    /// - `queue_capacity` of 0 becomes 1.
    /// - Timeouts are raised to [`Self::MIN_TIMEOUT`].
    /// - A `max_frame_bytes` of `Some(0)` disables the cap.
    pub fn validated(mut self) -> Self {
        if self.queue_capacity == 0 {
            warn!("queue_capacity of 0 is not allowed, using 1");
            self.queue_capacity = 1;
        }
        for (name, timeout) in [
            ("connect_timeout", &mut self.connect_timeout),
            ("read_timeout", &mut self.read_timeout),
        ] {
            if *timeout < Self::MIN_TIMEOUT {
                warn!(field = name, value = ?timeout, "timeout too small, clamping");
                *timeout = Self::MIN_TIMEOUT;
            }
        }
        if self.max_frame_bytes == Some(0) {
            self.max_frame_bytes = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:18475");
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        assert_eq!(config.queue_capacity, 128);
        assert_eq!(config.join_timeout, Duration::from_secs(1));
        assert_eq!(
            config.reconnect,
            ReconnectPolicy::Fixed {
                delay: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn test_validated_clamps_bad_values() {
        let config = BridgeConfig {
            queue_capacity: 0,
            read_timeout: Duration::ZERO,
            max_frame_bytes: Some(0),
            ..Default::default()
        }
        .validated();
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.read_timeout, BridgeConfig::MIN_TIMEOUT);
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.max_frame_bytes, None);
    }

    #[test]
    fn test_validated_is_a_fixed_point() {
        let once = BridgeConfig {
            queue_capacity: 0,
            connect_timeout: Duration::from_millis(1),
            ..Default::default()
        }
        .validated();
        assert_eq!(once.clone().validated(), once);
    }

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = ReconnectPolicy::Fixed {
            delay: Duration::from_millis(250),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(250));
        assert_eq!(policy.delay(50), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_delay_is_floored() {
        let policy = ReconnectPolicy::Fixed {
            delay: Duration::ZERO,
        };
        assert_eq!(policy.delay(0), ReconnectPolicy::MIN_DELAY);
    }

    #[test]
    fn test_exponential_delay_doubles_and_caps() {
        let policy = ReconnectPolicy::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        assert_eq!(policy.delay(4), Duration::from_secs(1));
        assert_eq!(policy.delay(1_000), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_jitter_is_bounded() {
        let policy = ReconnectPolicy::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: Duration::from_millis(50),
        };
        for _ in 0..100 {
            let d = policy.delay(0);
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{ "port": 20000, "queue_capacity": 8 }"#).unwrap();
        assert_eq!(config.port, 20000);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.host, "127.0.0.1");
    }
}
