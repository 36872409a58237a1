use crate::error::{Error, Result};
use std::time::Duration;

/// Time allowed for the peer to answer a ping before it is presumed dead.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);
/// Keepalive pings go out at this fraction of the pong wait.
pub const PING_PERIOD_RATIO: f64 = 0.9;
/// Time allowed for a single frame write.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);
/// Largest frame accepted from a peer.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512;
/// Depth of each connection's outbound queue and of each topic buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 256;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Timing and sizing parameters for the hub and its connections.
#[derive(Clone, Debug, PartialEq)]
pub struct HubConfig {
    /// Liveness window: a connection is evicted if no pong arrives within it.
    pub pong_wait: Duration,
    /// Keepalive ping period; must be strictly shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Per-write deadline for every frame sent to a peer.
    pub write_wait: Duration,
    pub max_message_size: usize,
    /// Outbound queue depth per connection; overflowing it evicts the connection.
    pub buffer_size: usize,
    /// Publish buffer depth per topic; overflowing it rejects the publish.
    pub topic_buffer_size: usize,
    /// How often the hub sweeps the registry for expired liveness deadlines.
    pub sweep_interval: Duration,
    /// How long a cooperative shutdown waits for connections to drain.
    pub shutdown_grace: Duration,
}

impl HubConfig {
    /// Builds a config around `pong_wait`, deriving the ping period from it.
    pub fn with_pong_wait(pong_wait: Duration) -> Self {
        Self {
            pong_wait,
            ping_period: pong_wait.mul_f64(PING_PERIOD_RATIO),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("pong wait", self.pong_wait),
            ("ping period", self.ping_period),
            ("write wait", self.write_wait),
            ("sweep interval", self.sweep_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(Error::InvalidConfig(format!("{name} must be non-zero")));
            }
        }

        if self.ping_period >= self.pong_wait {
            return Err(Error::InvalidConfig(format!(
                "ping period ({:?}) must be shorter than pong wait ({:?})",
                self.ping_period, self.pong_wait
            )));
        }

        let sizes = [
            ("max message size", self.max_message_size),
            ("buffer size", self.buffer_size),
            ("topic buffer size", self.topic_buffer_size),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be non-zero")));
            }
        }

        Ok(())
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            pong_wait: DEFAULT_PONG_WAIT,
            ping_period: DEFAULT_PONG_WAIT.mul_f64(PING_PERIOD_RATIO),
            write_wait: DEFAULT_WRITE_WAIT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            topic_buffer_size: DEFAULT_BUFFER_SIZE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = HubConfig::default();
        assert_eq!(config.pong_wait, Duration::from_secs(60));
        assert_eq!(config.ping_period, Duration::from_secs(54));
        assert_eq!(config.write_wait, Duration::from_secs(10));
        assert_eq!(config.max_message_size, 512);
        assert_eq!(config.buffer_size, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ping_period_equal_to_pong_wait_is_rejected() {
        let config = HubConfig {
            ping_period: Duration::from_secs(60),
            ..HubConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn ping_period_longer_than_pong_wait_is_rejected() {
        let config = HubConfig {
            ping_period: Duration::from_secs(90),
            ..HubConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn derived_ping_period_is_always_shorter() {
        for secs in [1, 2, 10, 60, 3600] {
            let config = HubConfig::with_pong_wait(Duration::from_secs(secs));
            assert!(config.ping_period < config.pong_wait);
            assert!(config.validate().is_ok(), "pong wait {secs}s");
        }
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let config = HubConfig {
            buffer_size: 0,
            ..HubConfig::default()
        };
        assert!(config.validate().is_err());

        let config = HubConfig {
            topic_buffer_size: 0,
            ..HubConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
