//! Hub and connection configuration.

use std::time::Duration;

/// Shortest `pong_wait` accepted by [`HubConfig::validated`].
pub const MIN_PONG_WAIT: Duration = Duration::from_millis(10);

/// Shortest `write_wait` and `ping_period` accepted by
/// [`HubConfig::validated`].
pub const MIN_TIMING: Duration = Duration::from_millis(1);

/// Tuning for the hub and the per-connection pumps.
///
/// The defaults match what browser clients are built against; tests
/// shrink the timings.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each connection's outbound queue. A connection whose
    /// queue is full when a broadcast arrives is disconnected.
    pub send_buffer: usize,

    /// Deadline for writing one frame to a client.
    pub write_wait: Duration,

    /// How long a connection may stay silent (no data, no pong) before
    /// it is considered dead.
    pub pong_wait: Duration,

    /// Interval between liveness pings. Must be shorter than
    /// `pong_wait`.
    pub ping_period: Duration,

    /// Largest client frame accepted, in bytes.
    pub max_message_size: usize,

    /// Text sent in `room_closed` when the host disconnects.
    pub host_left_message: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            send_buffer: 256,
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size: 512,
            host_left_message: "The host has left, so the room has been closed."
                .to_string(),
        }
    }
}

impl HubConfig {
    /// Returns a copy safe to run with: timings are raised to their
    /// minimums and `ping_period` is pulled under `pong_wait` if it was
    /// configured at or above it.
    pub fn validated(mut self) -> Self {
        if self.pong_wait < MIN_PONG_WAIT {
            tracing::warn!(pong_wait = ?self.pong_wait, "pong_wait too short, clamping");
            self.pong_wait = MIN_PONG_WAIT;
        }
        if self.write_wait < MIN_TIMING {
            tracing::warn!(write_wait = ?self.write_wait, "write_wait too short, clamping");
            self.write_wait = MIN_TIMING;
        }
        self.ping_period = self.ping_period.max(MIN_TIMING);
        if self.ping_period >= self.pong_wait {
            tracing::warn!(
                ping_period = ?self.ping_period,
                pong_wait = ?self.pong_wait,
                "ping_period must be below pong_wait, clamping"
            );
            self.ping_period = self.pong_wait * 9 / 10;
        }
        if self.send_buffer == 0 {
            self.send_buffer = 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = HubConfig::default();
        assert_eq!(config.send_buffer, 256);
        assert_eq!(config.write_wait, Duration::from_secs(10));
        assert_eq!(config.pong_wait, Duration::from_secs(60));
        assert_eq!(config.ping_period, Duration::from_secs(54));
        assert_eq!(config.max_message_size, 512);
    }

    #[test]
    fn test_validated_clamps_ping_period() {
        let config = HubConfig {
            ping_period: Duration::from_secs(90),
            send_buffer: 0,
            ..HubConfig::default()
        }
        .validated();
        assert_eq!(config.ping_period, Duration::from_secs(54));
        assert_eq!(config.send_buffer, 1);
    }

    #[test]
    fn test_validated_raises_zero_timings() {
        let config = HubConfig {
            write_wait: Duration::ZERO,
            pong_wait: Duration::ZERO,
            ping_period: Duration::ZERO,
            ..HubConfig::default()
        }
        .validated();
        assert_eq!(config.pong_wait, MIN_PONG_WAIT);
        assert_eq!(config.write_wait, MIN_TIMING);
        assert!(config.ping_period >= MIN_TIMING);
        assert!(config.ping_period < config.pong_wait);
    }

    #[test]
    fn test_validated_near_zero_ping_period_stays_positive() {
        let config = HubConfig {
            pong_wait: Duration::from_nanos(1),
            ping_period: Duration::from_nanos(1),
            ..HubConfig::default()
        }
        .validated();
        assert_eq!(config.pong_wait, MIN_PONG_WAIT);
        assert_eq!(config.ping_period, MIN_TIMING);
    }
}
