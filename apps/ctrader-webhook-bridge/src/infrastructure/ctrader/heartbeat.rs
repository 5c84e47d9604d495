//! Heartbeat Monitor
//!
//! cTrader expects a client heartbeat (payload type 51) at least every
//! 25 seconds on an idle connection, and sends its own. The monitor decides
//! when to send one and when prolonged inbound silence means the transport
//! is dead. It holds no timers; the session manager polls it on a tick.

use std::time::{Duration, Instant};

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between outbound heartbeats.
    pub interval: Duration,
    /// Inbound silence after which the connection is considered dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Create configuration from `SessionSettings`.
    #[must_use]
    pub const fn from_session_settings(settings: &crate::SessionSettings) -> Self {
        Self {
            interval: settings.heartbeat_interval,
            timeout: settings.heartbeat_timeout,
        }
    }
}

/// What the session should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing due.
    Idle,
    /// Send a heartbeat now.
    SendHeartbeat,
    /// Inbound silence exceeded the timeout.
    Timeout,
}

/// Tracks inbound and outbound traffic for one connection.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    last_inbound: Instant,
    last_outbound: Instant,
}

impl HeartbeatMonitor {
    /// Create a monitor for a connection opened at `now`.
    #[must_use]
    pub const fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            last_inbound: now,
            last_outbound: now,
        }
    }

    /// Heartbeat configuration.
    #[must_use]
    pub const fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Reset for a new connection.
    pub const fn reset(&mut self, now: Instant) {
        self.last_inbound = now;
        self.last_outbound = now;
    }

    /// Any inbound message proves the connection alive.
    pub const fn record_inbound(&mut self, now: Instant) {
        self.last_inbound = now;
    }

    /// Any outbound message counts as a heartbeat for the broker.
    pub const fn record_outbound(&mut self, now: Instant) {
        self.last_outbound = now;
    }

    /// Time since the last inbound message.
    #[must_use]
    pub fn since_inbound(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_inbound)
    }

    /// Decide what is due at `now`.
    #[must_use]
    pub fn check(&self, now: Instant) -> HeartbeatAction {
        if self.since_inbound(now) > self.config.timeout {
            HeartbeatAction::Timeout
        } else if now.saturating_duration_since(self.last_outbound) >= self.config.interval {
            HeartbeatAction::SendHeartbeat
        } else {
            HeartbeatAction::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(start: Instant) -> HeartbeatMonitor {
        HeartbeatMonitor::new(
            HeartbeatConfig::new(Duration::from_secs(10), Duration::from_secs(30)),
            start,
        )
    }

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn idle_right_after_connect() {
        let start = Instant::now();
        assert_eq!(monitor(start).check(start), HeartbeatAction::Idle);
    }

    #[test]
    fn heartbeat_due_after_interval() {
        let start = Instant::now();
        let mut monitor = monitor(start);
        let later = start + Duration::from_secs(10);
        assert_eq!(monitor.check(later), HeartbeatAction::SendHeartbeat);

        monitor.record_outbound(later);
        assert_eq!(monitor.check(later), HeartbeatAction::Idle);
    }

    #[test]
    fn silence_beyond_timeout_is_fatal() {
        let start = Instant::now();
        let mut monitor = monitor(start);
        monitor.record_outbound(start + Duration::from_secs(25));

        assert_eq!(
            monitor.check(start + Duration::from_secs(30)),
            HeartbeatAction::Idle
        );
        assert_eq!(
            monitor.check(start + Duration::from_secs(31)),
            HeartbeatAction::Timeout
        );
    }

    #[test]
    fn inbound_traffic_keeps_connection_alive() {
        let start = Instant::now();
        let mut monitor = monitor(start);
        monitor.record_inbound(start + Duration::from_secs(20));
        monitor.record_outbound(start + Duration::from_secs(40));

        assert_eq!(
            monitor.check(start + Duration::from_secs(45)),
            HeartbeatAction::Idle
        );
        assert_eq!(
            monitor.since_inbound(start + Duration::from_secs(45)),
            Duration::from_secs(25)
        );
    }

    #[test]
    fn reset_clears_silence() {
        let start = Instant::now();
        let mut monitor = monitor(start);
        let later = start + Duration::from_secs(60);
        assert_eq!(monitor.check(later), HeartbeatAction::Timeout);

        monitor.reset(later);
        assert_eq!(monitor.check(later), HeartbeatAction::Idle);
    }
}
