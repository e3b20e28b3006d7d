//! Outbound heartbeat scheduling.
//!
//! Only self-initiated pings live here. Echoing a peer ping back as a pong
//! is the dispatcher's job and keeps working while self-pings are disabled.

use std::time::{Duration, Instant};

/// Quiet period between self-initiated pings.
pub const PING_INTERVAL: Duration = Duration::from_millis(20_000);

/// Tracks when the next self-initiated ping is owed.
///
/// The caller supplies the current instant, so ticks can run against a
/// simulated clock.
#[derive(Debug)]
pub struct Heartbeat {
    last_ping: Instant,
    enabled: bool,
}

impl Heartbeat {
    /// Creates an enabled heartbeat with the quiet period starting at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            last_ping: now,
            enabled: true,
        }
    }

    /// Enables or disables self-initiated pings.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Restarts the quiet period, typically on a fresh connection.
    pub fn reset(&mut self, now: Instant) {
        self.last_ping = now;
    }

    /// Returns true when a ping is owed, restarting the quiet period.
    ///
    /// A ping is owed strictly after [`PING_INTERVAL`] has elapsed since the
    /// last owed ping (or the last reset). Disabled heartbeats never owe one.
    pub fn ping_due(&mut self, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        if now.duration_since(self.last_ping) > PING_INTERVAL {
            self.last_ping = now;
            return true;
        }
        false
    }
}
