//! Inactivity watchdog.
//!
//! Counts time since the last meaningful user activity (a stick moved, a
//! parameter was requested). Packet delivery alone does not count. Once the
//! ceiling passes it asks for power-down; it never touches link state.

use tracing::warn;

#[derive(Debug, Clone)]
pub struct InactivityWatchdog {
    ceiling_ms: u64,
    last_activity_ms: u64,
    tripped: bool,
}

impl InactivityWatchdog {
    pub fn new(ceiling_ms: u64, now_ms: u64) -> Self {
        Self {
            ceiling_ms,
            last_activity_ms: now_ms,
            tripped: false,
        }
    }

    /// Restart the countdown
    pub fn note_activity(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
        self.tripped = false;
    }

    /// Milliseconds since the last activity
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_ms)
    }

    /// True once idle time exceeds the ceiling; logs the first time only
    pub fn check(&mut self, now_ms: u64) -> bool {
        let expired = self.idle_ms(now_ms) > self.ceiling_ms;
        if expired && !self.tripped {
            self.tripped = true;
            warn!(
                "No activity for {} s, requesting power-down",
                self.idle_ms(now_ms) / 1000
            );
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEN_MINUTES: u64 = 10 * 60 * 1000;

    #[test]
    fn test_trips_after_ceiling() {
        let mut watchdog = InactivityWatchdog::new(TEN_MINUTES, 0);
        assert!(!watchdog.check(TEN_MINUTES));
        assert!(watchdog.check(TEN_MINUTES + 1));
        // Stays tripped
        assert!(watchdog.check(TEN_MINUTES + 500));
    }

    #[test]
    fn test_activity_restarts_countdown() {
        let mut watchdog = InactivityWatchdog::new(TEN_MINUTES, 0);
        watchdog.note_activity(TEN_MINUTES - 1);
        assert!(!watchdog.check(TEN_MINUTES + 1000));
        assert_eq!(watchdog.idle_ms(TEN_MINUTES + 1000), 1001);
        assert!(watchdog.check(2 * TEN_MINUTES));
    }

    #[test]
    fn test_activity_clears_trip() {
        let mut watchdog = InactivityWatchdog::new(1000, 0);
        assert!(watchdog.check(2000));
        watchdog.note_activity(2000);
        assert!(!watchdog.check(2500));
    }
}
