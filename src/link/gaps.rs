//! # Gap / Quality Tracker
//!
//! Rolling success rate over the last [`PACKET_HISTORY_LEN`] packets, plus
//! statistics on gaps: runs of lost packets between two deliveries.
//!
//! A gap is measured from the last delivery before it (or from its first
//! failure when nothing was ever delivered) to the delivery that ends it.
//! Statistics only grow until [`GapTracker::reset`].

use serde::Serialize;

/// Packets kept for the rolling success rate
pub const PACKET_HISTORY_LEN: usize = 200;

/// Ring buffer of per-packet outcomes
#[derive(Debug, Clone)]
pub struct PacketHistory {
    outcomes: [bool; PACKET_HISTORY_LEN],
    next: usize,
    filled: usize,
    successes: usize,
}

impl Default for PacketHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketHistory {
    pub fn new() -> Self {
        Self {
            outcomes: [false; PACKET_HISTORY_LEN],
            next: 0,
            filled: 0,
            successes: 0,
        }
    }

    /// Record one outcome, evicting the oldest when full
    pub fn record(&mut self, delivered: bool) {
        if self.filled == PACKET_HISTORY_LEN {
            if self.outcomes[self.next] {
                self.successes -= 1;
            }
        } else {
            self.filled += 1;
        }

        self.outcomes[self.next] = delivered;
        if delivered {
            self.successes += 1;
        }
        self.next = (self.next + 1) % PACKET_HISTORY_LEN;
    }

    /// Outcomes currently held
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Delivered share of the window, 0-100 (0 with no history)
    pub fn success_percent(&self) -> u8 {
        if self.filled == 0 {
            return 0;
        }
        ((self.successes * 100) / self.filled) as u8
    }
}

/// Accumulated gap statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GapStats {
    /// Longest closed gap (ms)
    pub longest_ms: u64,
    /// Mean closed gap (ms)
    pub average_ms: u64,
    /// Sum of all closed gaps (ms)
    pub total_ms: u64,
    /// Closed gaps
    pub count: u64,
    pub lost_packets: u64,
    pub good_packets: u64,
}

/// Success history and gap accounting
#[derive(Debug, Clone, Default)]
pub struct GapTracker {
    history: PacketHistory,
    stats: GapStats,
    last_success_ms: Option<u64>,
    gap_started_ms: Option<u64>,
}

impl GapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A packet was delivered at `now_ms`; closes any open gap
    pub fn record_success(&mut self, now_ms: u64) {
        self.history.record(true);
        self.stats.good_packets += 1;

        if let Some(started) = self.gap_started_ms.take() {
            let duration = now_ms.saturating_sub(started);
            self.stats.count += 1;
            self.stats.total_ms += duration;
            self.stats.longest_ms = self.stats.longest_ms.max(duration);
            self.stats.average_ms = self.stats.total_ms / self.stats.count;
        }

        self.last_success_ms = Some(now_ms);
    }

    /// A packet was lost at `now_ms`; opens a gap if none is open
    pub fn record_failure(&mut self, now_ms: u64) {
        self.history.record(false);
        self.stats.lost_packets += 1;

        if self.gap_started_ms.is_none() {
            self.gap_started_ms = Some(self.last_success_ms.unwrap_or(now_ms));
        }
    }

    /// Length of the gap in progress, 0 when connected
    pub fn current_gap_ms(&self, now_ms: u64) -> u64 {
        self.gap_started_ms
            .map(|started| now_ms.saturating_sub(started))
            .unwrap_or(0)
    }

    /// Whether a gap is open
    pub fn in_gap(&self) -> bool {
        self.gap_started_ms.is_some()
    }

    /// Rolling success rate, 0-100
    pub fn quality_percent(&self) -> u8 {
        self.history.success_percent()
    }

    pub fn stats(&self) -> GapStats {
        self.stats
    }

    pub fn history(&self) -> &PacketHistory {
        &self.history
    }

    /// Zero everything, including the open gap
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_empty() {
        let history = PacketHistory::new();
        assert!(history.is_empty());
        assert_eq!(history.success_percent(), 0);
    }

    #[test]
    fn test_history_percent() {
        let mut history = PacketHistory::new();
        for i in 0..100 {
            history.record(i % 4 != 0);
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.success_percent(), 75);
    }

    #[test]
    fn test_history_window_evicts_oldest() {
        let mut history = PacketHistory::new();
        for _ in 0..PACKET_HISTORY_LEN {
            history.record(false);
        }
        assert_eq!(history.success_percent(), 0);

        for _ in 0..PACKET_HISTORY_LEN / 2 {
            history.record(true);
        }
        assert_eq!(history.len(), PACKET_HISTORY_LEN);
        assert_eq!(history.success_percent(), 50);

        for _ in 0..PACKET_HISTORY_LEN {
            history.record(true);
        }
        assert_eq!(history.success_percent(), 100);
    }

    #[test]
    fn test_gap_accounting() {
        let mut tracker = GapTracker::new();
        tracker.record_success(0);

        for t in [4, 8, 12, 16] {
            tracker.record_failure(t);
        }
        assert!(tracker.in_gap());
        assert_eq!(tracker.stats().count, 0);
        assert_eq!(tracker.current_gap_ms(16), 16);

        tracker.record_success(20);
        let stats = tracker.stats();
        assert_eq!(stats.count, 1);
        assert!(stats.longest_ms >= 20);
        assert_eq!(stats.lost_packets, 4);
        assert_eq!(stats.good_packets, 2);
        assert_eq!(tracker.current_gap_ms(24), 0);
    }

    #[test]
    fn test_gap_without_prior_success_starts_at_first_failure() {
        let mut tracker = GapTracker::new();
        tracker.record_failure(100);
        tracker.record_failure(104);
        tracker.record_success(130);
        assert_eq!(tracker.stats().longest_ms, 30);
    }

    #[test]
    fn test_longest_and_average() {
        let mut tracker = GapTracker::new();
        tracker.record_success(0);
        tracker.record_failure(4);
        tracker.record_success(10);
        tracker.record_failure(14);
        tracker.record_failure(18);
        tracker.record_success(40);

        let stats = tracker.stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.longest_ms, 30);
        assert_eq!(stats.total_ms, 40);
        assert_eq!(stats.average_ms, 20);
    }

    #[test]
    fn test_successes_alone_open_no_gap() {
        let mut tracker = GapTracker::new();
        for t in 0..10 {
            tracker.record_success(t * 4);
        }
        assert_eq!(tracker.stats().count, 0);
        assert_eq!(tracker.quality_percent(), 100);
    }

    #[test]
    fn test_reset() {
        let mut tracker = GapTracker::new();
        tracker.record_failure(0);
        tracker.record_success(5);
        tracker.record_failure(10);
        tracker.reset();

        assert_eq!(tracker.stats(), GapStats::default());
        assert!(!tracker.in_gap());
        assert!(tracker.history().is_empty());
    }
}
