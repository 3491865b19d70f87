//! # Channel Delta Encoder
//!
//! Chooses which of the 16 channels ride in the next packet.
//!
//! A channel is included when it moved by at least the change threshold since
//! it was last sent, or when its priority interval expired without a send.
//! Primary flight controls (the low channel indices) repeat faster than
//! auxiliary channels. Scanning stops once a packet is full.
//!
//! The receiver's mirror is therefore eventually consistent: a delta lost over
//! the air is resent within one priority interval even if the stick never
//! moves again.

use crate::config::EncoderConfig;
use crate::wire::protocol::{
    clamp_channel_value, ChannelBuffer, CompressedPacket, MAX_CHANNELS_PER_PACKET, NUM_CHANNELS,
};

/// Selection thresholds for the delta encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaSettings {
    /// Smallest change worth sending
    pub threshold: u16,

    /// Forced-repeat interval per channel (ms)
    pub intervals_ms: [u64; NUM_CHANNELS],
}

impl DeltaSettings {
    /// Creates settings with `primary_channels` low channels on the fast interval
    pub fn new(threshold: u16, primary_channels: usize, primary_ms: u64, aux_ms: u64) -> Self {
        let mut intervals_ms = [aux_ms; NUM_CHANNELS];
        for interval in intervals_ms.iter_mut().take(primary_channels) {
            *interval = primary_ms;
        }
        Self {
            threshold: threshold.max(1),
            intervals_ms,
        }
    }
}

impl From<&EncoderConfig> for DeltaSettings {
    fn from(config: &EncoderConfig) -> Self {
        Self::new(
            config.change_threshold,
            config.primary_channels,
            config.primary_interval_ms,
            config.aux_interval_ms,
        )
    }
}

/// Tracks what the receiver last saw of each channel
#[derive(Debug, Clone)]
pub struct ChannelDeltaEncoder {
    settings: DeltaSettings,
    previous: ChannelBuffer,
    last_sent_ms: [Option<u64>; NUM_CHANNELS],
}

impl ChannelDeltaEncoder {
    /// Creates an encoder with nothing sent yet
    ///
    /// Every channel counts as overdue, so the first packets carry the full
    /// buffer.
    pub fn new(settings: DeltaSettings) -> Self {
        Self {
            settings,
            previous: [0; NUM_CHANNELS],
            last_sent_ms: [None; NUM_CHANNELS],
        }
    }

    /// Treat `current` as already delivered at `now_ms`
    pub fn prime(&mut self, current: &ChannelBuffer, now_ms: u64) {
        for (previous, &value) in self.previous.iter_mut().zip(current) {
            *previous = clamp_channel_value(value);
        }
        self.last_sent_ms = [Some(now_ms); NUM_CHANNELS];
    }

    /// Select the channels for the next packet
    ///
    /// # Arguments
    ///
    /// * `current` - Channel values this tick
    /// * `now_ms` - Monotonic clock
    ///
    /// # Returns
    ///
    /// * `CompressedPacket` - Bitmask and up to 8 values; empty means keep-alive
    ///
    /// # Examples
    ///
    /// ```
    /// use rc_link::link::delta::{ChannelDeltaEncoder, DeltaSettings};
    ///
    /// let mut encoder = ChannelDeltaEncoder::new(DeltaSettings::new(4, 4, 50, 150));
    /// let mut channels = [1500u16; 16];
    /// encoder.prime(&channels, 0);
    ///
    /// channels[2] += 10;
    /// let packet = encoder.select(&channels, 4);
    /// assert_eq!(packet.bitmask, 1 << 2);
    /// assert_eq!(packet.updates(), &[1510]);
    /// ```
    pub fn select(&mut self, current: &ChannelBuffer, now_ms: u64) -> CompressedPacket {
        let mut packet = CompressedPacket::default();

        for channel in 0..NUM_CHANNELS {
            if packet.count == MAX_CHANNELS_PER_PACKET {
                break;
            }

            let value = clamp_channel_value(current[channel]);
            let moved = value.abs_diff(self.previous[channel]) >= self.settings.threshold;
            let overdue = match self.last_sent_ms[channel] {
                Some(sent) => now_ms.saturating_sub(sent) > self.settings.intervals_ms[channel],
                None => true,
            };

            if moved || overdue {
                packet.bitmask |= 1 << channel;
                packet.values[packet.count] = value;
                packet.count += 1;
                self.previous[channel] = value;
                self.last_sent_ms[channel] = Some(now_ms);
            }
        }

        packet
    }

    /// The values last selected for sending
    pub fn previous(&self) -> &ChannelBuffer {
        &self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(primary_ms: u64, aux_ms: u64) -> ChannelDeltaEncoder {
        ChannelDeltaEncoder::new(DeltaSettings::new(4, 4, primary_ms, aux_ms))
    }

    #[test]
    fn test_settings_split_primary_and_aux() {
        let settings = DeltaSettings::new(4, 4, 50, 150);
        assert_eq!(&settings.intervals_ms[..4], &[50; 4]);
        assert_eq!(&settings.intervals_ms[4..], &[150; 12]);
    }

    #[test]
    fn test_zero_threshold_is_raised() {
        assert_eq!(DeltaSettings::new(0, 4, 50, 150).threshold, 1);
    }

    #[test]
    fn test_first_selection_sends_first_eight() {
        let mut enc = encoder(50, 150);
        let channels = [1500u16; NUM_CHANNELS];

        let first = enc.select(&channels, 0);
        assert_eq!(first.count, 8);
        assert_eq!(first.bitmask, 0x00FF);

        let second = enc.select(&channels, 1);
        assert_eq!(second.count, 8);
        assert_eq!(second.bitmask, 0xFF00);

        assert!(enc.select(&channels, 2).is_empty());
    }

    #[test]
    fn test_no_change_no_expiry_selects_nothing() {
        let mut enc = encoder(50, 150);
        let channels = [1500u16; NUM_CHANNELS];
        enc.prime(&channels, 0);

        for now in [1, 10, 49, 50] {
            assert_eq!(enc.select(&channels, now).count, 0, "tick at {} ms", now);
        }
    }

    #[test]
    fn test_change_below_threshold_is_ignored() {
        let mut enc = encoder(1000, 1000);
        let mut channels = [1500u16; NUM_CHANNELS];
        enc.prime(&channels, 0);

        channels[0] = 1503;
        assert!(enc.select(&channels, 1).is_empty());

        channels[0] = 1504;
        let packet = enc.select(&channels, 2);
        assert_eq!(packet.bitmask, 1);
        assert_eq!(packet.updates(), &[1504]);
    }

    #[test]
    fn test_slow_drift_accumulates_against_last_sent() {
        let mut enc = encoder(1000, 1000);
        let mut channels = [1500u16; NUM_CHANNELS];
        enc.prime(&channels, 0);

        // Three steps of 2 are each below threshold but sum to 6
        channels[5] = 1502;
        assert!(enc.select(&channels, 1).is_empty());
        channels[5] = 1504;
        let packet = enc.select(&channels, 2);
        assert_eq!(packet.bitmask, 1 << 5);
    }

    #[test]
    fn test_capacity_limits_to_eight() {
        let mut enc = encoder(1000, 1000);
        let mut channels = [1500u16; NUM_CHANNELS];
        enc.prime(&channels, 0);

        for value in channels.iter_mut() {
            *value = 2000;
        }
        let packet = enc.select(&channels, 1);
        assert_eq!(packet.count, MAX_CHANNELS_PER_PACKET);
        assert_eq!(packet.bitmask, 0x00FF);

        // The remaining eight follow next tick
        let packet = enc.select(&channels, 2);
        assert_eq!(packet.bitmask, 0xFF00);
    }

    #[test]
    fn test_values_are_degraded_to_12_bits() {
        let mut enc = encoder(1000, 1000);
        let mut channels = [0u16; NUM_CHANNELS];
        enc.prime(&channels, 0);

        channels[0] = 0xFFFF;
        let packet = enc.select(&channels, 1);
        assert_eq!(packet.updates(), &[4095]);
        assert_eq!(enc.previous()[0], 4095);
    }

    #[test]
    fn test_priority_guarantee_for_unchanged_channels() {
        let tick_ms = 4;
        let mut enc = encoder(50, 150);
        let channels = [1500u16; NUM_CHANNELS];
        enc.prime(&channels, 0);

        let mut last_seen = [0u64; NUM_CHANNELS];
        let mut now = 0;
        while now < 2000 {
            now += tick_ms;
            let packet = enc.select(&channels, now);
            for channel in 0..NUM_CHANNELS {
                if packet.bitmask & (1 << channel) != 0 {
                    last_seen[channel] = now;
                }
            }
            // One tick to notice expiry, one more when a full packet defers it
            for channel in 0..NUM_CHANNELS {
                let interval = if channel < 4 { 50 } else { 150 };
                assert!(
                    now - last_seen[channel] <= interval + 2 * tick_ms,
                    "channel {} starved at {} ms",
                    channel,
                    now
                );
            }
        }
    }

    #[test]
    fn test_normal_cruise_scenario() {
        // One channel moves by 10 every 20 ticks; repeats are far away
        let mut enc = encoder(1_000_000, 1_000_000);
        let mut channels = [1500u16; NUM_CHANNELS];
        enc.prime(&channels, 0);

        let mut non_empty = 0;
        for tick in 1..=100u64 {
            if tick % 20 == 0 {
                channels[3] += 10;
            }
            let packet = enc.select(&channels, tick);
            if !packet.is_empty() {
                non_empty += 1;
                assert_eq!(packet.bitmask, 1 << 3);
                assert_eq!(packet.count, 1);
                assert_eq!(packet.updates(), &[channels[3]]);
            }
        }
        assert_eq!(non_empty, 5);
    }
}
