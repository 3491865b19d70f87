//! # Wire Protocol Constants and Types
//!
//! Core definitions for the transmitter → receiver packet and the 6-byte
//! acknowledgment payload returned with every delivered packet.
//!
//! ```text
//! Channel packet:    [u16 bitmask][packed channel words (3 or 6)]
//! Parameter packet:  [u16 0][u16 parameter id][9 packed parameter words]
//! Keep-alive:        [u16 0]
//! Ack payload:       [u8 purpose][u8 byte1..byte5]
//! ```
//!
//! All multi-byte words are little-endian.

/// Number of logical control channels
pub const NUM_CHANNELS: usize = 16;

/// Maximum channel updates carried by one packet
pub const MAX_CHANNELS_PER_PACKET: usize = 8;

/// Channel value range (12-bit: 0-4095)
pub const CHANNEL_VALUE_MIN: u16 = 0;
pub const CHANNEL_VALUE_MAX: u16 = 0x0FFF;

/// Data words following the id in a parameter record
pub const PARAMETER_WORDS: usize = 11;

/// Packed word count of a parameter record body (11 values padded to 12)
pub const PARAMETER_PACKED_WORDS: usize = 9;

/// Keep-alive packet size (bitmask only)
pub const KEEPALIVE_PACKET_SIZE: usize = 2;

/// Parameter packet size: bitmask + id + packed body
pub const PARAMETER_PACKET_SIZE: usize = 2 + 2 + PARAMETER_PACKED_WORDS * 2;

/// Largest packet the radio accepts
pub const MAX_PACKET_SIZE: usize = 32;

/// Ack payload size (purpose + 5 data bytes)
pub const ACK_PAYLOAD_SIZE: usize = 6;

/// "Hop now" flag in the purpose byte
pub const ACK_HOP_NOW_FLAG: u8 = 0x80;

/// Field selector bits of the purpose byte
pub const ACK_SELECTOR_MASK: u8 = 0x7F;

/// Current control values, one word per channel
pub type ChannelBuffer = [u16; NUM_CHANNELS];

/// Reduce a channel value to the 12-bit wire range
pub fn clamp_channel_value(value: u16) -> u16 {
    value.min(CHANNEL_VALUE_MAX)
}

/// Channel updates selected for one packet
///
/// `values[..count]` hold the updated channels in ascending channel order,
/// matching the set bits of `bitmask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressedPacket {
    /// One bit per channel, set = slot carries an update
    pub bitmask: u16,

    /// Updated values, low 12 bits significant
    pub values: [u16; MAX_CHANNELS_PER_PACKET],

    /// Number of valid entries in `values`
    pub count: usize,
}

impl CompressedPacket {
    /// Updated values as a slice
    pub fn updates(&self) -> &[u16] {
        &self.values[..self.count]
    }

    /// True when no channel is carried (keep-alive or parameter packet)
    pub fn is_empty(&self) -> bool {
        self.bitmask == 0
    }
}

/// A decoded transmitter packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Channel updates: `(channel index, value)` in ascending channel order
    Channels(Vec<(usize, u16)>),

    /// Parameter record: raw id plus its 11 data words
    Parameter { id: u16, words: [u16; PARAMETER_WORDS] },

    /// Nothing changed this tick
    KeepAlive,
}

/// The fixed 6-byte acknowledgment payload
///
/// Byte 0 is the purpose (top bit = hop now, low 7 bits = field selector),
/// bytes 1-4 carry the field value and byte 5 the next hop-table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckPayload(pub [u8; ACK_PAYLOAD_SIZE]);

impl AckPayload {
    /// Build an ack payload as the receiver would
    pub fn new(selector: u8, data: [u8; 4], next_hop: u8, hop_now: bool) -> Self {
        let mut purpose = selector & ACK_SELECTOR_MASK;
        if hop_now {
            purpose |= ACK_HOP_NOW_FLAG;
        }
        Self([purpose, data[0], data[1], data[2], data[3], next_hop])
    }

    /// Raw purpose byte
    pub fn purpose(&self) -> u8 {
        self.0[0]
    }

    /// Whether the peer asks for an immediate hop
    pub fn hop_now(&self) -> bool {
        self.0[0] & ACK_HOP_NOW_FLAG != 0
    }

    /// Field selector with the hop flag cleared
    pub fn selector(&self) -> u8 {
        self.0[0] & ACK_SELECTOR_MASK
    }

    /// The 4 field bytes (bytes 1-4)
    pub fn data(&self) -> [u8; 4] {
        [self.0[1], self.0[2], self.0[3], self.0[4]]
    }

    /// Next hop-table index (byte 5, 7 bits)
    pub fn next_hop(&self) -> u8 {
        self.0[5] & ACK_SELECTOR_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_value_ranges() {
        assert_eq!(CHANNEL_VALUE_MIN, 0);
        assert_eq!(CHANNEL_VALUE_MAX, 4095);
        assert_eq!(NUM_CHANNELS, 16);
        assert_eq!(MAX_CHANNELS_PER_PACKET, 8);
    }

    #[test]
    fn test_packet_sizes_fit_radio() {
        // 8 channels pack into 6 words: bitmask + 12 bytes
        assert!(2 + 6 * 2 <= MAX_PACKET_SIZE);
        assert_eq!(PARAMETER_PACKET_SIZE, 22);
        assert!(PARAMETER_PACKET_SIZE <= MAX_PACKET_SIZE);
    }

    #[test]
    fn test_clamp_channel_value() {
        assert_eq!(clamp_channel_value(0), 0);
        assert_eq!(clamp_channel_value(1500), 1500);
        assert_eq!(clamp_channel_value(4095), 4095);
        assert_eq!(clamp_channel_value(4096), 4095);
        assert_eq!(clamp_channel_value(u16::MAX), 4095);
    }

    #[test]
    fn test_ack_payload_fields() {
        let ack = AckPayload::new(7, [1, 2, 3, 4], 42, true);
        assert_eq!(ack.purpose(), 0x87);
        assert!(ack.hop_now());
        assert_eq!(ack.selector(), 7);
        assert_eq!(ack.data(), [1, 2, 3, 4]);
        assert_eq!(ack.next_hop(), 42);
    }

    #[test]
    fn test_ack_payload_without_hop() {
        let ack = AckPayload::new(0xFF, [0; 4], 0xFF, false);
        assert!(!ack.hop_now());
        assert_eq!(ack.selector(), 0x7F);
        assert_eq!(ack.next_hop(), 0x7F);
    }

    #[test]
    fn test_compressed_packet_updates() {
        let mut packet = CompressedPacket::default();
        assert!(packet.is_empty());
        packet.bitmask = 0b101;
        packet.values[0] = 10;
        packet.values[1] = 20;
        packet.count = 2;
        assert_eq!(packet.updates(), &[10, 20]);
        assert!(!packet.is_empty());
    }
}
