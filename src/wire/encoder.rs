//! # Packet Encoder
//!
//! Serializes channel updates and parameter records into wire packets.

use bytes::{BufMut, Bytes, BytesMut};

use super::bitpack::{pack, packed_len, GROUP_VALUES};
use super::protocol::*;

/// Encode a channel packet from an already-packed body
///
/// # Arguments
///
/// * `bitmask` - One bit per channel carried
/// * `packed` - Packed channel words (3 per group of 4 updates)
///
/// # Returns
///
/// * `Bytes` - `[u16 bitmask][packed words]`, little-endian
pub fn encode_channel_packet(bitmask: u16, packed: &[u16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + packed.len() * 2);
    buf.put_u16_le(bitmask);
    for &word in packed {
        buf.put_u16_le(word);
    }
    buf.freeze()
}

/// Encode a [`CompressedPacket`], packing its updates
///
/// An empty packet encodes as a keep-alive.
///
/// # Examples
///
/// ```
/// use rc_link::wire::encoder::encode_channels;
/// use rc_link::wire::protocol::CompressedPacket;
///
/// let mut packet = CompressedPacket::default();
/// packet.bitmask = 0b1;
/// packet.values[0] = 1500;
/// packet.count = 1;
///
/// let frame = encode_channels(&packet);
/// assert_eq!(frame.len(), 2 + 3 * 2);
/// ```
pub fn encode_channels(packet: &CompressedPacket) -> Bytes {
    if packet.is_empty() {
        return encode_keepalive();
    }

    let padded = packet.count.div_ceil(GROUP_VALUES) * GROUP_VALUES;
    let mut values = [0u16; MAX_CHANNELS_PER_PACKET];
    values[..packet.count].copy_from_slice(packet.updates());

    let packed = pack(&values[..padded]);
    debug_assert_eq!(packed.len(), packed_len(packet.count));
    encode_channel_packet(packet.bitmask, &packed)
}

/// Encode a parameter packet from an already-packed body
///
/// # Arguments
///
/// * `id` - Parameter identifier
/// * `packed` - The 11 data words padded to 12 and packed (9 words)
pub fn encode_parameter_packet(id: u16, packed: &[u16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PARAMETER_PACKET_SIZE);
    buf.put_u16_le(0);
    buf.put_u16_le(id);
    for &word in packed {
        buf.put_u16_le(word);
    }
    buf.freeze()
}

/// Encode a parameter record, packing its data words
pub fn encode_parameter(id: u16, words: &[u16; PARAMETER_WORDS]) -> Bytes {
    let mut padded = [0u16; PARAMETER_WORDS + 1];
    padded[..PARAMETER_WORDS].copy_from_slice(words);
    encode_parameter_packet(id, &pack(&padded))
}

/// Encode the minimal keep-alive packet (zero bitmask, no body)
pub fn encode_keepalive() -> Bytes {
    Bytes::from_static(&[0, 0])
}
