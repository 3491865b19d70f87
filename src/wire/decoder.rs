//! # Packet Decoder
//!
//! Decodes wire packets back into channel updates or parameter records.
//! This is the receiver's half of the protocol; the transmitter uses it only
//! in the simulated peer and in tests.

use bytes::Buf;

use super::bitpack::{packed_len, unpack};
use super::protocol::*;
use crate::error::{RcLinkError, Result};

/// Decode a complete wire packet
///
/// # Arguments
///
/// * `frame` - Packet bytes as written to the radio
///
/// # Returns
///
/// * `Result<Packet>` - Decoded packet, or error if malformed
///
/// # Errors
///
/// Returns error if:
/// - Packet is shorter than the bitmask or has an odd length
/// - Bitmask selects more channels than one packet carries
/// - Body length does not match the bitmask (or the parameter layout)
pub fn decode_packet(frame: &[u8]) -> Result<Packet> {
    if frame.len() < KEEPALIVE_PACKET_SIZE {
        return Err(RcLinkError::Protocol("Packet too short".to_string()));
    }

    if frame.len() % 2 != 0 {
        return Err(RcLinkError::Protocol(format!(
            "Packet length {} is not a whole number of words",
            frame.len()
        )));
    }

    let mut buf = frame;
    let bitmask = buf.get_u16_le();

    if bitmask == 0 {
        return match frame.len() {
            KEEPALIVE_PACKET_SIZE => Ok(Packet::KeepAlive),
            PARAMETER_PACKET_SIZE => decode_parameter_body(buf),
            len => Err(RcLinkError::Protocol(format!(
                "Zero-bitmask packet of {} bytes is neither keep-alive nor parameter",
                len
            ))),
        };
    }

    let count = bitmask.count_ones() as usize;
    if count > MAX_CHANNELS_PER_PACKET {
        return Err(RcLinkError::Protocol(format!(
            "Bitmask 0x{:04X} selects {} channels (max {})",
            bitmask, count, MAX_CHANNELS_PER_PACKET
        )));
    }

    let expected = KEEPALIVE_PACKET_SIZE + packed_len(count) * 2;
    if frame.len() != expected {
        return Err(RcLinkError::Protocol(format!(
            "Channel packet length mismatch: expected {} bytes, got {}",
            expected,
            frame.len()
        )));
    }

    let words = read_words(&mut buf);
    let values = unpack(&words);

    let updates = (0..NUM_CHANNELS)
        .filter(|&channel| bitmask & (1 << channel) != 0)
        .zip(values)
        .collect();

    Ok(Packet::Channels(updates))
}

fn decode_parameter_body(mut buf: &[u8]) -> Result<Packet> {
    let id = buf.get_u16_le();
    let packed = read_words(&mut buf);
    let values = unpack(&packed);

    let mut words = [0u16; PARAMETER_WORDS];
    words.copy_from_slice(&values[..PARAMETER_WORDS]);

    Ok(Packet::Parameter { id, words })
}

fn read_words(buf: &mut &[u8]) -> Vec<u16> {
    let mut words = Vec::with_capacity(buf.remaining() / 2);
    while buf.remaining() >= 2 {
        words.push(buf.get_u16_le());
    }
    words
}
