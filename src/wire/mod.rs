//! # Wire Protocol Module
//!
//! The over-the-air packet format of the control link.
//!
//! This module handles:
//! - Lossless 16 → 12-bit packing of channel and parameter words
//! - Channel, parameter and keep-alive packet encoding
//! - Packet decoding for the receiving side
//! - The 6-byte acknowledgment payload layout

pub mod protocol;
pub mod bitpack;
pub mod encoder;
pub mod decoder;
