//! # RC Link Library
//!
//! The control link of a 16-channel hobby RC transmitter.
//!
//! This library provides the link engine that carries stick values to a
//! receiver over a frequency-hopping 2.4 GHz radio: delta selection and 12-bit
//! packing of channels, receiver-directed hopping with recovery, pipe binding,
//! out-of-band parameter records and the telemetry returned in ack payloads.

pub mod config;
pub mod error;
pub mod link;
pub mod radio;
pub mod telemetry;
pub mod wire;
