//! # Radio Module
//!
//! The hardware seam between the link engine and a 2.4 GHz transceiver.
//!
//! The engine drives the radio through [`Radio`] only, so real hardware, the
//! in-process [`sim::SimulatedRadio`] and test mocks are interchangeable.

pub mod sim;

pub use sim::SimulatedRadio;

use crate::wire::protocol::AckPayload;

/// Transceiver operations used by the link engine
///
/// All calls are synchronous and bounded. `write` may retry internally a
/// fixed number of times before reporting failure.
#[cfg_attr(test, mockall::automock)]
pub trait Radio {
    /// Discard anything left in the receive FIFO
    fn flush_rx(&mut self);

    /// Discard anything left in the transmit FIFO
    fn flush_tx(&mut self);

    /// Tune to a radio channel
    fn set_channel(&mut self, channel: u8);

    /// Leave receive mode before retuning
    fn stop_listening(&mut self);

    /// Address subsequent writes to `address` (40 bits used)
    fn open_writing_pipe(&mut self, address: u64);

    /// Transmit one packet; `true` once the peer acknowledged it
    fn write(&mut self, payload: &[u8]) -> bool;

    /// Ack payload returned with the last acknowledged write, if any
    fn read_ack(&mut self) -> Option<AckPayload>;
}
