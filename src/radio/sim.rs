//! In-process receiver used by the demo binary and scenario tests.
//!
//! The simulated peer accepts writes addressed to one pipe, mirrors the
//! channel values it decodes and answers with ack payloads from a rotating
//! telemetry schedule. Outages are scripted by write-attempt index.
//!
//! By default any radio channel reaches it. [`SimulatedRadio::with_listen_channel`]
//! parks it on one channel, so a transmitter tuned elsewhere loses every
//! packet until it finds the peer.

use bytes::Bytes;
use std::collections::VecDeque;
use std::ops::Range;
use tracing::debug;

use super::Radio;
use crate::link::fhss::HOP_TABLE;
use crate::telemetry::ack::{identity_halves, AckPurpose};
use crate::wire::decoder::decode_packet;
use crate::wire::protocol::{AckPayload, ChannelBuffer, Packet, NUM_CHANNELS};

/// Writes kept in the log
const WRITE_LOG_LEN: usize = 256;

/// Hop-table stride between successive hop requests
const HOP_STRIDE: usize = 7;

/// Telemetry fields the peer cycles through
const ACK_SCHEDULE: [AckPurpose; 8] = [
    AckPurpose::IdentityLow,
    AckPurpose::IdentityHigh,
    AckPurpose::GoodPackets,
    AckPurpose::RxVoltage,
    AckPurpose::ConnectedSeconds,
    AckPurpose::Altitude,
    AckPurpose::ReceiverVersion,
    AckPurpose::RotorRpm,
];

/// One write as seen on air
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub channel: u8,
    pub address: u64,
    pub payload: Bytes,
    pub delivered: bool,
}

/// Simulated receiver plus radio
#[derive(Debug, Clone)]
pub struct SimulatedRadio {
    listen_address: u64,
    listen_channel: Option<u8>,
    peer_identity: u64,
    address: Option<u64>,
    channel: u8,
    attempts: u64,
    delivered: u64,
    outages: Vec<Range<u64>>,
    writes: VecDeque<WriteRecord>,
    mirror: ChannelBuffer,
    parameters: Vec<u16>,
    scripted_acks: VecDeque<AckPayload>,
    pending_ack: Option<AckPayload>,
    hop_every: Option<u64>,
    next_hop: usize,
    schedule_cursor: usize,
    flushes: u64,
    retunes: u64,
}

impl SimulatedRadio {
    /// A peer listening on `listen_address` that reports `peer_identity`
    pub fn new(listen_address: u64, peer_identity: u64) -> Self {
        Self {
            listen_address,
            listen_channel: None,
            peer_identity,
            address: None,
            channel: 0,
            attempts: 0,
            delivered: 0,
            outages: Vec::new(),
            writes: VecDeque::with_capacity(WRITE_LOG_LEN),
            mirror: [0; NUM_CHANNELS],
            parameters: Vec::new(),
            scripted_acks: VecDeque::new(),
            pending_ack: None,
            hop_every: None,
            next_hop: 0,
            schedule_cursor: 0,
            flushes: 0,
            retunes: 0,
        }
    }

    /// Request a hop every `deliveries` acknowledged packets
    pub fn with_hop_every(mut self, deliveries: u64) -> Self {
        self.hop_every = (deliveries > 0).then_some(deliveries);
        self
    }

    /// Hear only writes sent on `channel`
    pub fn with_listen_channel(mut self, channel: u8) -> Self {
        self.listen_channel = Some(channel);
        self
    }

    /// Move the peer to `channel`, or make it hear every channel with `None`
    pub fn set_listen_channel(&mut self, channel: Option<u8>) {
        self.listen_channel = channel;
    }

    /// Drop every write whose attempt index (0-based) falls in `attempts`
    pub fn add_outage(&mut self, attempts: Range<u64>) {
        self.outages.push(attempts);
    }

    /// Answer the next acknowledged write with `ack` instead of the schedule
    pub fn push_ack(&mut self, ack: AckPayload) {
        self.scripted_acks.push_back(ack);
    }

    /// Radio channel last tuned
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Pipe address last opened for writing
    pub fn address(&self) -> Option<u64> {
        self.address
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Most recent writes, oldest first
    pub fn writes(&self) -> &VecDeque<WriteRecord> {
        &self.writes
    }

    pub fn last_write(&self) -> Option<&WriteRecord> {
        self.writes.back()
    }

    /// Channel values as the receiver has reconstructed them
    pub fn mirror(&self) -> &ChannelBuffer {
        &self.mirror
    }

    /// Parameter ids received, in arrival order
    pub fn parameters(&self) -> &[u16] {
        &self.parameters
    }

    /// FIFO flushes seen (RX and TX counted separately)
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// `set_channel` calls seen
    pub fn retunes(&self) -> u64 {
        self.retunes
    }

    fn in_outage(&self, attempt: u64) -> bool {
        self.outages.iter().any(|range| range.contains(&attempt))
    }

    fn receive(&mut self, payload: &[u8]) {
        match decode_packet(payload) {
            Ok(Packet::Channels(updates)) => {
                for (channel, value) in updates {
                    self.mirror[channel] = value;
                }
            }
            Ok(Packet::Parameter { id, .. }) => self.parameters.push(id),
            Ok(Packet::KeepAlive) => {}
            Err(e) => debug!("Peer rejected packet: {}", e),
        }
    }

    fn scheduled_ack(&mut self) -> AckPayload {
        let purpose = ACK_SCHEDULE[self.schedule_cursor];
        self.schedule_cursor = (self.schedule_cursor + 1) % ACK_SCHEDULE.len();

        let (low, high) = identity_halves(self.peer_identity);
        let data = match purpose {
            AckPurpose::IdentityLow => low,
            AckPurpose::IdentityHigh => high,
            AckPurpose::GoodPackets => (self.delivered as u32).to_le_bytes(),
            AckPurpose::RxVoltage => 7.4f32.to_le_bytes(),
            AckPurpose::ConnectedSeconds => ((self.delivered / 250) as u32).to_le_bytes(),
            AckPurpose::Altitude => 12.5f32.to_le_bytes(),
            AckPurpose::ReceiverVersion => [2, 0, 0, 0],
            AckPurpose::RotorRpm => 9_600u32.to_le_bytes(),
            _ => [0; 4],
        };

        let hop_now = self
            .hop_every
            .is_some_and(|every| self.delivered % every == 0);
        let ack = AckPayload::new(purpose.as_u8(), data, self.next_hop as u8, hop_now);
        if hop_now {
            self.next_hop = (self.next_hop + HOP_STRIDE) % HOP_TABLE.len();
        }
        ack
    }
}

impl Radio for SimulatedRadio {
    fn flush_rx(&mut self) {
        self.flushes += 1;
    }

    fn flush_tx(&mut self) {
        self.flushes += 1;
    }

    fn set_channel(&mut self, channel: u8) {
        self.channel = channel;
        self.retunes += 1;
    }

    fn stop_listening(&mut self) {}

    fn open_writing_pipe(&mut self, address: u64) {
        self.address = Some(address);
    }

    fn write(&mut self, payload: &[u8]) -> bool {
        let attempt = self.attempts;
        self.attempts += 1;
        self.pending_ack = None;

        let address = self.address.unwrap_or(0);
        let delivered = address == self.listen_address
            && self.listen_channel.map_or(true, |c| c == self.channel)
            && !self.in_outage(attempt);

        if self.writes.len() == WRITE_LOG_LEN {
            self.writes.pop_front();
        }
        self.writes.push_back(WriteRecord {
            channel: self.channel,
            address,
            payload: Bytes::copy_from_slice(payload),
            delivered,
        });

        if delivered {
            self.delivered += 1;
            self.receive(payload);
            let ack = match self.scripted_acks.pop_front() {
                Some(ack) => ack,
                None => self.scheduled_ack(),
            };
            self.pending_ack = Some(ack);
        }
        delivered
    }

    fn read_ack(&mut self) -> Option<AckPayload> {
        self.pending_ack.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encoder::{encode_channel_packet, encode_keepalive};

    const LISTEN: u64 = 0x34_4767_889C;

    #[test]
    fn test_wrong_pipe_is_not_delivered() {
        let mut radio = SimulatedRadio::new(LISTEN, 1);
        radio.open_writing_pipe(LISTEN + 1);
        assert!(!radio.write(&encode_keepalive()));
        assert!(radio.read_ack().is_none());

        radio.open_writing_pipe(LISTEN);
        assert!(radio.write(&encode_keepalive()));
        assert!(radio.read_ack().is_some());
        assert!(radio.read_ack().is_none());
        assert_eq!(radio.attempts(), 2);
        assert_eq!(radio.delivered(), 1);
    }

    #[test]
    fn test_listen_channel_filters_writes() {
        let mut radio = SimulatedRadio::new(LISTEN, 1).with_listen_channel(71);
        radio.open_writing_pipe(LISTEN);

        radio.set_channel(22);
        assert!(!radio.write(&encode_keepalive()));
        assert!(radio.read_ack().is_none());

        radio.set_channel(71);
        assert!(radio.write(&encode_keepalive()));

        radio.set_listen_channel(None);
        radio.set_channel(5);
        assert!(radio.write(&encode_keepalive()));
        assert_eq!(radio.delivered(), 2);
    }

    #[test]
    fn test_outage_by_attempt_index() {
        let mut radio = SimulatedRadio::new(LISTEN, 1);
        radio.open_writing_pipe(LISTEN);
        radio.add_outage(1..3);

        let results: Vec<bool> = (0..4).map(|_| radio.write(&encode_keepalive())).collect();
        assert_eq!(results, vec![true, false, false, true]);
    }

    #[test]
    fn test_mirror_follows_channel_packets() {
        let mut radio = SimulatedRadio::new(LISTEN, 1);
        radio.open_writing_pipe(LISTEN);

        let packed = crate::wire::bitpack::pack(&[1000, 2000, 0, 0]);
        radio.write(&encode_channel_packet(0b101, &packed));
        assert_eq!(radio.mirror()[0], 1000);
        assert_eq!(radio.mirror()[2], 2000);
        assert_eq!(radio.mirror()[1], 0);
    }

    #[test]
    fn test_scripted_ack_takes_priority() {
        let mut radio = SimulatedRadio::new(LISTEN, 1);
        radio.open_writing_pipe(LISTEN);
        let scripted = AckPayload::new(AckPurpose::Pressure.as_u8(), [0; 4], 17, true);
        radio.push_ack(scripted);

        radio.write(&encode_keepalive());
        assert_eq!(radio.read_ack(), Some(scripted));
    }

    #[test]
    fn test_schedule_sends_identity_first() {
        let mut radio = SimulatedRadio::new(LISTEN, 0xAABB_CCDD_1122_3344);
        radio.open_writing_pipe(LISTEN);

        radio.write(&encode_keepalive());
        let low = radio.read_ack().unwrap();
        assert_eq!(low.selector(), AckPurpose::IdentityLow.as_u8());
        assert_eq!(low.data(), 0x1122_3344u32.to_le_bytes());

        radio.write(&encode_keepalive());
        let high = radio.read_ack().unwrap();
        assert_eq!(high.selector(), AckPurpose::IdentityHigh.as_u8());
        assert_eq!(high.data(), 0xAABB_CCDDu32.to_le_bytes());
    }

    #[test]
    fn test_hop_requests() {
        let mut radio = SimulatedRadio::new(LISTEN, 1).with_hop_every(2);
        radio.open_writing_pipe(LISTEN);

        let acks: Vec<AckPayload> = (0..4)
            .map(|_| {
                radio.write(&encode_keepalive());
                radio.read_ack().unwrap()
            })
            .collect();

        let flags: Vec<bool> = acks.iter().map(|a| a.hop_now()).collect();
        assert_eq!(flags, vec![false, true, false, true]);
        assert_eq!(acks[1].next_hop(), 0);
        assert_eq!(acks[2].next_hop(), HOP_STRIDE as u8);
    }
}
