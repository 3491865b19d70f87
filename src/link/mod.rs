//! # Link Module
//!
//! The transmitter side of the frequency-hopping control link.
//!
//! This module handles:
//! - Choosing channel deltas or queued parameters for each packet
//! - Frequency hopping directed by the receiver, and recovery hopping
//! - Pipe toggling until bound
//! - The connection state machine
//! - Link quality and gap statistics
//! - The inactivity watchdog
//!
//! [`LinkEngine`] owns all of it. Callers poll [`LinkEngine::on_tick`] as
//! often as they like; the engine paces itself to `tick_interval_ms` and
//! never blocks beyond the radio write itself.

pub mod delta;
pub mod fhss;
pub mod gaps;
pub mod params;
pub mod pipes;
pub mod watchdog;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::radio::Radio;
use crate::telemetry::ack::Telemetry;
use crate::wire::bitpack::PackCache;
use crate::wire::encoder::{encode_channel_packet, encode_keepalive, encode_parameter_packet};
use crate::wire::protocol::{clamp_channel_value, AckPayload, ChannelBuffer, NUM_CHANNELS};

use delta::{ChannelDeltaEncoder, DeltaSettings};
use fhss::HopSchedule;
use gaps::{GapStats, GapTracker};
use params::{ModelParameters, ParameterId, ParameterQueue};
use pipes::PipeManager;
use watchdog::InactivityWatchdog;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No write has been acknowledged yet; pipes toggle on every failure
    Unbound,
    /// Bound, waiting for the first acknowledged data packet
    BoundDisconnected,
    Connected,
    /// Contact lost; cycling recovery channels
    Reconnecting,
}

/// What a tick put on air
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Channels { bitmask: u16, count: usize },
    Parameter(ParameterId),
    KeepAlive,
    /// Called before the pacing interval elapsed; nothing was sent
    Idle,
}

/// Outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub payload: Payload,
    /// Always false for [`Payload::Idle`]
    pub delivered: bool,
    /// State after the tick
    pub state: LinkState,
    /// Radio channel the next tick transmits on
    pub radio_channel: u8,
    /// Inactivity ceiling exceeded; the owner should power down
    pub power_down: bool,
}

/// Point-in-time view for status displays and telemetry logs
#[derive(Debug, Clone, Serialize)]
pub struct LinkSnapshot {
    pub state: LinkState,
    pub bound: bool,
    pub model_matched: bool,
    pub radio_channel: u8,
    pub quality_percent: u8,
    pub consecutive_failures: u32,
    pub current_gap_ms: u64,
    pub gaps: GapStats,
    pub parameters_pending: usize,
    pub telemetry: Telemetry,
}

/// The link engine: every buffer, queue and counter of the link
pub struct LinkEngine<R: Radio> {
    radio: R,
    state: LinkState,
    channels: ChannelBuffer,
    encoder: ChannelDeltaEncoder,
    activity_threshold: u16,
    channel_cache: PackCache,
    parameter_cache: PackCache,
    parameters: ParameterQueue,
    model: ModelParameters,
    hops: HopSchedule,
    pipes: PipeManager,
    gaps: GapTracker,
    telemetry: Telemetry,
    watchdog: InactivityWatchdog,
    consecutive_failures: u32,
    lost_contact_cutoff: u32,
    model_matched: bool,
    tick_interval_ms: u64,
    last_tick_ms: Option<u64>,
}

impl<R: Radio> LinkEngine<R> {
    /// Creates an unbound engine and points the radio at the first pipe and channel
    ///
    /// # Arguments
    ///
    /// * `radio` - Transceiver to drive
    /// * `config` - Validated configuration
    /// * `now_ms` - Monotonic clock, starts the inactivity countdown
    ///
    /// # Errors
    ///
    /// Returns error if the configured hardware id is not valid hex
    pub fn new(mut radio: R, config: &Config, now_ms: u64) -> Result<Self> {
        let hardware_id = config.link.hardware_id_bytes()?;
        let pipes = PipeManager::new(config.link.default_pipe, &hardware_id, config.link.initial_pipe);
        let hops = HopSchedule::new();

        radio.open_writing_pipe(pipes.active_address());
        radio.stop_listening();
        radio.set_channel(hops.current_channel());

        let settings = DeltaSettings::from(&config.encoder);
        info!(
            "Link engine ready: {:?} pipe 0x{:010X}, channel {}",
            pipes.active(),
            pipes.active_address(),
            hops.current_channel()
        );

        Ok(Self {
            radio,
            state: LinkState::Unbound,
            channels: [0; NUM_CHANNELS],
            encoder: ChannelDeltaEncoder::new(settings),
            activity_threshold: settings.threshold,
            channel_cache: PackCache::new(),
            parameter_cache: PackCache::new(),
            parameters: ParameterQueue::new(&config.parameters),
            model: config.model.parameters.clone(),
            hops,
            pipes,
            gaps: GapTracker::new(),
            telemetry: Telemetry::new(),
            watchdog: InactivityWatchdog::new(
                config.watchdog.inactivity_minutes * 60 * 1000,
                now_ms,
            ),
            consecutive_failures: 0,
            lost_contact_cutoff: config.link.lost_contact_cutoff.max(1),
            model_matched: false,
            tick_interval_ms: config.link.tick_interval_ms,
            last_tick_ms: None,
        })
    }

    /// Take this tick's channel values from the mixer
    ///
    /// Values are degraded to 12 bits. A move of at least the change
    /// threshold on any channel counts as user activity for the watchdog.
    pub fn update_channels(&mut self, values: &ChannelBuffer, now_ms: u64) {
        let mut moved = false;
        for (current, &value) in self.channels.iter_mut().zip(values) {
            let value = clamp_channel_value(value);
            if value.abs_diff(*current) >= self.activity_threshold {
                moved = true;
            }
            *current = value;
        }

        if moved {
            self.watchdog.note_activity(now_ms);
        }
    }

    /// Run one send-and-acknowledge cycle if the pacing interval has elapsed
    ///
    /// Flushes the radio FIFOs, picks a parameter record or channel deltas,
    /// writes, then updates statistics and state from the outcome. Earlier
    /// calls touch no radio and report [`Payload::Idle`]; the watchdog is
    /// evaluated either way.
    pub fn on_tick(&mut self, now_ms: u64) -> TickReport {
        if let Some(last) = self.last_tick_ms {
            if now_ms.saturating_sub(last) < self.tick_interval_ms {
                return TickReport {
                    payload: Payload::Idle,
                    delivered: false,
                    state: self.state,
                    radio_channel: self.hops.current_channel(),
                    power_down: self.watchdog.check(now_ms),
                };
            }
        }
        self.last_tick_ms = Some(now_ms);

        self.radio.flush_tx();
        self.radio.flush_rx();

        let (payload, frame) = self.next_frame(now_ms);
        let delivered = self.radio.write(&frame);

        if delivered {
            self.on_delivered(now_ms);
        } else {
            self.on_lost(now_ms);
        }

        TickReport {
            payload,
            delivered,
            state: self.state,
            radio_channel: self.hops.current_channel(),
            power_down: self.watchdog.check(now_ms),
        }
    }

    /// Parameters go out only while connected, and only inside a send window
    fn next_frame(&mut self, now_ms: u64) -> (Payload, Bytes) {
        if self.state == LinkState::Connected {
            if let Some(record) = self.parameters.dequeue_for_send(now_ms, &self.model) {
                self.parameter_cache.load(&record.words);
                let frame =
                    encode_parameter_packet(record.id.as_u16(), self.parameter_cache.packed());
                return (Payload::Parameter(record.id), frame);
            }
        }

        let packet = self.encoder.select(&self.channels, now_ms);
        if packet.is_empty() {
            return (Payload::KeepAlive, encode_keepalive());
        }

        self.channel_cache.load(packet.updates());
        let frame = encode_channel_packet(packet.bitmask, self.channel_cache.packed());
        (
            Payload::Channels {
                bitmask: packet.bitmask,
                count: packet.count,
            },
            frame,
        )
    }

    fn on_delivered(&mut self, now_ms: u64) {
        self.consecutive_failures = 0;
        self.gaps.record_success(now_ms);

        match self.state {
            LinkState::Unbound => {
                self.pipes.bind();
                self.radio.open_writing_pipe(self.pipes.active_address());
                self.transition(LinkState::BoundDisconnected);
            }
            LinkState::BoundDisconnected => self.transition(LinkState::Connected),
            LinkState::Reconnecting => {
                self.hops.reset_recovery();
                self.transition(LinkState::Connected);
            }
            LinkState::Connected => {}
        }

        if let Some(ack) = self.radio.read_ack() {
            self.handle_ack(&ack);
        }
    }

    fn on_lost(&mut self, now_ms: u64) {
        self.gaps.record_failure(now_ms);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.state {
            LinkState::Unbound => {
                let pipe = self.pipes.toggle();
                self.radio.open_writing_pipe(self.pipes.active_address());
                debug!("No answer, trying {:?} pipe", pipe);
            }
            LinkState::BoundDisconnected | LinkState::Connected => {
                if self.consecutive_failures >= self.lost_contact_cutoff {
                    warn!(
                        "Lost contact after {} failed packets",
                        self.consecutive_failures
                    );
                    self.transition(LinkState::Reconnecting);
                    let channel = self.hops.recovery_hop();
                    self.apply_hop(channel);
                }
            }
            LinkState::Reconnecting => {
                let channel = self.hops.recovery_hop();
                self.apply_hop(channel);
            }
        }
    }

    /// Follow the receiver's hop instructions, then decode the telemetry field
    fn handle_ack(&mut self, ack: &AckPayload) {
        if !self.hops.set_next(ack.next_hop()) {
            debug!("Ignoring out-of-range hop index {}", ack.next_hop());
        }

        if ack.hop_now() {
            let channel = self.hops.hop_now();
            self.apply_hop(channel);
        }

        self.telemetry.decode(ack);
    }

    /// Retune even when `channel` is already current
    fn apply_hop(&mut self, channel: u8) {
        self.radio.stop_listening();
        self.radio.set_channel(channel);
        debug!("Hopped to channel {}", channel);
    }

    fn transition(&mut self, next: LinkState) {
        if self.state != next {
            info!("Link {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Queue a parameter record for sending
    ///
    /// An accepted request counts as user activity for the watchdog.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The peer is not bound, or its identity has not been matched
    /// - `id` is zero
    /// - The queue lacks room for another set of repeats
    pub fn enqueue_parameter(&mut self, id: u16, now_ms: u64) -> Result<()> {
        let ready = self.pipes.is_bound() && self.model_matched;
        self.parameters.enqueue(id, ready)?;
        self.watchdog.note_activity(now_ms);
        Ok(())
    }

    /// Queue every known parameter record, e.g. after a model match
    ///
    /// Stops at the first refusal and returns how many were queued.
    pub fn enqueue_all_parameters(&mut self, now_ms: u64) -> usize {
        let mut queued = 0;
        for id in ParameterId::ALL {
            if let Err(e) = self.enqueue_parameter(id.as_u16(), now_ms) {
                warn!("Stopped queueing parameters at {:?}: {}", id, e);
                break;
            }
            queued += 1;
        }
        queued
    }

    /// Compare the peer's reported identity with `expected`
    ///
    /// Stores and returns the result; parameters can be queued only after a
    /// match.
    pub fn check_model(&mut self, expected: u64) -> bool {
        let matched = self.telemetry.identity_matches(expected);
        if matched != self.model_matched {
            if matched {
                info!("Receiver 0x{:016X} matches the selected model", expected);
            } else {
                warn!("Receiver no longer matches the selected model");
            }
        }
        self.model_matched = matched;
        matched
    }

    /// Set the model-match flag directly
    pub fn set_model_matched(&mut self, matched: bool) {
        self.model_matched = matched;
    }

    /// Restart the inactivity countdown for activity the engine cannot see
    pub fn note_activity(&mut self, now_ms: u64) {
        self.watchdog.note_activity(now_ms);
    }

    /// Clear gap statistics and the success history
    pub fn zero_statistics(&mut self) {
        info!("Link statistics cleared");
        self.gaps.reset();
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_bound(&self) -> bool {
        self.pipes.is_bound()
    }

    pub fn model_matched(&self) -> bool {
        self.model_matched
    }

    pub fn pipes(&self) -> &PipeManager {
        &self.pipes
    }

    /// Radio channel currently tuned
    pub fn radio_channel(&self) -> u8 {
        self.hops.current_channel()
    }

    /// Rolling delivery rate, 0-100
    pub fn quality_percent(&self) -> u8 {
        self.gaps.quality_percent()
    }

    pub fn gap_stats(&self) -> GapStats {
        self.gaps.stats()
    }

    pub fn current_gap_ms(&self, now_ms: u64) -> u64 {
        self.gaps.current_gap_ms(now_ms)
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Parameter queue entries waiting, repeats included
    pub fn parameters_pending(&self) -> usize {
        self.parameters.len()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn snapshot(&self, now_ms: u64) -> LinkSnapshot {
        LinkSnapshot {
            state: self.state,
            bound: self.pipes.is_bound(),
            model_matched: self.model_matched,
            radio_channel: self.hops.current_channel(),
            quality_percent: self.gaps.quality_percent(),
            consecutive_failures: self.consecutive_failures,
            current_gap_ms: self.gaps.current_gap_ms(now_ms),
            gaps: self.gaps.stats(),
            parameters_pending: self.parameters.len(),
            telemetry: self.telemetry,
        }
    }
}
