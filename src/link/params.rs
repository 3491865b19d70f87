//! # Parameter Multiplexer
//!
//! Out-of-band model parameters (fail-safe mask, barometric reference, servo
//! tables, stabilisation gains) share packet slots with channel data.
//!
//! ## Queue
//!
//! Requests go onto a bounded LIFO stack, each pushed `repeat_count` times so
//! a lost packet or two does not lose the parameter. Duplicates are kept.
//!
//! ## Pacing
//!
//! Parameters only go out inside a short window (e.g. 5 ms) that reopens
//! every period (e.g. 50 ms). Inside the window one record replaces the
//! channel packet per tick; outside it, channel data flows untouched. Records
//! left when the window closes wait for the next one.
//!
//! ## Record layout
//!
//! Each record is an id plus 11 words, packed with the 12-bit channel codec.
//! Floats travel as their 4 little-endian bytes, one byte per word.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ParameterConfig;
use crate::error::{RcLinkError, Result};
use crate::wire::protocol::{clamp_channel_value, PARAMETER_WORDS};

/// Highest known parameter id
pub const MAX_PARAMETER_ID: u16 = 26;

/// Servo outputs configurable through parameter records
pub const SERVO_OUTPUTS: usize = PARAMETER_WORDS;

/// Parameter record identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum ParameterId {
    FailSafeChannels = 1,
    Qnh = 2,
    GpsMarkHere = 3,
    ServoFrequencies = 4,
    ServoPulseWidths = 5,
    PitchPidA = 6,
    PitchPidB = 7,
    RollPidA = 8,
    RollPidB = 9,
    YawPidA = 10,
    YawPidB = 11,
    LevelPidA = 12,
    LevelPidB = 13,
    AltitudePidA = 14,
    AltitudePidB = 15,
    StabilisationMode = 16,
    RateLimits = 17,
    BatteryAlarm = 18,
    RotorPoles = 19,
    GpsResetHome = 20,
    ResetCounters = 21,
    ServoRangeMin = 22,
    ServoRangeMax = 23,
    ServoReverse = 24,
    FailSafeTimeout = 25,
    OutputMap = 26,
}

impl ParameterId {
    /// Every id, in numeric order
    pub const ALL: [ParameterId; MAX_PARAMETER_ID as usize] = [
        ParameterId::FailSafeChannels,
        ParameterId::Qnh,
        ParameterId::GpsMarkHere,
        ParameterId::ServoFrequencies,
        ParameterId::ServoPulseWidths,
        ParameterId::PitchPidA,
        ParameterId::PitchPidB,
        ParameterId::RollPidA,
        ParameterId::RollPidB,
        ParameterId::YawPidA,
        ParameterId::YawPidB,
        ParameterId::LevelPidA,
        ParameterId::LevelPidB,
        ParameterId::AltitudePidA,
        ParameterId::AltitudePidB,
        ParameterId::StabilisationMode,
        ParameterId::RateLimits,
        ParameterId::BatteryAlarm,
        ParameterId::RotorPoles,
        ParameterId::GpsResetHome,
        ParameterId::ResetCounters,
        ParameterId::ServoRangeMin,
        ParameterId::ServoRangeMax,
        ParameterId::ServoReverse,
        ParameterId::FailSafeTimeout,
        ParameterId::OutputMap,
    ];

    /// Wire value
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for ParameterId {
    type Error = RcLinkError;

    fn try_from(raw: u16) -> Result<Self> {
        match raw {
            1..=MAX_PARAMETER_ID => Ok(ParameterId::ALL[(raw - 1) as usize]),
            _ => Err(RcLinkError::InvalidParameter(raw)),
        }
    }
}

/// PID gains, sent as two records (kp/ki, then kd/integral limit)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub i_limit: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.5,
            ki: 0.05,
            kd: 0.02,
            i_limit: 100.0,
        }
    }
}

/// Stabilisation switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct StabilisationFlags {
    pub enabled: bool,
    pub self_level: bool,
    pub altitude_hold: bool,
    pub mode: u8,
}

/// Model-specific values the parameter records are built from
///
/// Supplied by persistent model storage; the link only reads it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelParameters {
    /// Bit per channel: hold last value (1) or go to fail-safe position (0)
    pub failsafe_channels: u16,
    /// Barometric reference in hPa
    pub qnh_hpa: f32,
    pub servo_frequencies: [u16; SERVO_OUTPUTS],
    pub servo_pulse_widths: [u16; SERVO_OUTPUTS],
    pub pitch_pid: PidGains,
    pub roll_pid: PidGains,
    pub yaw_pid: PidGains,
    pub level_pid: PidGains,
    pub altitude_pid: PidGains,
    pub stabilisation: StabilisationFlags,
    /// Max roll/pitch/yaw rates in deg/s
    pub rate_limits: [u16; 3],
    pub battery_cells: u8,
    /// Low-voltage alarm per cell, centivolts
    pub battery_alarm_centivolts: u16,
    pub rotor_poles: u16,
    pub servo_min: [u16; SERVO_OUTPUTS],
    pub servo_max: [u16; SERVO_OUTPUTS],
    /// Bit per servo output
    pub servo_reverse: u16,
    pub failsafe_timeout_ms: u16,
    /// Source channel for each receiver output
    pub output_map: [u8; SERVO_OUTPUTS],
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            failsafe_channels: 0,
            qnh_hpa: 1013.25,
            servo_frequencies: [50; SERVO_OUTPUTS],
            servo_pulse_widths: [1500; SERVO_OUTPUTS],
            pitch_pid: PidGains::default(),
            roll_pid: PidGains::default(),
            yaw_pid: PidGains::default(),
            level_pid: PidGains::default(),
            altitude_pid: PidGains::default(),
            stabilisation: StabilisationFlags::default(),
            rate_limits: [360, 360, 180],
            battery_cells: 2,
            battery_alarm_centivolts: 340,
            rotor_poles: 14,
            servo_min: [1000; SERVO_OUTPUTS],
            servo_max: [2000; SERVO_OUTPUTS],
            servo_reverse: 0,
            failsafe_timeout_ms: 1000,
            output_map: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
        }
    }
}

/// One encoded parameter record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterRecord {
    pub id: ParameterId,
    pub words: [u16; PARAMETER_WORDS],
}

impl ParameterRecord {
    /// Encode the record for `id` from the model's current values
    pub fn build(id: ParameterId, model: &ModelParameters) -> Self {
        let mut words = [0u16; PARAMETER_WORDS];

        match id {
            ParameterId::FailSafeChannels => {
                words[0] = model.failsafe_channels & 0x00FF;
                words[1] = model.failsafe_channels >> 8;
            }
            ParameterId::Qnh => put_f32(&mut words, 0, model.qnh_hpa),
            ParameterId::GpsMarkHere | ParameterId::GpsResetHome | ParameterId::ResetCounters => {}
            ParameterId::ServoFrequencies => put_table(&mut words, &model.servo_frequencies),
            ParameterId::ServoPulseWidths => put_table(&mut words, &model.servo_pulse_widths),
            ParameterId::PitchPidA => put_pid_a(&mut words, &model.pitch_pid),
            ParameterId::PitchPidB => put_pid_b(&mut words, &model.pitch_pid),
            ParameterId::RollPidA => put_pid_a(&mut words, &model.roll_pid),
            ParameterId::RollPidB => put_pid_b(&mut words, &model.roll_pid),
            ParameterId::YawPidA => put_pid_a(&mut words, &model.yaw_pid),
            ParameterId::YawPidB => put_pid_b(&mut words, &model.yaw_pid),
            ParameterId::LevelPidA => put_pid_a(&mut words, &model.level_pid),
            ParameterId::LevelPidB => put_pid_b(&mut words, &model.level_pid),
            ParameterId::AltitudePidA => put_pid_a(&mut words, &model.altitude_pid),
            ParameterId::AltitudePidB => put_pid_b(&mut words, &model.altitude_pid),
            ParameterId::StabilisationMode => {
                let flags = &model.stabilisation;
                words[0] = flags.enabled as u16;
                words[1] = flags.self_level as u16;
                words[2] = flags.altitude_hold as u16;
                words[3] = flags.mode as u16;
            }
            ParameterId::RateLimits => put_table(&mut words, &model.rate_limits),
            ParameterId::BatteryAlarm => {
                words[0] = model.battery_cells as u16;
                words[1] = clamp_channel_value(model.battery_alarm_centivolts);
            }
            ParameterId::RotorPoles => words[0] = clamp_channel_value(model.rotor_poles),
            ParameterId::ServoRangeMin => put_table(&mut words, &model.servo_min),
            ParameterId::ServoRangeMax => put_table(&mut words, &model.servo_max),
            ParameterId::ServoReverse => words[0] = model.servo_reverse & 0x07FF,
            ParameterId::FailSafeTimeout => {
                words[0] = clamp_channel_value(model.failsafe_timeout_ms)
            }
            ParameterId::OutputMap => {
                for (word, &source) in words.iter_mut().zip(&model.output_map) {
                    *word = source as u16;
                }
            }
        }

        Self { id, words }
    }
}

/// Write `value` as four byte-words starting at `at`
fn put_f32(words: &mut [u16; PARAMETER_WORDS], at: usize, value: f32) {
    for (word, byte) in words[at..at + 4].iter_mut().zip(value.to_le_bytes()) {
        *word = byte as u16;
    }
}

/// Read a float written by `put_f32`
pub fn read_f32(words: &[u16; PARAMETER_WORDS], at: usize) -> f32 {
    let mut bytes = [0u8; 4];
    for (byte, &word) in bytes.iter_mut().zip(&words[at..at + 4]) {
        *byte = (word & 0x00FF) as u8;
    }
    f32::from_le_bytes(bytes)
}

fn put_table(words: &mut [u16; PARAMETER_WORDS], table: &[u16]) {
    for (word, &value) in words.iter_mut().zip(table) {
        *word = clamp_channel_value(value);
    }
}

fn put_pid_a(words: &mut [u16; PARAMETER_WORDS], pid: &PidGains) {
    put_f32(words, 0, pid.kp);
    put_f32(words, 4, pid.ki);
}

fn put_pid_b(words: &mut [u16; PARAMETER_WORDS], pid: &PidGains) {
    put_f32(words, 0, pid.kd);
    put_f32(words, 4, pid.i_limit);
}

/// Bounded LIFO of pending parameter ids plus the send window
#[derive(Debug, Clone)]
pub struct ParameterQueue {
    stack: Vec<u16>,
    capacity: usize,
    repeat_count: usize,
    window_ms: u64,
    window_period_ms: u64,
    window_open_until: Option<u64>,
    next_window_at: u64,
}

impl ParameterQueue {
    /// Creates an empty queue; storage is allocated once here
    pub fn new(config: &ParameterConfig) -> Self {
        Self {
            stack: Vec::with_capacity(config.queue_capacity),
            capacity: config.queue_capacity,
            repeat_count: config.repeat_count.max(1),
            window_ms: config.window_ms,
            window_period_ms: config.window_period_ms,
            window_open_until: None,
            next_window_at: 0,
        }
    }

    /// Queue `id` for sending, `repeat_count` times
    ///
    /// # Arguments
    ///
    /// * `id` - Raw parameter id
    /// * `link_ready` - Peer is bound and its model identity matched
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The link is not ready
    /// - `id` is zero
    /// - The queue cannot hold another `repeat_count` entries
    pub fn enqueue(&mut self, id: u16, link_ready: bool) -> Result<()> {
        if !link_ready {
            return Err(RcLinkError::LinkNotReady);
        }
        if id == 0 {
            return Err(RcLinkError::InvalidParameter(id));
        }

        let free = self.capacity - self.stack.len();
        if free < self.repeat_count {
            return Err(RcLinkError::ParameterQueueFull {
                requested: self.repeat_count,
                free,
            });
        }

        for _ in 0..self.repeat_count {
            self.stack.push(id);
        }
        debug!("Queued parameter {} x{} ({} pending)", id, self.repeat_count, self.stack.len());
        Ok(())
    }

    /// Pop the next record if the send window allows it
    ///
    /// The window check and the pop happen together: either a record comes
    /// back and the stack shrinks by one, or nothing changes. An id outside
    /// the known range is logged and dropped, and the caller sends channel
    /// data instead.
    pub fn dequeue_for_send(
        &mut self,
        now_ms: u64,
        model: &ModelParameters,
    ) -> Option<ParameterRecord> {
        if self.stack.is_empty() || !self.window_allows(now_ms) {
            return None;
        }

        let raw = self.stack.pop()?;
        match ParameterId::try_from(raw) {
            Ok(id) => Some(ParameterRecord::build(id, model)),
            Err(e) => {
                warn!("Dropping parameter request: {}", e);
                None
            }
        }
    }

    /// Open a window if one is due; report whether `now_ms` is inside it
    fn window_allows(&mut self, now_ms: u64) -> bool {
        if let Some(until) = self.window_open_until {
            if now_ms < until {
                return true;
            }
            self.window_open_until = None;
        }

        if now_ms >= self.next_window_at {
            self.window_open_until = Some(now_ms + self.window_ms);
            self.next_window_at = now_ms + self.window_period_ms;
            return true;
        }

        false
    }

    /// Entries waiting (repeats included)
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
