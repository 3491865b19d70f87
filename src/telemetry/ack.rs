//! # Ack Telemetry Demux
//!
//! Every delivered packet comes back with a 6-byte ack payload. Its selector
//! names one telemetry field and the 4 data bytes carry that field's value:
//!
//! | Kind | Layout of bytes 1-4 |
//! |------|---------------------|
//! | counters, identity halves | `u32` little-endian |
//! | voltages, altitude, GPS coordinates... | `f32` little-endian |
//! | GPS time/date | three `u8` fields |
//! | version, satellites | `u8` fields |
//!
//! The hop flag and next-hop byte are handled by the link engine before the
//! payload reaches [`Telemetry::decode`].

use serde::Serialize;
use tracing::debug;

use crate::error::{RcLinkError, Result};
use crate::wire::protocol::AckPayload;

/// Ack payload field selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum AckPurpose {
    ReceiverVersion = 1,
    GoodPackets = 2,
    LostPackets = 3,
    RadioSwaps = 4,
    ConnectedSeconds = 5,
    RxVoltage = 6,
    Altitude = 7,
    Temperature = 8,
    GpsLatitude = 9,
    GpsLongitude = 10,
    GpsCourse = 11,
    GpsSpeed = 12,
    GpsSatellites = 13,
    GpsAltitude = 14,
    GpsDistance = 15,
    GpsTime = 16,
    GpsDate = 17,
    RotorRpm = 18,
    IdentityLow = 19,
    IdentityHigh = 20,
    Pressure = 21,
}

impl AckPurpose {
    /// Every selector, in numeric order
    pub const ALL: [AckPurpose; 21] = [
        AckPurpose::ReceiverVersion,
        AckPurpose::GoodPackets,
        AckPurpose::LostPackets,
        AckPurpose::RadioSwaps,
        AckPurpose::ConnectedSeconds,
        AckPurpose::RxVoltage,
        AckPurpose::Altitude,
        AckPurpose::Temperature,
        AckPurpose::GpsLatitude,
        AckPurpose::GpsLongitude,
        AckPurpose::GpsCourse,
        AckPurpose::GpsSpeed,
        AckPurpose::GpsSatellites,
        AckPurpose::GpsAltitude,
        AckPurpose::GpsDistance,
        AckPurpose::GpsTime,
        AckPurpose::GpsDate,
        AckPurpose::RotorRpm,
        AckPurpose::IdentityLow,
        AckPurpose::IdentityHigh,
        AckPurpose::Pressure,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for AckPurpose {
    type Error = RcLinkError;

    fn try_from(selector: u8) -> Result<Self> {
        match selector {
            1..=21 => Ok(AckPurpose::ALL[(selector - 1) as usize]),
            _ => Err(RcLinkError::Protocol(format!(
                "unknown ack selector {}",
                selector
            ))),
        }
    }
}

/// GPS fix reported by the receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GpsTelemetry {
    pub latitude: Option<f32>,
    pub longitude: Option<f32>,
    /// Degrees
    pub course: Option<f32>,
    /// Metres per second
    pub speed: Option<f32>,
    pub satellites: Option<u8>,
    pub fix: Option<bool>,
    /// Metres above sea level
    pub altitude: Option<f32>,
    /// Metres from home
    pub distance: Option<f32>,
    /// Hour, minute, second (UTC)
    pub time: Option<[u8; 3]>,
    /// Day, month, year since 2000
    pub date: Option<[u8; 3]>,
}

/// Latest value of every telemetry field; `None` until first received
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Telemetry {
    pub receiver_version: Option<u8>,
    pub good_packets: Option<u32>,
    pub lost_packets: Option<u32>,
    pub radio_swaps: Option<u32>,
    pub connected_seconds: Option<u32>,
    /// Volts
    pub rx_voltage: Option<f32>,
    /// Metres, barometric
    pub altitude: Option<f32>,
    /// Degrees Celsius
    pub temperature: Option<f32>,
    /// hPa
    pub pressure: Option<f32>,
    pub rotor_rpm: Option<u32>,
    pub gps: GpsTelemetry,
    identity_low: Option<u32>,
    identity_high: Option<u32>,
    pub acks_decoded: u64,
    pub unknown_selectors: u64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one ack payload
    ///
    /// Only the 7-bit selector is interpreted; the hop bit is ignored here.
    /// Unknown selectors are counted and otherwise skipped.
    ///
    /// # Returns
    ///
    /// * `Option<AckPurpose>` - Field that was updated
    pub fn decode(&mut self, payload: &AckPayload) -> Option<AckPurpose> {
        self.acks_decoded += 1;

        let purpose = match AckPurpose::try_from(payload.selector()) {
            Ok(purpose) => purpose,
            Err(e) => {
                self.unknown_selectors += 1;
                debug!("Ignoring ack: {}", e);
                return None;
            }
        };

        let data = payload.data();
        let int = u32::from_le_bytes(data);
        let float = f32::from_le_bytes(data);

        match purpose {
            AckPurpose::ReceiverVersion => self.receiver_version = Some(data[0]),
            AckPurpose::GoodPackets => self.good_packets = Some(int),
            AckPurpose::LostPackets => self.lost_packets = Some(int),
            AckPurpose::RadioSwaps => self.radio_swaps = Some(int),
            AckPurpose::ConnectedSeconds => self.connected_seconds = Some(int),
            AckPurpose::RxVoltage => self.rx_voltage = Some(float),
            AckPurpose::Altitude => self.altitude = Some(float),
            AckPurpose::Temperature => self.temperature = Some(float),
            AckPurpose::GpsLatitude => self.gps.latitude = Some(float),
            AckPurpose::GpsLongitude => self.gps.longitude = Some(float),
            AckPurpose::GpsCourse => self.gps.course = Some(float),
            AckPurpose::GpsSpeed => self.gps.speed = Some(float),
            AckPurpose::GpsSatellites => {
                self.gps.satellites = Some(data[0]);
                self.gps.fix = Some(data[1] != 0);
            }
            AckPurpose::GpsAltitude => self.gps.altitude = Some(float),
            AckPurpose::GpsDistance => self.gps.distance = Some(float),
            AckPurpose::GpsTime => self.gps.time = Some([data[0], data[1], data[2]]),
            AckPurpose::GpsDate => self.gps.date = Some([data[0], data[1], data[2]]),
            AckPurpose::RotorRpm => self.rotor_rpm = Some(int),
            AckPurpose::IdentityLow => self.identity_low = Some(int),
            AckPurpose::IdentityHigh => self.identity_high = Some(int),
            AckPurpose::Pressure => self.pressure = Some(float),
        }

        Some(purpose)
    }

    /// The peer's 64-bit hardware identity, once both halves have arrived
    pub fn identity(&self) -> Option<u64> {
        match (self.identity_high, self.identity_low) {
            (Some(high), Some(low)) => Some(((high as u64) << 32) | low as u64),
            _ => None,
        }
    }

    /// Whether the assembled identity equals `expected`
    pub fn identity_matches(&self, expected: u64) -> bool {
        self.identity() == Some(expected)
    }
}

/// Split a 64-bit identity into the (low, high) ack data words
pub fn identity_halves(identity: u64) -> ([u8; 4], [u8; 4]) {
    (
        (identity as u32).to_le_bytes(),
        ((identity >> 32) as u32).to_le_bytes(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(purpose: AckPurpose, data: [u8; 4]) -> AckPayload {
        AckPayload::new(purpose.as_u8(), data, 0, false)
    }

    #[test]
    fn test_selector_round_trip() {
        for purpose in AckPurpose::ALL {
            assert_eq!(AckPurpose::try_from(purpose.as_u8()).unwrap(), purpose);
        }
        assert!(AckPurpose::try_from(0).is_err());
        assert!(AckPurpose::try_from(22).is_err());
        assert!(AckPurpose::try_from(127).is_err());
    }

    #[test]
    fn test_integer_fields() {
        let mut telemetry = Telemetry::new();
        telemetry.decode(&ack(AckPurpose::GoodPackets, 123_456u32.to_le_bytes()));
        telemetry.decode(&ack(AckPurpose::LostPackets, 42u32.to_le_bytes()));
        telemetry.decode(&ack(AckPurpose::RotorRpm, 11_000u32.to_le_bytes()));

        assert_eq!(telemetry.good_packets, Some(123_456));
        assert_eq!(telemetry.lost_packets, Some(42));
        assert_eq!(telemetry.rotor_rpm, Some(11_000));
        assert_eq!(telemetry.acks_decoded, 3);
    }

    #[test]
    fn test_float_fields() {
        let mut telemetry = Telemetry::new();
        telemetry.decode(&ack(AckPurpose::RxVoltage, 7.4f32.to_le_bytes()));
        telemetry.decode(&ack(AckPurpose::GpsLatitude, 51.4779f32.to_le_bytes()));
        telemetry.decode(&ack(AckPurpose::Temperature, (-3.5f32).to_le_bytes()));

        assert_eq!(telemetry.rx_voltage, Some(7.4));
        assert_eq!(telemetry.gps.latitude, Some(51.4779));
        assert_eq!(telemetry.temperature, Some(-3.5));
    }

    #[test]
    fn test_byte_fields() {
        let mut telemetry = Telemetry::new();
        telemetry.decode(&ack(AckPurpose::GpsTime, [14, 30, 5, 0]));
        telemetry.decode(&ack(AckPurpose::GpsDate, [18, 10, 26, 0]));
        telemetry.decode(&ack(AckPurpose::GpsSatellites, [9, 1, 0, 0]));
        telemetry.decode(&ack(AckPurpose::ReceiverVersion, [3, 0, 0, 0]));

        assert_eq!(telemetry.gps.time, Some([14, 30, 5]));
        assert_eq!(telemetry.gps.date, Some([18, 10, 26]));
        assert_eq!(telemetry.gps.satellites, Some(9));
        assert_eq!(telemetry.gps.fix, Some(true));
        assert_eq!(telemetry.receiver_version, Some(3));
    }

    #[test]
    fn test_hop_bit_does_not_change_field() {
        let mut telemetry = Telemetry::new();
        let payload = AckPayload::new(AckPurpose::Altitude.as_u8(), 120.0f32.to_le_bytes(), 9, true);
        assert_eq!(telemetry.decode(&payload), Some(AckPurpose::Altitude));
        assert_eq!(telemetry.altitude, Some(120.0));
    }

    #[test]
    fn test_unknown_selector_counted() {
        let mut telemetry = Telemetry::new();
        assert_eq!(telemetry.decode(&AckPayload([0x7F, 1, 2, 3, 4, 0])), None);
        assert_eq!(telemetry.decode(&AckPayload([0, 1, 2, 3, 4, 0])), None);
        assert_eq!(telemetry.unknown_selectors, 2);
        assert_eq!(telemetry.acks_decoded, 2);
    }

    #[test]
    fn test_identity_needs_both_halves() {
        let id = 0x0123_4567_89AB_CDEF;
        let (low, high) = identity_halves(id);
        let mut telemetry = Telemetry::new();

        telemetry.decode(&ack(AckPurpose::IdentityLow, low));
        assert_eq!(telemetry.identity(), None);
        assert!(!telemetry.identity_matches(id));

        telemetry.decode(&ack(AckPurpose::IdentityHigh, high));
        assert_eq!(telemetry.identity(), Some(id));
        assert!(telemetry.identity_matches(id));
        assert!(!telemetry.identity_matches(id + 1));
    }
}
