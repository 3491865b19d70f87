//! # Telemetry Module
//!
//! Receiver telemetry carried back in ack payloads, and its log files.
//!
//! This module handles:
//! - Demultiplexing the 6-byte ack payload into telemetry fields
//! - Assembling the peer's hardware identity for model matching
//! - Writing snapshots to rotating JSONL files

pub mod ack;
pub mod logger;

pub use ack::{AckPurpose, GpsTelemetry, Telemetry};
pub use logger::TelemetryLogger;
