//! # RC Link
//!
//! Runs the link engine against a simulated receiver.
//!
//! The binary stands in for the rest of the transmitter: a synthetic stick
//! sweep plays the mixer, the simulated peer plays the receiver, and the
//! configured model identity plays model selection.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument, else `config/default.toml`)
//!    - Set up logging with tracing subscriber
//!    - Build the engine and the simulated peer
//!
//! 2. **Main Loop**
//!    - Poll the engine every millisecond; it transmits once per `tick_interval_ms`
//!    - Queue all parameter records once the peer matches the model
//!    - Log link status every few seconds and telemetry snapshots to JSONL
//!    - Stop on Ctrl+C or an inactivity power-down request
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! ```

use anyhow::{Context, Result};
use std::path::Path;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use rc_link::config::{Config, LoggingConfig};
use rc_link::link::pipes::identity_address;
use rc_link::link::{LinkEngine, Payload, TickReport};
use rc_link::radio::SimulatedRadio;
use rc_link::telemetry::TelemetryLogger;
use rc_link::wire::protocol::{ChannelBuffer, CHANNEL_VALUE_MAX, NUM_CHANNELS};

/// Used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Peer identity when the model names none
const DEMO_PEER_ID: u64 = 0x5EED_0000_C0DE_0001;

/// The simulated peer asks for a hop this often (deliveries)
const DEMO_HOP_EVERY: u64 = 4;

/// Write attempts the simulated peer ignores, to exercise recovery
const DEMO_OUTAGE: std::ops::Range<u64> = 2_000..2_150;

/// How often the run loop polls the engine
const POLL_INTERVAL_MS: u64 = 1;

/// Milliseconds between status log messages
const STATUS_INTERVAL_MS: u64 = 4_000;

/// Stick center on the 12-bit scale
const STICK_CENTER: f32 = 2048.0;

/// Stick deflection either side of center
const STICK_THROW: f32 = 800.0;

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let (config, loaded) = load_config(&path)?;

    let _guard = init_logging(&config.logging)?;
    info!("RC Link v{} starting...", env!("CARGO_PKG_VERSION"));
    if loaded {
        info!("Configuration loaded from {}", path);
    } else {
        warn!("{} not found, using built-in defaults", path);
    }

    let expected_peer = config.model.expected_peer_id()?.unwrap_or(DEMO_PEER_ID);
    let mut engine = build_engine(&config, expected_peer)?;

    let mut telemetry_log = if config.telemetry.enabled {
        Some(TelemetryLogger::new(&config.telemetry)?)
    } else {
        None
    };

    let start = Instant::now();
    let clock = || start.elapsed().as_millis() as u64;

    let mut ticker = interval(Duration::from_millis(POLL_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status = interval(Duration::from_millis(STATUS_INTERVAL_MS));
    let mut log_timer = interval(Duration::from_millis(config.telemetry.log_interval_ms));

    let mut parameters_queued = false;
    let mut ticks: u64 = 0;

    info!(
        "Starting link loop at {} ms per tick",
        config.link.tick_interval_ms
    );
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = clock();
                let report = poll(&mut engine, now);
                if report.payload != Payload::Idle {
                    ticks += 1;
                }

                if !parameters_queued && engine.is_bound() && engine.check_model(expected_peer) {
                    let queued = engine.enqueue_all_parameters(now);
                    info!("Model matched, queued {} parameter records", queued);
                    parameters_queued = true;
                }

                if report.power_down {
                    warn!("Inactivity power-down requested, stopping");
                    break;
                }
            }

            _ = status.tick() => {
                let snapshot = engine.snapshot(clock());
                info!(
                    "{:?} on channel {}: quality {}%, {} gaps (longest {} ms), {} parameters pending",
                    snapshot.state,
                    snapshot.radio_channel,
                    snapshot.quality_percent,
                    snapshot.gaps.count,
                    snapshot.gaps.longest_ms,
                    snapshot.parameters_pending
                );
            }

            _ = log_timer.tick(), if telemetry_log.is_some() => {
                if let Some(logger) = telemetry_log.as_mut() {
                    if let Err(e) = logger.log(&engine.snapshot(clock())) {
                        warn!("Telemetry log write failed: {}", e);
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let stats = engine.gap_stats();
    info!(
        "Total ticks: {}, delivered {}, lost {}",
        ticks, stats.good_packets, stats.lost_packets
    );
    Ok(())
}

/// Load the config file, or defaults if it does not exist
///
/// Returns whether the file was read.
fn load_config(path: &str) -> Result<(Config, bool)> {
    if !Path::new(path).exists() {
        return Ok((Config::default(), false));
    }
    let config = Config::load(path).with_context(|| format!("Failed to load {}", path))?;
    Ok((config, true))
}

/// Console logging, plus a daily-rolling file when `file_dir` is set
///
/// The returned guard flushes the file writer and must outlive the program.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = match &config.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rc-link.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;

    Ok(guard)
}

/// Engine wired to a simulated receiver listening on our identity pipe
fn build_engine(config: &Config, peer_id: u64) -> Result<LinkEngine<SimulatedRadio>> {
    let listen = identity_address(&config.link.hardware_id_bytes()?);
    let mut radio = SimulatedRadio::new(listen, peer_id).with_hop_every(DEMO_HOP_EVERY);
    radio.add_outage(DEMO_OUTAGE);

    Ok(LinkEngine::new(radio, config, 0)?)
}

/// One pass of the run loop: feed the sticks, then let the engine decide
/// whether this call transmits
fn poll(engine: &mut LinkEngine<SimulatedRadio>, now_ms: u64) -> TickReport {
    engine.update_channels(&stick_sweep(now_ms), now_ms);
    engine.on_tick(now_ms)
}

/// Synthetic stick input: the four flight axes sweep, aux switches flip
fn stick_sweep(now_ms: u64) -> ChannelBuffer {
    let t = now_ms as f32 / 1000.0;
    let mut channels = [STICK_CENTER as u16; NUM_CHANNELS];

    for (axis, value) in channels.iter_mut().take(4).enumerate() {
        let period_s = 2.0 + axis as f32;
        let phase = std::f32::consts::TAU * t / period_s;
        *value = (STICK_CENTER + STICK_THROW * phase.sin()) as u16;
    }

    for (switch, value) in channels.iter_mut().enumerate().skip(4) {
        let high = (now_ms / (1_000 * switch as u64)) % 2 == 1;
        *value = if high { CHANNEL_VALUE_MAX } else { 0 };
    }

    channels
}
