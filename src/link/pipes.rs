//! # Pipe / Binding Manager
//!
//! The transmitter writes to one of two radio addresses:
//!
//! - **Default**: a fixed address every unbound receiver listens on
//! - **Identity**: derived from this transmitter's hardware id
//!
//! While unbound, each failed write flips between the two, so an unbound pair
//! meets on whichever address the other side is using. The first delivered
//! packet binds the link and latches the Identity address for good.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Well-known address used before binding (40 bits)
pub const DEFAULT_PIPE_ADDRESS: u64 = 0xE7_E7E7_E7E7;

/// Address width on air
pub const PIPE_ADDRESS_BYTES: usize = 5;

/// Per-nibble replacement for values the radio handles poorly in addresses.
///
/// 0x0, 0x1, 0x2, 0x5, 0xA and 0xF map to the nearest safe nibble; the rest
/// map to themselves.
const NIBBLE_SUBSTITUTION: [u8; 16] = [
    0x3, 0x3, 0x3, 0x3, 0x4, 0x6, 0x6, 0x7, 0x8, 0x9, 0xB, 0xB, 0xC, 0xD, 0xE, 0xE,
];

/// Which address the transmitter writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivePipe {
    Default,
    Identity,
}

impl ActivePipe {
    fn other(self) -> Self {
        match self {
            ActivePipe::Default => ActivePipe::Identity,
            ActivePipe::Identity => ActivePipe::Default,
        }
    }
}

/// Replace unreliable nibbles in one address byte
///
/// # Examples
///
/// ```
/// use rc_link::link::pipes::sanitize_address_byte;
///
/// assert_eq!(sanitize_address_byte(0x00), 0x33);
/// assert_eq!(sanitize_address_byte(0x5A), 0x6B);
/// assert_eq!(sanitize_address_byte(0x47), 0x47);
/// ```
pub fn sanitize_address_byte(byte: u8) -> u8 {
    let high = NIBBLE_SUBSTITUTION[(byte >> 4) as usize];
    let low = NIBBLE_SUBSTITUTION[(byte & 0x0F) as usize];
    (high << 4) | low
}

/// Derive the Identity address from a hardware-unique byte string
///
/// Takes the first five bytes (zero-padded when shorter), sanitizes each and
/// assembles them little-endian.
pub fn identity_address(hardware_id: &[u8]) -> u64 {
    let mut address = 0u64;
    for i in 0..PIPE_ADDRESS_BYTES {
        let byte = hardware_id.get(i).copied().unwrap_or(0);
        address |= (sanitize_address_byte(byte) as u64) << (8 * i);
    }
    address
}

/// Holds both addresses and the binding latch
#[derive(Debug, Clone)]
pub struct PipeManager {
    default_address: u64,
    identity_address: u64,
    active: ActivePipe,
    bound: bool,
}

impl PipeManager {
    /// Creates an unbound manager
    ///
    /// # Arguments
    ///
    /// * `default_address` - Shared pre-binding address
    /// * `hardware_id` - Unique id of this transmitter
    /// * `initial` - Address to try first
    pub fn new(default_address: u64, hardware_id: &[u8], initial: ActivePipe) -> Self {
        let identity_address = identity_address(hardware_id);
        debug!("Identity pipe 0x{:010X}", identity_address);
        Self {
            default_address,
            identity_address,
            active: initial,
            bound: false,
        }
    }

    /// Currently selected pipe
    pub fn active(&self) -> ActivePipe {
        self.active
    }

    /// Address of the currently selected pipe
    pub fn active_address(&self) -> u64 {
        match self.active {
            ActivePipe::Default => self.default_address,
            ActivePipe::Identity => self.identity_address,
        }
    }

    /// The hardware-derived address
    pub fn identity(&self) -> u64 {
        self.identity_address
    }

    /// Whether binding has completed
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Flip to the other address after a failed write
    ///
    /// Does nothing once bound. Returns the pipe now active.
    pub fn toggle(&mut self) -> ActivePipe {
        if !self.bound {
            self.active = self.active.other();
        }
        self.active
    }

    /// Latch onto the Identity address
    pub fn bind(&mut self) {
        if !self.bound {
            info!("Bound on identity pipe 0x{:010X}", self.identity_address);
        }
        self.bound = true;
        self.active = ActivePipe::Identity;
    }
}
