//! # FHSS Hop Schedule
//!
//! The fixed hop table shared with the receiver and the cursor that walks it.
//!
//! In normal operation the receiver picks the next hop: every ack payload
//! carries a 7-bit table index, and the transmitter moves only when the ack
//! also sets the "hop now" flag. Both ends therefore sit on the same table
//! entry without a shared clock.
//!
//! After contact is lost the transmitter cycles through three recovery
//! channels, one per reconnection attempt, while the receiver does the same on
//! its side. Resynchronisation takes at most three hops.

/// Hop table (radio channel numbers). Order is a compatibility contract with
/// the receiver.
#[rustfmt::skip]
pub const HOP_TABLE: [u8; 83] = [
     79,  13,   3, 118,  89,  22, 122,  14,  92,  99,  18,  25,
     42, 101,  51, 105,  67, 107,  66,  27, 119,  93,  85,  61,
     76, 114,  77,  16,  24,  37,  12, 124,  73,  44,  11,  41,
    120,  19,  84,  45,  71,  30, 102,  23,  15,  88,   5,  54,
     80,  90,  40,  10,  72,  43,  50,  46, 103,  74,  86, 116,
      2,  83,   7,  68,  96,   9,  26,  49,  70,  75,  33, 123,
     98, 117,  81,  57,  48,  21,  36,  32,  82, 121,  62,
];

/// Positions in [`HOP_TABLE`] used as recovery channels
pub const RECOVERY_POSITIONS: [usize; 3] = [5, 31, 40];

/// Hop table cursor plus recovery cycling
#[derive(Debug, Clone)]
pub struct HopSchedule {
    next_index: usize,
    recovery_cursor: usize,
    current_channel: u8,
}

impl Default for HopSchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl HopSchedule {
    /// Start on the first recovery channel, where an unsynchronised receiver listens
    pub fn new() -> Self {
        Self {
            next_index: RECOVERY_POSITIONS[0],
            recovery_cursor: 0,
            current_channel: HOP_TABLE[RECOVERY_POSITIONS[0]],
        }
    }

    /// Radio channel the transmitter is on
    pub fn current_channel(&self) -> u8 {
        self.current_channel
    }

    /// Table index the next peer-requested hop goes to
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Record the next hop index announced by the receiver
    ///
    /// Returns `false` (and keeps the old index) if `index` is past the table.
    pub fn set_next(&mut self, index: u8) -> bool {
        let index = index as usize;
        if index >= HOP_TABLE.len() {
            return false;
        }
        self.next_index = index;
        true
    }

    /// Move to the announced entry and return its radio channel
    ///
    /// Always reports a hop, even onto the channel already in use: the caller
    /// must still cycle the radio to keep the timing window aligned.
    pub fn hop_now(&mut self) -> u8 {
        self.current_channel = HOP_TABLE[self.next_index];
        self.current_channel
    }

    /// Advance to the next recovery channel (wrapping) and return it
    pub fn recovery_hop(&mut self) -> u8 {
        self.recovery_cursor = (self.recovery_cursor + 1) % RECOVERY_POSITIONS.len();
        self.current_channel = HOP_TABLE[RECOVERY_POSITIONS[self.recovery_cursor]];
        self.current_channel
    }

    /// Restart recovery cycling from the first recovery channel
    pub fn reset_recovery(&mut self) {
        self.recovery_cursor = 0;
    }

    /// Recovery channels in cycling order
    pub fn recovery_channels() -> [u8; 3] {
        RECOVERY_POSITIONS.map(|position| HOP_TABLE[position])
    }
}
