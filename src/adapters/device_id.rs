//! Device identity from the MCU's 128-bit factory serial number.
//!
//! The serial number is read as four 32-bit words (lowest address first).
//! The control loop renders it as 32 uppercase hex digits; when the words
//! cannot be read the device runs with the identity `unknown`.

use crate::app::ports::IdentityPort;

/// Serial number source for the simulator.
pub struct SimIdentity {
    words: Option<[u32; 4]>,
}

impl SimIdentity {
    /// Deterministic fake serial number.
    pub fn new() -> Self {
        Self::with_words([0x5E45_E000, 0x0001_C0DE, 0xDEAD_BEEF, 0x0000_002A])
    }

    pub fn with_words(words: [u32; 4]) -> Self {
        Self { words: Some(words) }
    }

    /// A board whose serial number region reads back garbage.
    pub fn unreadable() -> Self {
        Self { words: None }
    }
}

impl Default for SimIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityPort for SimIdentity {
    fn unique_id(&mut self) -> Option<[u32; 4]> {
        self.words
    }
}
