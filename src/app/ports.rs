//! Port traits — the boundary between the control loop and the board.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Device (domain)
//! ```
//!
//! Driven adapters (RTC, power, storage, configuration, identity, event
//! sinks) implement these traits.  The [`Device`](super::service::Device)
//! consumes them via generics, so the control logic never touches
//! registers directly and tests can assemble a board from mocks.

use core::fmt;

use crate::config::DeviceConfig;
use crate::error::{ConfigError, StorageError};
use crate::power::WakeSource;

// ───────────────────────────────────────────────────────────────
// Real-time clock
// ───────────────────────────────────────────────────────────────

/// Battery-backed RTC with a single alarm.
pub trait RtcPort {
    /// Current epoch seconds.  Meaningless until set (see
    /// [`crate::time::is_synced`]).
    fn epoch(&self) -> u32;

    fn set_epoch(&mut self, epoch: u32);

    /// Fire the alarm interrupt `secs` seconds from now.
    fn arm_alarm(&mut self, secs: u32);
}

// ───────────────────────────────────────────────────────────────
// Power
// ───────────────────────────────────────────────────────────────

pub trait PowerPort {
    /// Halt the CPU until an interrupt fires; report what woke it.
    fn standby(&mut self) -> WakeSource;
}

// ───────────────────────────────────────────────────────────────
// Storage (SD card)
// ───────────────────────────────────────────────────────────────

/// Named files the firmware keeps on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileId {
    Config,
    /// Rolling debug log.
    Debug,
    /// Cached companion/device info.
    Info,
    /// Tabular sensor log.
    Monitor,
}

impl FileId {
    pub fn name(self) -> &'static str {
        match self {
            Self::Config => "CONFIG.TXT",
            Self::Debug => "DEBUG.TXT",
            Self::Info => "INFO.TXT",
            Self::Monitor => "MONITOR.CSV",
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// File storage on the removable card.
pub trait StoragePort {
    /// (Re)initialise the card.  Fails when no card is inserted.
    fn init(&mut self) -> Result<(), StorageError>;

    /// A card is inserted and initialised.
    fn card_present(&self) -> bool;

    /// Create `file` if it does not exist.
    fn open(&mut self, file: FileId) -> Result<(), StorageError>;

    fn exists(&self, file: FileId) -> bool;

    fn append(&mut self, file: FileId, data: &[u8]) -> Result<(), StorageError>;

    /// Replace the contents of `file`.
    fn write(&mut self, file: FileId, data: &[u8]) -> Result<(), StorageError>;

    /// Read from the start of `file`.  Returns the number of bytes copied.
    fn read(&self, file: FileId, buf: &mut [u8]) -> Result<usize, StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`DeviceConfig`].
///
/// Implementations MUST validate before persisting and reject invalid
/// values with [`ConfigError::ValidationFailed`] rather than clamping.
pub trait ConfigPort {
    /// Stored configuration, or the default when none was ever saved.
    fn load(&mut self) -> Result<DeviceConfig, ConfigError>;

    fn save(&mut self, config: &DeviceConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Identity
// ───────────────────────────────────────────────────────────────

pub trait IdentityPort {
    /// 128-bit factory serial number, `None` if it cannot be read.
    fn unique_id(&mut self) -> Option<[u32; 4]>;
}

// ───────────────────────────────────────────────────────────────
// Event sink
// ───────────────────────────────────────────────────────────────

/// The device emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Board
// ───────────────────────────────────────────────────────────────

/// Everything the control loop needs from the hardware in one bound.
pub trait Board: RtcPort + PowerPort + StoragePort + ConfigPort + IdentityPort {}

impl<T> Board for T where T: RtcPort + PowerPort + StoragePort + ConfigPort + IdentityPort {}
