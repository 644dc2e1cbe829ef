//! Unified error types for the SenseKit firmware.
//!
//! Every subsystem reports failures through a small `Copy` enum that
//! converts into the top-level [`Error`].  The control loop never panics
//! on these: the mode machine decides what a failure means.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The companion link refused or failed an operation.
    Link(LinkError),
    /// A storage operation failed.
    Storage(StorageError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// A sensor could not produce a reading.
    Sensor(SensorError),
    /// A setup-only interaction was attempted outside setup.
    NotInSetup,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::NotInSetup => write!(f, "device is not in setup"),
        }
    }
}

// ---------------------------------------------------------------------------
// Companion link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Boot of the companion has not been confirmed.
    NotPowered,
    /// The outbound channel cannot accept a frame right now.
    Busy,
    /// Content does not fit the fixed message payload.
    PayloadTooLarge,
    /// The underlying byte transport reported an error.
    Transport,
    /// A payload could not be serialised.
    Encode,
    /// An inbound frame or payload was malformed.
    Decode,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPowered => write!(f, "companion not powered"),
            Self::Busy => write!(f, "outbound channel busy"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::Transport => write!(f, "transport error"),
            Self::Encode => write!(f, "encode failed"),
            Self::Decode => write!(f, "decode failed"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// No card in the slot, or the medium failed to initialise.
    NotAvailable,
    /// Requested file does not exist.
    NotFound,
    /// Medium is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAvailable => write!(f, "storage not available"),
            Self::NotFound => write!(f, "file not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialisation.
    Corrupted,
    /// A field failed range validation; the message names the field.
    ValidationFailed(&'static str),
    /// The backing storage failed.
    Storage(StorageError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// A measurement is in progress; ask again later.
    NotReady,
    /// The sensor failed to respond or returned garbage.
    Failed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "reading not ready"),
            Self::Failed => write!(f, "sensor failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

impl core::error::Error for Error {}
impl core::error::Error for LinkError {}
impl core::error::Error for StorageError {}
impl core::error::Error for ConfigError {}
impl core::error::Error for SensorError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
