//! Outbound application events.
//!
//! The [`Device`](super::service::Device) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them: log to serial, append to the debug file,
//! count them in a test.

use crate::power::{SleepRefusal, WakeSource};
use crate::state::{Mode, Operation};

/// Structured events emitted by the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Device finished boot bookkeeping.
    Started { mode: Mode, id: heapless::String<32> },

    ModeChanged { from: Mode, to: Mode },

    SetupEntered,
    SetupExited,

    /// A retry budget was exhausted.
    OperationFailed(Operation),

    /// A reading left the device (network or card).
    Published { to_card: bool },

    /// Mode needs a card and none is inserted.
    NoCard,

    /// Card storage could not be initialised; local logging disabled.
    StorageDegraded,

    SleepDeferred(SleepRefusal),
    Slept { secs: u32 },
    Woke(WakeSource),

    /// Factory defaults restored.
    ConfigReset,
}
