//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (serial console on the board, `env_logger` in the
//! simulator).  A radio or card-backed sink would implement the same trait.

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the console.
pub struct LogEventSink {
    emitted: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self { emitted: 0 }
    }

    /// Events seen since construction.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        self.emitted = self.emitted.wrapping_add(1);
        match event {
            AppEvent::Started { mode, id } => {
                info!("START | id={} mode={}", id, mode);
            }
            AppEvent::ModeChanged { from, to } => {
                info!("MODE  | {} -> {}", from, to);
            }
            AppEvent::SetupEntered => info!("SETUP | entered"),
            AppEvent::SetupExited => info!("SETUP | exited"),
            AppEvent::OperationFailed(op) => {
                error!("FAIL  | {:?} retry budget exhausted", op);
            }
            AppEvent::Published { to_card } => {
                info!("PUB   | {}", if *to_card { "card" } else { "network" });
            }
            AppEvent::NoCard => warn!("CARD  | mode needs a card, none inserted"),
            AppEvent::StorageDegraded => warn!("CARD  | storage unavailable"),
            AppEvent::SleepDeferred(reason) => info!("SLEEP | deferred: {}", reason),
            AppEvent::Slept { secs } => info!("SLEEP | {}s", secs),
            AppEvent::Woke(source) => info!("WAKE  | {:?}", source),
            AppEvent::ConfigReset => warn!("CONF  | factory defaults restored"),
        }
    }
}
