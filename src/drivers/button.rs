//! Press classifier for the single user button.
//!
//! ## Hardware
//!
//! Active-low momentary switch with pull-up.  The GPIO interrupt fires on
//! both edges and pushes an [`IrqEvent::ButtonEdge`](crate::events::IrqEvent)
//! carrying the level and a timestamp.  All classification happens in the
//! main loop: [`ButtonClassifier::on_edge`] for drained edges and
//! [`ButtonClassifier::tick`] every iteration while the button is held.
//!
//! ## Classification
//!
//! | Held for                 | Classification | Action fires                    |
//! |--------------------------|----------------|---------------------------------|
//! | `< LONG_PRESS_MS`        | None           | nothing                         |
//! | `LONG ≤ d < VERY_LONG`   | Long           | `Long`, once, on release        |
//! | `≥ VERY_LONG_PRESS_MS`   | VeryLong       | `VeryLong`, once, on crossing   |
//!
//! The classification itself advances at each threshold crossing.  `Long`
//! waits for release: a press past the long threshold may still become a
//! very long one, and one press fires at most one action.
//! A press that woke the device is tagged wake-only and fires nothing.
//!
//! ## Debounce
//!
//! An edge is not acted on when it arrives.  It starts a settle window
//! that every further edge restarts; once the line has been quiet for
//! `DEBOUNCE_MS` the settled level is compared with the press state.  A
//! burst that settles on the level it started from is a bounce.  A press
//! starts, and a release ends it, at the first edge of its burst.

use log::{debug, info};

pub const DEBOUNCE_MS: u32 = 50;
pub const LONG_PRESS_MS: u32 = 5000;
pub const VERY_LONG_PRESS_MS: u32 = 15_000;

/// Classification reached by the press in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    None,
    Long,
    VeryLong,
}

/// Application-level action produced by a classified press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Long,
    VeryLong,
}

/// A press from its start edge until release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressEvent {
    pub started_at: u32,
    pub classification: Classification,
    /// The press only resumed the device from sleep.
    pub consumed_as_wake: bool,
}

/// Edge burst waiting for the line to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settling {
    pressed: bool,
    first_at: u32,
    last_at: u32,
}

pub struct ButtonClassifier {
    long_ms: u32,
    very_long_ms: u32,
    press: Option<PressEvent>,
    settling: Option<Settling>,
    /// The next press (or the one in progress) woke the device.
    wake_pending: bool,
}

impl ButtonClassifier {
    pub fn new() -> Self {
        Self::with_thresholds(LONG_PRESS_MS, VERY_LONG_PRESS_MS)
    }

    pub fn with_thresholds(long_ms: u32, very_long_ms: u32) -> Self {
        debug_assert!(long_ms < very_long_ms);
        Self {
            long_ms,
            very_long_ms,
            press: None,
            settling: None,
            wake_pending: false,
        }
    }

    /// Press in progress, if any.
    pub fn press(&self) -> Option<&PressEvent> {
        self.press.as_ref()
    }

    /// A settled press is in progress.
    pub fn is_held(&self) -> bool {
        self.press.is_some()
    }

    /// Tag the current (or next) press as wake-only.
    pub fn mark_wake_press(&mut self) {
        match self.press.as_mut() {
            Some(p) => p.consumed_as_wake = true,
            None => self.wake_pending = true,
        }
    }

    /// Forget any press in progress (used after a sleep cycle).
    pub fn clear(&mut self) {
        self.press = None;
        self.settling = None;
    }

    /// Feed an edge drained from the interrupt queue.  Returns the action
    /// of an earlier burst that settled before this edge.
    pub fn on_edge(&mut self, pressed: bool, at_ms: u32) -> Option<ButtonAction> {
        let action = self.settle(at_ms);
        match self.settling.as_mut() {
            Some(s) => {
                s.pressed = pressed;
                s.last_at = at_ms;
            }
            None if pressed != self.press.is_some() => {
                self.settling = Some(Settling {
                    pressed,
                    first_at: at_ms,
                    last_at: at_ms,
                });
            }
            None => debug!("Button: repeated edge ignored"),
        }
        action
    }

    /// Settle pending edges and advance the classification of a held
    /// press.  Call every loop iteration.
    pub fn tick(&mut self, now_ms: u32) -> Option<ButtonAction> {
        if let Some(action) = self.settle(now_ms) {
            return Some(action);
        }
        // A release still settling caps the hold time.
        let until = match self.settling {
            Some(s) if !s.pressed => s.first_at,
            _ => now_ms,
        };
        self.advance(until)
    }

    fn settle(&mut self, now_ms: u32) -> Option<ButtonAction> {
        let s = self.settling?;
        if now_ms.wrapping_sub(s.last_at) < DEBOUNCE_MS {
            return None;
        }
        self.settling = None;
        if s.pressed == self.is_held() {
            debug!("Button: bounce ignored");
            return None;
        }
        if s.pressed {
            let wake = core::mem::take(&mut self.wake_pending);
            self.press = Some(PressEvent {
                started_at: s.first_at,
                classification: Classification::None,
                consumed_as_wake: wake,
            });
            None
        } else {
            self.release(s.first_at)
        }
    }

    fn release(&mut self, at_ms: u32) -> Option<ButtonAction> {
        // Catch up on thresholds crossed since the last tick.
        let action = self.advance(at_ms);
        let press = self.press.take()?;
        if press.consumed_as_wake {
            debug!("Button: wake-only press released");
            return action;
        }
        match (action, press.classification) {
            (Some(a), _) => Some(a),
            (None, Classification::Long) => {
                info!("Button: long press");
                Some(ButtonAction::Long)
            }
            _ => None,
        }
    }

    /// Only the very-long crossing returns an action here.
    fn advance(&mut self, now_ms: u32) -> Option<ButtonAction> {
        let press = self.press.as_mut()?;
        let held = now_ms.wrapping_sub(press.started_at);

        match press.classification {
            Classification::None if held >= self.very_long_ms => {
                press.classification = Classification::VeryLong;
            }
            Classification::None if held >= self.long_ms => {
                press.classification = Classification::Long;
                debug!("Button: long threshold reached");
                return None;
            }
            Classification::Long if held >= self.very_long_ms => {
                press.classification = Classification::VeryLong;
            }
            _ => return None,
        }

        if press.consumed_as_wake {
            return None;
        }
        info!("Button: very long press");
        Some(ButtonAction::VeryLong)
    }
}

impl Default for ButtonClassifier {
    fn default() -> Self {
        Self::new()
    }
}
