//! Device-mode state machine driven by snapshot diffs.
//!
//! ```text
//!   live subsystems ──▶ DeviceSnapshot (fresh every iteration)
//!                              │
//!                 is_change_from(prev)? ──no──▶ skip (idempotent loop)
//!                              │yes
//!                              ▼
//!                     policy::decide() ──▶ Decision { next mode, actions }
//! ```
//!
//! The comparator deliberately ignores `on_shell` and `publish_pending`:
//! churn in those two flags never re-runs the policy.  Operation failures
//! (an exhausted [`RetryStatus`](crate::retry::RetryStatus)) are the other
//! input; they go through [`ModeMachine::on_failure`] so that all
//! interpretation of failures lives in one place.

pub mod policy;

use core::fmt;

use log::info;
use serde::{Deserialize, Serialize};

pub use policy::{Action, Actions, Decision, PolicyInputs};

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// High-level operating regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Mode {
    NotConfigured = 0,
    Network = 1,
    SdCard = 2,
    Sleep = 3,
}

impl Mode {
    pub fn title(self) -> &'static str {
        match self {
            Self::NotConfigured => "not configured",
            Self::Network => "network",
            Self::SdCard => "sdcard",
            Self::Sleep => "sleep",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

// ---------------------------------------------------------------------------
// Operations gated by a retry tracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LinkBoot,
    Wifi,
    Time,
    Hello,
    Info,
    Publish,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable capture of device readiness at one instant.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSnapshot {
    pub mode: Mode,
    pub on_shell: bool,
    pub on_setup: bool,
    pub link_powered: bool,
    pub wifi_associated: bool,
    pub token_set: bool,
    pub hello_pending: bool,
    pub card_present: bool,
    pub sleeping: bool,
    pub publish_pending: bool,
}

impl DeviceSnapshot {
    /// Boot-time snapshot: nothing ready, mode unconfigured.
    pub const fn initial() -> Self {
        Self {
            mode: Mode::NotConfigured,
            on_shell: false,
            on_setup: false,
            link_powered: false,
            wifi_associated: false,
            token_set: false,
            hello_pending: false,
            card_present: false,
            sleeping: false,
            publish_pending: false,
        }
    }

    /// Change comparator used by the mode machine.
    ///
    /// `on_shell` and `publish_pending` are not part of the comparison.
    pub fn is_change_from(&self, prev: &DeviceSnapshot) -> bool {
        self.mode != prev.mode
            || self.on_setup != prev.on_setup
            || self.link_powered != prev.link_powered
            || self.wifi_associated != prev.wifi_associated
            || self.token_set != prev.token_set
            || self.hello_pending != prev.hello_pending
            || self.card_present != prev.card_present
            || self.sleeping != prev.sleeping
    }
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for DeviceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yn = |b: bool| if b { "yes" } else { "no" };
        write!(
            f,
            "mode={} setup={} shell={} link={} wifi={} token={} hello_pending={} \
             card={} sleeping={} publish_pending={}",
            self.mode,
            yn(self.on_setup),
            yn(self.on_shell),
            yn(self.link_powered),
            yn(self.wifi_associated),
            yn(self.token_set),
            yn(self.hello_pending),
            yn(self.card_present),
            yn(self.sleeping),
            yn(self.publish_pending),
        )
    }
}

// ---------------------------------------------------------------------------
// Mode machine
// ---------------------------------------------------------------------------

/// Diff-triggered policy runner.
///
/// Owns only the previous snapshot; it never touches subsystems directly.
/// Callers hand it a fresh snapshot and receive a [`Decision`] to execute.
pub struct ModeMachine {
    prev: Option<DeviceSnapshot>,
    evaluations: u32,
}

impl ModeMachine {
    pub fn new() -> Self {
        Self {
            prev: None,
            evaluations: 0,
        }
    }

    /// Feed this iteration's snapshot.
    ///
    /// Runs the policy if this is the first snapshot or the comparator
    /// reports a change; returns `None` otherwise.  The snapshot always
    /// replaces the retained one.
    pub fn step(&mut self, snap: DeviceSnapshot, inputs: PolicyInputs) -> Option<Decision> {
        let prev = self.prev.replace(snap);
        let changed = prev.as_ref().is_none_or(|p| snap.is_change_from(p));
        if !changed {
            return None;
        }

        self.evaluations = self.evaluations.wrapping_add(1);
        info!("State: {}", snap);
        Some(policy::decide(prev.as_ref(), &snap, &inputs))
    }

    /// Interpret an exhausted retry budget.
    pub fn on_failure(&self, op: Operation, snap: &DeviceSnapshot) -> Decision {
        policy::on_failure(op, snap)
    }

    /// Number of policy evaluations since boot.
    pub fn evaluations(&self) -> u32 {
        self.evaluations
    }

    /// Last retained snapshot.
    pub fn previous(&self) -> Option<&DeviceSnapshot> {
        self.prev.as_ref()
    }

    /// Drop the retained snapshot so the next step re-evaluates.
    pub fn invalidate(&mut self) {
        self.prev = None;
    }
}

impl Default for ModeMachine {
    fn default() -> Self {
        Self::new()
    }
}
