//! Mode-selection policy: the transition table.
//!
//! ```text
//!  guard (first match wins)                 next mode / actions
//!  ───────────────────────────────────────  ─────────────────────────────
//!  sleeping                                 —
//!  on_setup                                 PowerLinkOn if link down
//!  NotConfigured, config complete           → configured mode
//!  NotConfigured, config incomplete         EnterSetup
//!  Network, no token                        EnterSetup
//!  Network, link down                       PowerLinkOn unless cooling down
//!  Network, link just came up / mode new    StartNetworkCycle
//!  SdCard                                   ReportNoCard if no card,
//!                                           PowerLinkOff if link up and
//!                                           no config sync pending
//!  Sleep                                    ArmSleep, PowerLinkOn if a
//!                                           config sync or an unset clock
//!                                           waits on a powered-down link
//!                                           that is not cooling down
//! ```
//!
//! Every mode other than `Sleep` also disarms a pending sleep request.
//! `ArmSleep` ignores `publish_pending`; the scheduler refuses to sleep
//! while a publish is outstanding.
//! Pure functions: inputs in, [`Decision`] out.

use super::{DeviceSnapshot, Mode, Operation};

/// Side effects the device executes on behalf of the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    EnterSetup,
    PowerLinkOn,
    PowerLinkOff,
    /// Reboot the companion; its boot confirmation starts a new cycle.
    PowerCycleLink,
    /// Reset the network trackers (wifi, time, hello, info).
    StartNetworkCycle,
    ResetTracker(Operation),
    ReportNoCard,
    ReportFailure(Operation),
    ArmSleep,
    DisarmSleep,
    /// Publish budget exhausted: store the reading locally instead.
    FallbackPublish,
    /// Keep the companion off for a cool-down period, then re-evaluate.
    CoolDownLink,
}

pub type Actions = heapless::Vec<Action, 4>;

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub next_mode: Option<Mode>,
    pub actions: Actions,
}

impl Decision {
    fn with(actions: &[Action]) -> Self {
        let mut d = Self::default();
        for a in actions {
            d.push(*a);
        }
        d
    }

    fn push(&mut self, action: Action) {
        // Capacity covers the longest row of the table.
        let _ = self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.next_mode.is_none() && self.actions.is_empty()
    }
}

/// Inputs that do not live in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyInputs {
    /// Working mode stored in the configuration.
    pub configured_mode: Mode,
    /// Configuration is enough to leave `NotConfigured`.
    pub config_complete: bool,
    /// A config push to the companion is still outstanding.
    pub config_sync_pending: bool,
    /// The RTC holds a plausible wall-clock time.
    pub clock_synced: bool,
    /// The companion is being kept off after a failure.
    pub link_cooling_down: bool,
}

impl Default for PolicyInputs {
    fn default() -> Self {
        Self {
            configured_mode: Mode::NotConfigured,
            config_complete: false,
            config_sync_pending: false,
            clock_synced: false,
            link_cooling_down: false,
        }
    }
}

/// Evaluate the transition table for a changed snapshot.
pub fn decide(
    prev: Option<&DeviceSnapshot>,
    snap: &DeviceSnapshot,
    inputs: &PolicyInputs,
) -> Decision {
    if snap.sleeping {
        return Decision::default();
    }

    if snap.on_setup {
        let mut d = Decision::with(&[Action::DisarmSleep]);
        if !snap.link_powered {
            d.push(Action::PowerLinkOn);
        }
        return d;
    }

    match snap.mode {
        Mode::NotConfigured => {
            if inputs.config_complete && inputs.configured_mode != Mode::NotConfigured {
                Decision {
                    next_mode: Some(inputs.configured_mode),
                    actions: Actions::new(),
                }
            } else {
                Decision::with(&[Action::EnterSetup])
            }
        }

        Mode::Network => {
            if !snap.token_set {
                return Decision::with(&[Action::EnterSetup]);
            }
            let mut d = Decision::with(&[Action::DisarmSleep]);
            if !snap.link_powered {
                if !inputs.link_cooling_down {
                    d.push(Action::PowerLinkOn);
                }
                return d;
            }
            let fresh = prev
                .is_none_or(|p| !p.link_powered || p.mode != Mode::Network || p.on_setup);
            if fresh {
                d.push(Action::StartNetworkCycle);
            }
            d
        }

        Mode::SdCard => {
            let mut d = Decision::with(&[Action::DisarmSleep]);
            if !snap.card_present {
                d.push(Action::ReportNoCard);
            }
            if snap.link_powered && !inputs.config_sync_pending {
                d.push(Action::PowerLinkOff);
            }
            d
        }

        Mode::Sleep => {
            let mut d = Decision::with(&[Action::ArmSleep]);
            // Sleep is refused while a sync is pending or the clock is
            // unset; both need the companion.
            let needs_link = inputs.config_sync_pending || !inputs.clock_synced;
            if needs_link && !snap.link_powered && !inputs.link_cooling_down {
                d.push(Action::PowerLinkOn);
            }
            d
        }
    }
}

/// Interpret an exhausted retry budget.
pub fn on_failure(op: Operation, snap: &DeviceSnapshot) -> Decision {
    match op {
        // Association and registration need a healthy companion: reboot it.
        // Its boot confirmation flips `link_powered` and starts a new cycle.
        Operation::Wifi | Operation::Hello => Decision::with(&[
            Action::ReportFailure(op),
            Action::PowerCycleLink,
        ]),
        // Sleep mode keeps the companion up only for the time; rest it and
        // ask again later.
        Operation::Time if snap.mode == Mode::Sleep => Decision::with(&[
            Action::ReportFailure(op),
            Action::PowerLinkOff,
            Action::CoolDownLink,
        ]),
        // Abandoned for this cycle; retried after the next link boot.
        Operation::Time | Operation::Info => Decision::with(&[Action::ReportFailure(op)]),
        Operation::Publish => Decision::with(&[
            Action::ReportFailure(op),
            Action::FallbackPublish,
            Action::ResetTracker(Operation::Publish),
        ]),
        // Stop burning power on a silent companion; the device retries
        // after a cool-down.
        Operation::LinkBoot => Decision::with(&[
            Action::ReportFailure(op),
            Action::PowerLinkOff,
            Action::CoolDownLink,
        ]),
    }
}
