//! Power and reset lifecycle of the companion processor.
//!
//! Three lines reach the companion: a supply switch, the enable (reset)
//! pin and the boot-select strap.  [`LinkControl::apply`] drives them for
//! each [`LinkAction`].  Powering on only *requests* a boot; `powered`
//! becomes true once the companion announces itself with a `Booted`
//! message ([`LinkControl::confirm_boot`]).
//!
//! ```text
//!   Off ──On/Wakeup──▶ Booting{started_at} ──Booted msg──▶ Powered
//!    ▲                        │ timeout                       │
//!    └──────── Off/Sleep ─────┴───────────────────────────────┘
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{info, warn};

/// Reset pulse width when rebooting.
const RESET_PULSE_MS: u32 = 50;

/// Lifecycle controls.  These never cross the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Off,
    /// Boot into the companion's bootloader for reprogramming.
    Flash,
    On,
    Reboot,
    Sleep,
    Wakeup,
}

/// Requested vs. confirmed power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkLifecycleState {
    /// Boot confirmed by the companion.
    pub powered: bool,
    /// Time of the last power-on request still awaiting confirmation
    /// or already confirmed.
    pub started_at_ms: Option<u32>,
}

/// Physical lines to the companion.
pub trait LinkLines {
    fn set_power(&mut self, on: bool);
    fn set_enable(&mut self, on: bool);
    /// `true` selects the normal application boot, `false` the bootloader.
    fn set_boot_select(&mut self, app: bool);
    fn delay_ms(&mut self, ms: u32);
}

/// [`LinkLines`] over `embedded-hal` pins.
pub struct GpioLinkLines<P, E, B, D> {
    power: P,
    enable: E,
    boot: B,
    delay: D,
}

impl<P, E, B, D> GpioLinkLines<P, E, B, D>
where
    P: OutputPin,
    E: OutputPin,
    B: OutputPin,
    D: DelayNs,
{
    pub fn new(power: P, enable: E, boot: B, delay: D) -> Self {
        Self {
            power,
            enable,
            boot,
            delay,
        }
    }
}

fn drive<O: OutputPin>(pin: &mut O, high: bool, name: &str) {
    let res = if high { pin.set_high() } else { pin.set_low() };
    if res.is_err() {
        warn!("Link: failed to drive {} line", name);
    }
}

impl<P, E, B, D> LinkLines for GpioLinkLines<P, E, B, D>
where
    P: OutputPin,
    E: OutputPin,
    B: OutputPin,
    D: DelayNs,
{
    fn set_power(&mut self, on: bool) {
        // Supply switch is a P-MOSFET: low turns the rail on.
        drive(&mut self.power, !on, "power");
    }

    fn set_enable(&mut self, on: bool) {
        drive(&mut self.enable, on, "enable");
    }

    fn set_boot_select(&mut self, app: bool) {
        drive(&mut self.boot, app, "boot-select");
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}

pub struct LinkControl<L> {
    lines: L,
    state: LinkLifecycleState,
    /// Companion was put to sleep rather than powered off.
    asleep: bool,
    flashing: bool,
}

impl<L: LinkLines> LinkControl<L> {
    pub fn new(lines: L) -> Self {
        Self {
            lines,
            state: LinkLifecycleState::default(),
            asleep: false,
            flashing: false,
        }
    }

    pub fn state(&self) -> LinkLifecycleState {
        self.state
    }

    pub fn is_powered(&self) -> bool {
        self.state.powered
    }

    /// A power-on was requested and not yet confirmed.
    pub fn is_booting(&self) -> bool {
        !self.state.powered && self.state.started_at_ms.is_some()
    }

    /// Power was requested, confirmed or not.
    pub fn is_requested_on(&self) -> bool {
        self.state.started_at_ms.is_some()
    }

    pub fn is_flashing(&self) -> bool {
        self.flashing
    }

    pub fn lines_mut(&mut self) -> &mut L {
        &mut self.lines
    }

    /// Drive the lines for `action`.
    pub fn apply(&mut self, action: LinkAction, now_ms: u32) {
        info!("Link: {:?}", action);
        match action {
            LinkAction::Off => self.power_off(),

            LinkAction::On => self.power_on(now_ms),

            LinkAction::Reboot => {
                self.power_off();
                self.lines.delay_ms(RESET_PULSE_MS);
                self.power_on(now_ms);
            }

            LinkAction::Flash => {
                self.power_off();
                self.lines.set_boot_select(false);
                self.lines.set_power(true);
                self.lines.delay_ms(RESET_PULSE_MS);
                self.lines.set_enable(true);
                // The bootloader never sends a boot confirmation.
                self.flashing = true;
            }

            LinkAction::Sleep => {
                self.lines.set_enable(false);
                self.state = LinkLifecycleState::default();
                self.asleep = true;
            }

            LinkAction::Wakeup => {
                if !self.asleep {
                    self.power_on(now_ms);
                    return;
                }
                self.lines.set_enable(true);
                self.asleep = false;
                self.state = LinkLifecycleState {
                    powered: false,
                    started_at_ms: Some(now_ms),
                };
            }
        }
    }

    fn power_on(&mut self, now_ms: u32) {
        self.lines.set_boot_select(true);
        self.lines.set_power(true);
        self.lines.set_enable(true);
        self.asleep = false;
        self.flashing = false;
        self.state = LinkLifecycleState {
            powered: false,
            started_at_ms: Some(now_ms),
        };
    }

    fn power_off(&mut self) {
        self.lines.set_enable(false);
        self.lines.set_power(false);
        self.asleep = false;
        self.flashing = false;
        self.state = LinkLifecycleState::default();
    }

    /// The companion announced a completed boot.
    pub fn confirm_boot(&mut self, now_ms: u32) {
        if self.state.started_at_ms.is_none() {
            warn!("Link: boot confirmation without power request");
            self.state.started_at_ms = Some(now_ms);
        }
        if !self.state.powered {
            info!("Link: boot confirmed");
        }
        self.state.powered = true;
    }
}
