//! Device service — the control loop.
//!
//! [`Device`] is the explicit context that owns every control-plane
//! component.  One call to [`Device::tick`] is one main-loop iteration; it
//! runs to completion and never waits on the companion or a sensor.  The
//! only suspension point is standby inside the sleep scheduler.
//!
//! ```text
//!   IrqQueue ──▶ ┌──────────────────────────────────────┐ ──▶ EventSink
//!                │               Device                 │
//!   Board   ◀──▶ │ button · link · trackers · machine   │
//!  (ports)       │ scheduler · sensors · publish         │
//!                └──────────────────────────────────────┘
//! ```
//!
//! Iteration order:
//! 1. drain interrupt events (button edges, card detect)
//! 2. classify a held button
//! 3. re-initialise storage if a card edge was seen
//! 4. poll the companion for inbound messages
//! 5. advance retry-gated operations (link boot, wifi, time, hello, info,
//!    publish); exhausted budgets go to the mode machine
//! 6. snapshot → diff → policy → execute actions
//! 7. publish timer, config sync, info cache
//! 8. sleep if armed, due and every guard allows it

use core::fmt::Write;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::DeviceConfig;
use crate::drivers::button::{ButtonAction, ButtonClassifier};
use crate::error::{Error, LinkError, StorageError};
use crate::events::{IrqEvent, IrqQueue};
use crate::link::{
    CompanionInfo, CompanionLink, LinkAction, LinkDelegate, LinkLines, MessageKind, Transport,
};
use crate::power::{
    SleepGuards, SleepHooks, SleepScheduler, WakeSource, compute_sleep_duration,
};
use crate::retry::RetryStatus;
use crate::sensors::{ReadingRecord, SensorHub};
use crate::state::{Action, Decision, DeviceSnapshot, Mode, ModeMachine, Operation, PolicyInputs};
use crate::time::{epoch_to_iso, is_synced};

use super::commands::SetupCommand;
use super::events::AppEvent;
use super::ports::{Board, EventSink, FileId, RtcPort, StoragePort};

/// Wait before powering the companion again after its boot budget ran out.
pub const LINK_COOLDOWN_MS: u32 = 300_000;

pub type DeviceId = heapless::String<32>;

/// `true` once `now` has reached `at`, across counter wrap.
fn reached(now: u32, at: u32) -> bool {
    (now.wrapping_sub(at) as i32) >= 0
}

// ───────────────────────────────────────────────────────────────
// Retry trackers
// ───────────────────────────────────────────────────────────────

/// One [`RetryStatus`] per gated operation.
#[derive(Debug, Clone)]
pub struct Trackers {
    pub link_boot: RetryStatus,
    pub wifi: RetryStatus,
    pub time: RetryStatus,
    pub hello: RetryStatus,
    pub info: RetryStatus,
    pub publish: RetryStatus,
}

impl Trackers {
    pub fn from_config(config: &DeviceConfig) -> Self {
        let r = &config.retries;
        Self {
            link_boot: r.link_boot.into(),
            wifi: r.wifi.into(),
            time: r.time.into(),
            hello: r.hello.into(),
            info: r.info.into(),
            publish: r.publish.into(),
        }
    }

    pub fn get(&self, op: Operation) -> &RetryStatus {
        match op {
            Operation::LinkBoot => &self.link_boot,
            Operation::Wifi => &self.wifi,
            Operation::Time => &self.time,
            Operation::Hello => &self.hello,
            Operation::Info => &self.info,
            Operation::Publish => &self.publish,
        }
    }

    pub fn get_mut(&mut self, op: Operation) -> &mut RetryStatus {
        match op {
            Operation::LinkBoot => &mut self.link_boot,
            Operation::Wifi => &mut self.wifi,
            Operation::Time => &mut self.time,
            Operation::Hello => &mut self.hello,
            Operation::Info => &mut self.info,
            Operation::Publish => &mut self.publish,
        }
    }

    /// Fresh cycle for everything the companion does after a boot.
    fn reset_network(&mut self) {
        self.wifi.reset();
        self.time.reset();
        self.hello.reset();
        self.info.reset();
    }
}

/// Outcome of asking a tracker for permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// Send the request now.
    Go,
    /// Previous attempt still inside its timeout.
    Wait,
    /// Budget just ran out; report once.
    Exhausted,
    /// Already succeeded or already reported.
    Idle,
}

/// Sends are fire-and-forget; the operation's tracker re-issues on timeout.
fn sent(kind: MessageKind, result: Result<(), LinkError>) {
    if let Err(e) = result {
        warn!("Link: {:?} not sent: {}", kind, e);
    }
}

fn attempt(tracker: &mut RetryStatus, now_ms: u32) -> Attempt {
    if tracker.ok || tracker.error {
        return Attempt::Idle;
    }
    // The last attempt keeps its full timeout before the budget is judged.
    if tracker.is_waiting(now_ms) {
        return Attempt::Wait;
    }
    if tracker.retry(now_ms) {
        Attempt::Go
    } else {
        Attempt::Exhausted
    }
}

// ───────────────────────────────────────────────────────────────
// Network-side state, updated by inbound messages
// ───────────────────────────────────────────────────────────────

/// State touched by inbound companion messages.
#[derive(Debug)]
pub struct NetState {
    pub wifi_associated: bool,
    /// Backend registration for the current token not yet acknowledged.
    pub hello_pending: bool,
    /// Companion info arrived and is not yet cached on the card.
    pub info_unsaved: bool,
    /// Reading waiting for a publish acknowledgement.
    pub outbox: Option<ReadingRecord>,
    pub trackers: Trackers,
}

struct Inbound<'a, R: RtcPort> {
    net: &'a mut NetState,
    rtc: &'a mut R,
}

impl<R: RtcPort> LinkDelegate for Inbound<'_, R> {
    fn on_booted(&mut self) {
        self.net.trackers.link_boot.set_ok();
    }

    fn on_wifi_status(&mut self, associated: bool) {
        if associated != self.net.wifi_associated {
            info!("Link: wifi {}", if associated { "associated" } else { "lost" });
        }
        if !associated && self.net.wifi_associated {
            // Lost after joining: rejoin with a fresh budget.
            self.net.trackers.wifi.reset();
        }
        self.net.wifi_associated = associated;
        if associated {
            self.net.trackers.wifi.set_ok();
        }
    }

    fn on_time(&mut self, epoch: u32) {
        if !is_synced(epoch) {
            warn!("Link: ignoring implausible time {}", epoch);
            return;
        }
        self.rtc.set_epoch(epoch);
        self.net.trackers.time.set_ok();
        info!("Clock: set to {}", epoch_to_iso(epoch));
    }

    fn on_hello_ack(&mut self) {
        self.net.hello_pending = false;
        self.net.trackers.hello.set_ok();
        info!("Link: hello acknowledged");
    }

    fn on_info(&mut self, _info: &CompanionInfo) {
        self.net.info_unsaved = true;
        self.net.trackers.info.set_ok();
    }

    fn on_publish_ack(&mut self) {
        if self.net.outbox.take().is_some() {
            info!("Publish: acknowledged");
        }
        self.net.trackers.publish.set_ok();
    }
}

// ───────────────────────────────────────────────────────────────
// Sleep side effects
// ───────────────────────────────────────────────────────────────

struct SleepCtx<'a, T, L, B> {
    link: &'a mut CompanionLink<T, L>,
    sensors: &'a mut SensorHub,
    board: &'a mut B,
    sleeping: &'a mut bool,
    now_ms: u32,
    secs: u32,
}

impl<T: Transport, L: LinkLines, B: Board> SleepHooks for SleepCtx<'_, T, L, B> {
    fn power_down(&mut self) {
        *self.sleeping = true;
        self.link.link_control(LinkAction::Off, self.now_ms);
        self.sensors.stop_all();
    }

    fn arm_alarm(&mut self, secs: u32) {
        self.secs = secs;
        self.board.arm_alarm(secs);
    }

    fn standby(&mut self) -> WakeSource {
        self.board.standby()
    }
}

#[derive(Serialize)]
struct InfoRecord<'a> {
    id: &'a str,
    mode: Mode,
    companion: Option<&'a CompanionInfo>,
}

// ───────────────────────────────────────────────────────────────
// Device
// ───────────────────────────────────────────────────────────────

pub struct Device<T, L> {
    config: DeviceConfig,
    mode: Mode,
    on_setup: bool,
    on_shell: bool,
    sleeping: bool,

    link: CompanionLink<T, L>,
    net: NetState,
    machine: ModeMachine,
    scheduler: SleepScheduler,
    button: ButtonClassifier,
    sensors: SensorHub,

    id: DeviceId,
    card_present: bool,
    storage_init_pending: bool,
    monitor_header_written: bool,
    next_publish_ms: Option<u32>,
    link_retry_at: Option<u32>,
}

impl<T: Transport, L: LinkLines> Device<T, L> {
    /// Build the device context.  Nothing touches the board until
    /// [`boot`](Self::boot).
    pub fn new(link: CompanionLink<T, L>, sensors: SensorHub) -> Self {
        let config = DeviceConfig::default();
        Self {
            mode: Mode::NotConfigured,
            on_setup: false,
            on_shell: false,
            sleeping: false,
            link,
            net: NetState {
                wifi_associated: false,
                hello_pending: false,
                info_unsaved: false,
                outbox: None,
                trackers: Trackers::from_config(&config),
            },
            machine: ModeMachine::new(),
            scheduler: SleepScheduler::new(config.wake_time),
            button: ButtonClassifier::new(),
            sensors,
            id: DeviceId::new(),
            card_present: false,
            storage_init_pending: false,
            monitor_header_written: false,
            next_publish_ms: None,
            link_retry_at: None,
            config,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Boot bookkeeping: identity, storage, configuration.  Failures here
    /// degrade the device but never stop it.
    pub fn boot(&mut self, board: &mut impl Board, sink: &mut impl EventSink) {
        self.id = match board.unique_id() {
            Some(words) => {
                let mut id = DeviceId::new();
                for w in words {
                    let _ = write!(id, "{:08X}", w);
                }
                id
            }
            None => {
                error!("Identity: serial number unreadable, running degraded");
                let mut id = DeviceId::new();
                let _ = id.push_str("unknown");
                id
            }
        };

        self.init_storage(board, sink);

        let config = match board.load() {
            Ok(c) => match c.validate() {
                Ok(()) => c,
                Err(e) => {
                    warn!("Config: stored config rejected ({}), using defaults", e);
                    DeviceConfig::default()
                }
            },
            Err(e) => {
                warn!("Config: load failed ({}), using defaults", e);
                DeviceConfig::default()
            }
        };
        self.apply_config(config);

        info!("Device {} booted, configured mode: {}", self.id, self.config.mode);
        sink.emit(&AppEvent::Started {
            mode: self.mode,
            id: self.id.clone(),
        });
    }

    fn apply_config(&mut self, config: DeviceConfig) {
        self.net.trackers = Trackers::from_config(&config);
        self.scheduler.set_wake_time(config.wake_time);
        self.config = config;
        self.machine.invalidate();
    }

    // ── Per-iteration orchestration ───────────────────────────

    /// Run one main-loop iteration.
    pub fn tick(
        &mut self,
        now_ms: u32,
        irq: &IrqQueue,
        board: &mut impl Board,
        sink: &mut impl EventSink,
    ) {
        // 1. Interrupt events.
        irq.drain(|event| match event {
            IrqEvent::ButtonEdge { pressed, at_ms } => {
                if let Some(action) = self.button.on_edge(pressed, at_ms) {
                    self.on_button(action, board, sink);
                }
            }
            IrqEvent::CardDetect { .. } => self.storage_init_pending = true,
            IrqEvent::RtcAlarm => debug!("RTC alarm"),
            IrqEvent::LinkDataReady => {}
        });

        // 2. Held button.
        if let Some(action) = self.button.tick(now_ms) {
            self.on_button(action, board, sink);
        }

        // 3. Card (re)initialisation.
        if self.storage_init_pending {
            self.storage_init_pending = false;
            self.init_storage(board, sink);
        }

        // 4. Inbound companion traffic.
        let awaiting_ack = self.net.outbox.is_some();
        let mut inbound = Inbound {
            net: &mut self.net,
            rtc: &mut *board,
        };
        self.link.poll_inbound(now_ms, &mut inbound);
        if awaiting_ack && self.net.outbox.is_none() {
            sink.emit(&AppEvent::Published { to_card: false });
        }

        // 5. Retry-gated operations.
        self.advance_operations(now_ms, board, sink);

        // 6. Snapshot diff and policy.
        if let Some(until) = self.link_retry_at {
            if reached(now_ms, until) {
                self.link_retry_at = None;
                self.machine.invalidate();
            }
        }
        let snap = self.snapshot();
        let inputs = self.policy_inputs(is_synced(board.epoch()));
        if let Some(decision) = self.machine.step(snap, inputs) {
            self.execute(decision, now_ms, board, sink);
        }

        // 7. Periodic work.
        self.run_publish_timer(now_ms, board, sink);
        if self.link.is_powered() {
            let view = self.config.companion_view();
            if let Err(e) = self.link.sync_config_if_ready(now_ms, &view) {
                debug!("Link: config sync deferred ({})", e);
            }
        }
        self.save_info(board);

        // 8. Sleep.
        self.maybe_sleep(now_ms, board, sink);
    }

    // ── Snapshot ──────────────────────────────────────────────

    /// Capture the device's readiness flags.
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            mode: self.mode,
            on_shell: self.on_shell,
            on_setup: self.on_setup,
            link_powered: self.link.is_powered(),
            wifi_associated: self.net.wifi_associated,
            token_set: self.config.token_set(),
            hello_pending: self.net.hello_pending,
            card_present: self.card_present,
            sleeping: self.sleeping,
            publish_pending: self.net.outbox.is_some(),
        }
    }

    fn policy_inputs(&self, clock_synced: bool) -> PolicyInputs {
        PolicyInputs {
            configured_mode: self.config.mode,
            config_complete: self.config.is_complete(),
            config_sync_pending: self.link.config_sync_pending(),
            clock_synced,
            link_cooling_down: self.link_retry_at.is_some(),
        }
    }

    // ── Operations ────────────────────────────────────────────

    fn advance_operations(
        &mut self,
        now_ms: u32,
        board: &mut impl Board,
        sink: &mut impl EventSink,
    ) {
        let mut failed: heapless::Vec<Operation, 6> = heapless::Vec::new();

        // Companion boot: re-power until it confirms or the budget runs out.
        if self.link.control().is_booting() {
            match attempt(&mut self.net.trackers.link_boot, now_ms) {
                Attempt::Go => {
                    warn!("Link: boot not confirmed, power cycling");
                    self.link.link_control(LinkAction::Reboot, now_ms);
                }
                Attempt::Exhausted => {
                    let _ = failed.push(Operation::LinkBoot);
                }
                Attempt::Wait | Attempt::Idle => {}
            }
        }

        // Requests wait until the policy has seen the link up and started a
        // cycle; otherwise the cycle's tracker reset would re-issue them.
        let cycle_started = self
            .machine
            .previous()
            .is_some_and(|p| p.mode == Mode::Network && p.link_powered && !p.on_setup);
        let networking = cycle_started
            && self.mode == Mode::Network
            && !self.on_setup
            && !self.sleeping
            && self.link.is_powered();
        if networking {
            self.advance_network(now_ms, &mut failed);
        }

        // A reading waits at most one publish budget, online or not.
        let publishing = self.mode == Mode::Network
            && !self.on_setup
            && !self.sleeping
            && self.net.outbox.is_some();
        if publishing {
            let online = networking && self.net.wifi_associated;
            self.advance_publish(now_ms, online, &mut failed);
        }

        // Sleep mode needs the time for its wake target.
        let fetching_time = self.mode == Mode::Sleep
            && !self.on_setup
            && !self.sleeping
            && self.link.is_powered()
            && !is_synced(board.epoch());
        if fetching_time {
            self.request_time(now_ms, &mut failed);
        }

        for op in failed {
            let decision = self.machine.on_failure(op, &self.snapshot());
            self.execute(decision, now_ms, board, sink);
        }
    }

    fn advance_network(&mut self, now_ms: u32, failed: &mut heapless::Vec<Operation, 6>) {
        // Association gates everything else.
        if !self.net.wifi_associated {
            match attempt(&mut self.net.trackers.wifi, now_ms) {
                Attempt::Go => {
                    #[derive(Serialize)]
                    struct Credentials<'a> {
                        ssid: &'a str,
                        password: &'a str,
                    }
                    let creds = Credentials {
                        ssid: &self.config.wifi_ssid,
                        password: &self.config.wifi_password,
                    };
                    sent(MessageKind::SetWifi, self.link.send_json(MessageKind::SetWifi, &creds));
                }
                Attempt::Exhausted => {
                    let _ = failed.push(Operation::Wifi);
                }
                Attempt::Wait | Attempt::Idle => {}
            }
            return;
        }

        self.request_time(now_ms, failed);

        if self.net.hello_pending {
            match attempt(&mut self.net.trackers.hello, now_ms) {
                Attempt::Go => {
                    // Registration: the token, then the id it is registered under.
                    let token = Some(self.config.token.as_bytes());
                    sent(
                        MessageKind::SetToken,
                        self.link.send_message(MessageKind::SetToken, token),
                    );
                    sent(
                        MessageKind::Hello,
                        self.link.send_message(MessageKind::Hello, Some(self.id.as_bytes())),
                    );
                }
                Attempt::Exhausted => {
                    let _ = failed.push(Operation::Hello);
                }
                Attempt::Wait | Attempt::Idle => {}
            }
        }

        match attempt(&mut self.net.trackers.info, now_ms) {
            Attempt::Go => sent(
                MessageKind::PullInfo,
                self.link.send_message(MessageKind::PullInfo, None),
            ),
            Attempt::Exhausted => {
                let _ = failed.push(Operation::Info);
            }
            Attempt::Wait | Attempt::Idle => {}
        }
    }

    fn request_time(&mut self, now_ms: u32, failed: &mut heapless::Vec<Operation, 6>) {
        match attempt(&mut self.net.trackers.time, now_ms) {
            Attempt::Go => sent(
                MessageKind::SetTime,
                self.link.send_message(MessageKind::SetTime, None),
            ),
            Attempt::Exhausted => {
                let _ = failed.push(Operation::Time);
            }
            Attempt::Wait | Attempt::Idle => {}
        }
    }

    /// Attempts count while offline, so an unreachable backend still ends
    /// in the card fallback.
    fn advance_publish(
        &mut self,
        now_ms: u32,
        online: bool,
        failed: &mut heapless::Vec<Operation, 6>,
    ) {
        match attempt(&mut self.net.trackers.publish, now_ms) {
            Attempt::Go if online => {
                if let Some(record) = self.net.outbox.as_ref() {
                    sent(
                        MessageKind::Publish,
                        self.link.send_json(MessageKind::Publish, record),
                    );
                }
            }
            Attempt::Go => debug!("Publish: offline, attempt counted"),
            Attempt::Exhausted => {
                let _ = failed.push(Operation::Publish);
            }
            Attempt::Wait | Attempt::Idle => {}
        }
    }

    // ── Policy actions ────────────────────────────────────────

    fn execute(
        &mut self,
        decision: Decision,
        now_ms: u32,
        board: &mut impl Board,
        sink: &mut impl EventSink,
    ) {
        if let Some(next) = decision.next_mode {
            self.set_mode(next, now_ms, sink);
        }

        for action in decision.actions {
            match action {
                Action::EnterSetup => self.enter_setup(sink),

                Action::PowerLinkOn => {
                    if !self.link.control().is_requested_on() {
                        self.link.link_control(LinkAction::On, now_ms);
                        self.net.trackers.link_boot.reset();
                        // The power-on itself is the first boot attempt.
                        self.net.trackers.link_boot.retry(now_ms);
                        self.net.trackers.time.reset();
                    }
                }

                Action::PowerLinkOff => {
                    if self.link.control().is_requested_on() {
                        self.link.link_control(LinkAction::Off, now_ms);
                    }
                    self.net.wifi_associated = false;
                }

                Action::PowerCycleLink => {
                    self.link.link_control(LinkAction::Reboot, now_ms);
                    self.net.trackers.link_boot.reset();
                    self.net.trackers.link_boot.retry(now_ms);
                    self.net.trackers.wifi.reset();
                    self.net.wifi_associated = false;
                }

                Action::StartNetworkCycle => {
                    info!("Network: starting cycle");
                    self.net.trackers.reset_network();
                }

                Action::ResetTracker(op) => self.net.trackers.get_mut(op).reset(),

                Action::ReportNoCard => {
                    warn!("Storage: {} mode without a card", self.mode);
                    sink.emit(&AppEvent::NoCard);
                }

                Action::ReportFailure(op) => {
                    error!(
                        "Operation {:?} failed after {} attempts",
                        op,
                        self.net.trackers.get(op).retries()
                    );
                    let mut line = heapless::String::<48>::new();
                    let _ = write!(line, "{:?} failed", op);
                    self.log_to_card(board, &line);
                    sink.emit(&AppEvent::OperationFailed(op));
                }

                Action::CoolDownLink => {
                    info!("Link: retrying in {} s", LINK_COOLDOWN_MS / 1000);
                    self.link_retry_at = Some(now_ms.wrapping_add(LINK_COOLDOWN_MS));
                }

                Action::ArmSleep => self.scheduler.arm(),
                Action::DisarmSleep => self.scheduler.disarm(),

                Action::FallbackPublish => {
                    if let Some(record) = self.net.outbox.take() {
                        match self.store_reading(&record, board) {
                            Ok(()) => {
                                info!("Publish: stored locally after network failure");
                                sink.emit(&AppEvent::Published { to_card: true });
                            }
                            Err(e) => warn!("Publish: reading dropped ({})", e),
                        }
                    }
                }
            }
        }
    }

    fn set_mode(&mut self, next: Mode, now_ms: u32, sink: &mut impl EventSink) {
        if next == self.mode {
            return;
        }
        let from = self.mode;
        self.mode = next;
        info!("Mode: {} -> {}", from, next);
        sink.emit(&AppEvent::ModeChanged { from, to: next });

        if next == Mode::NotConfigured {
            self.sensors.stop_all();
            self.next_publish_ms = None;
        } else {
            self.sensors.start_all();
            let interval = self.config.publish_interval_secs.saturating_mul(1000);
            self.next_publish_ms = Some(now_ms.wrapping_add(interval));
        }
    }

    /// Drop back to `NotConfigured` so the policy resolves the mode again.
    fn unresolve_mode(&mut self, sink: &mut impl EventSink) {
        self.set_mode(Mode::NotConfigured, 0, sink);
        self.machine.invalidate();
    }

    // ── Setup ─────────────────────────────────────────────────

    /// Freeze normal progression and accept setup commands.
    pub fn enter_setup(&mut self, sink: &mut impl EventSink) {
        if self.on_setup {
            return;
        }
        info!("Setup: entered");
        self.on_setup = true;
        self.scheduler.disarm();
        sink.emit(&AppEvent::SetupEntered);
    }

    pub fn is_on_setup(&self) -> bool {
        self.on_setup
    }

    /// Apply one setup interaction.
    pub fn apply_setup(
        &mut self,
        cmd: SetupCommand,
        board: &mut impl Board,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        if !self.on_setup {
            return Err(Error::NotInSetup);
        }
        match cmd {
            SetupCommand::SetWifi { ssid, password } => {
                info!("Setup: wifi set to '{}'", ssid);
                self.config.wifi_ssid = ssid;
                self.config.wifi_password = password;
                self.net.wifi_associated = false;
                self.link.request_config_sync();
            }
            SetupCommand::SetToken(token) => {
                info!("Setup: token set");
                self.config.token = token;
                self.net.hello_pending = !self.config.token.is_empty();
                self.link.request_config_sync();
            }
            SetupCommand::SetMode(mode) => {
                info!("Setup: mode set to {}", mode);
                self.config.mode = mode;
                self.link.request_config_sync();
            }
            SetupCommand::Exit => {
                self.save_config(false, board)?;
                self.on_setup = false;
                self.unresolve_mode(sink);
                info!("Setup: exited");
                sink.emit(&AppEvent::SetupExited);
            }
        }
        Ok(())
    }

    /// Validate and persist the configuration, or restore defaults first
    /// when `use_defaults` is set.
    pub fn save_config(&mut self, use_defaults: bool, board: &mut impl Board) -> Result<(), Error> {
        let config = if use_defaults {
            DeviceConfig::default()
        } else {
            self.config.clone()
        };
        config.validate()?;
        board.save(&config)?;
        self.apply_config(config);
        self.link.request_config_sync();
        info!("Config: saved{}", if use_defaults { " (defaults)" } else { "" });
        Ok(())
    }

    /// Mark an interactive shell as attached.  Not part of change
    /// detection.
    pub fn set_on_shell(&mut self, on: bool) {
        self.on_shell = on;
    }

    // ── Button ────────────────────────────────────────────────

    fn on_button(
        &mut self,
        action: ButtonAction,
        board: &mut impl Board,
        sink: &mut impl EventSink,
    ) {
        match action {
            ButtonAction::Long => {
                if self.on_setup {
                    if let Err(e) = self.apply_setup(SetupCommand::Exit, board, sink) {
                        warn!("Setup: cannot exit ({})", e);
                    }
                } else {
                    self.enter_setup(sink);
                }
            }
            ButtonAction::VeryLong => self.factory_reset(board, sink),
        }
    }

    fn factory_reset(&mut self, board: &mut impl Board, sink: &mut impl EventSink) {
        warn!("Config: restoring factory defaults");
        if let Err(e) = self.save_config(true, board) {
            error!("Config: could not persist defaults ({})", e);
            self.apply_config(DeviceConfig::default());
        }
        self.on_setup = false;
        self.net.hello_pending = false;
        self.net.outbox = None;
        self.unresolve_mode(sink);
        sink.emit(&AppEvent::ConfigReset);
    }

    // ── Storage ───────────────────────────────────────────────

    fn init_storage(&mut self, board: &mut impl StoragePort, sink: &mut impl EventSink) {
        let was_present = self.card_present;
        let result = board.init().and_then(|()| {
            board.open(FileId::Debug)?;
            board.open(FileId::Monitor)
        });
        match result {
            Ok(()) => {
                self.card_present = board.card_present();
                self.monitor_header_written = {
                    let mut first = [0u8; 1];
                    matches!(board.read(FileId::Monitor, &mut first), Ok(n) if n > 0)
                };
                info!("Storage: card ready");
            }
            Err(e) => {
                self.card_present = false;
                if was_present || e != StorageError::NotAvailable {
                    error!("Storage: init failed ({}), local logging disabled", e);
                } else {
                    warn!("Storage: no card");
                }
                sink.emit(&AppEvent::StorageDegraded);
            }
        }
    }

    fn store_reading(
        &mut self,
        record: &ReadingRecord,
        board: &mut impl StoragePort,
    ) -> Result<(), StorageError> {
        if !self.card_present {
            return Err(StorageError::NotAvailable);
        }
        let kinds = self.sensors.kinds();
        if !self.monitor_header_written {
            let mut header = ReadingRecord::csv_header(&kinds);
            let _ = header.push('\n');
            board.append(FileId::Monitor, header.as_bytes())?;
            self.monitor_header_written = true;
        }
        let mut row = record.csv_row(&kinds);
        let _ = row.push('\n');
        board.append(FileId::Monitor, row.as_bytes())
    }

    /// Append a timestamped line to the debug log, if a card is present.
    fn log_to_card(&mut self, board: &mut impl Board, msg: &str) {
        if !self.card_present {
            return;
        }
        let mut line = heapless::String::<96>::new();
        let _ = writeln!(line, "{} {}", epoch_to_iso(board.epoch()), msg);
        if let Err(e) = board.append(FileId::Debug, line.as_bytes()) {
            warn!("Storage: debug log write failed ({})", e);
        }
    }

    fn save_info(&mut self, board: &mut impl StoragePort) {
        if !self.net.info_unsaved || !self.card_present {
            return;
        }
        let record = InfoRecord {
            id: &self.id,
            mode: self.config.mode,
            companion: self.link.info(),
        };
        match serde_json::to_vec(&record) {
            Ok(bytes) => match board.write(FileId::Info, &bytes) {
                Ok(()) => {
                    self.net.info_unsaved = false;
                    debug!("Storage: info cached");
                }
                Err(e) => warn!("Storage: info write failed ({})", e),
            },
            Err(_) => warn!("Storage: info encode failed"),
        }
    }

    // ── Publish ───────────────────────────────────────────────

    fn run_publish_timer(
        &mut self,
        now_ms: u32,
        board: &mut impl Board,
        sink: &mut impl EventSink,
    ) {
        let Some(at) = self.next_publish_ms else {
            return;
        };
        if self.on_setup || self.sleeping || !reached(now_ms, at) {
            return;
        }
        let interval = self.config.publish_interval_secs.saturating_mul(1000);
        self.next_publish_ms = Some(now_ms.wrapping_add(interval));

        if self.net.outbox.is_some() {
            debug!("Publish: previous reading still pending, skipping sample");
            return;
        }

        let record = self.sensors.sample(board.epoch());
        match self.mode {
            Mode::Network => {
                self.net.trackers.publish.reset();
                self.net.outbox = Some(record);
            }
            Mode::SdCard | Mode::Sleep => match self.store_reading(&record, board) {
                Ok(()) => sink.emit(&AppEvent::Published { to_card: true }),
                Err(e) => warn!("Publish: reading not stored ({})", e),
            },
            Mode::NotConfigured => {}
        }
    }

    // ── Sleep ─────────────────────────────────────────────────

    fn maybe_sleep(&mut self, now_ms: u32, board: &mut impl Board, sink: &mut impl EventSink) {
        if !self.scheduler.due(now_ms) {
            return;
        }
        let epoch = board.epoch();
        let guards = SleepGuards {
            publish_pending: self.net.outbox.is_some(),
            config_sync_pending: self.link.config_sync_pending(),
            on_setup: self.on_setup,
            now_epoch: is_synced(epoch).then_some(epoch),
        };

        let mut ctx = SleepCtx {
            link: &mut self.link,
            sensors: &mut self.sensors,
            board: &mut *board,
            sleeping: &mut self.sleeping,
            now_ms,
            secs: 0,
        };
        match self.scheduler.enter_sleep(guards, &mut ctx) {
            Ok(source) => {
                let secs = ctx.secs;
                sink.emit(&AppEvent::Slept { secs });
                self.resume(source, now_ms, sink);
            }
            Err(reason) => {
                if self.scheduler.note_refusal(reason) {
                    sink.emit(&AppEvent::SleepDeferred(reason));
                }
            }
        }
    }

    /// Bookkeeping after standby returns.  `now_ms` is the loop time at
    /// which sleep started; the caller's next tick carries the real time.
    fn resume(&mut self, source: WakeSource, now_ms: u32, sink: &mut impl EventSink) {
        self.sleeping = false;
        self.scheduler.on_resume(source, now_ms, self.config.wake_window_ms);
        self.button.clear();
        if source == WakeSource::Button {
            self.button.mark_wake_press();
        }
        // Everything in flight was cancelled by the power-down.
        self.net.wifi_associated = false;
        self.net.trackers.reset_network();
        if self.mode == Mode::Sleep {
            self.next_publish_ms = Some(now_ms);
        }
        self.sensors.start_all();
        self.machine.invalidate();
        sink.emit(&AppEvent::Woke(source));
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn link(&self) -> &CompanionLink<T, L> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut CompanionLink<T, L> {
        &mut self.link
    }

    pub fn net(&self) -> &NetState {
        &self.net
    }

    pub fn trackers(&self) -> &Trackers {
        &self.net.trackers
    }

    pub fn scheduler(&self) -> &SleepScheduler {
        &self.scheduler
    }

    pub fn button(&self) -> &ButtonClassifier {
        &self.button
    }

    /// Policy evaluations since boot.
    pub fn evaluations(&self) -> u32 {
        self.machine.evaluations()
    }

    /// Seconds the next sleep would last, if the clock is set.
    pub fn next_sleep_secs(&self, board: &impl RtcPort) -> Option<u32> {
        let epoch = board.epoch();
        is_synced(epoch).then(|| compute_sleep_duration(self.scheduler.wake_time(), epoch))
    }
}
