//! Mock hardware for integration tests.
//!
//! A scripted companion wire: tests queue inbound messages exactly when
//! they want them and inspect every outbound message and control-line
//! call, without a simulated companion deciding anything on its own.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use sensekit::adapters::board::SimBoard;
use sensekit::app::events::AppEvent;
use sensekit::app::ports::{ConfigPort, EventSink};
use sensekit::app::service::Device;
use sensekit::config::DeviceConfig;
use sensekit::error::SensorError;
use sensekit::events::IrqQueue;
use sensekit::link::codec::{FrameDecoder, MAX_FRAME, encode_frame};
use sensekit::link::{CompanionLink, LinkLines, Message, MessageKind, Transport};
use sensekit::sensors::{Reading, Sensor, SensorHub, SensorKind};
use sensekit::state::Mode;

// ── Line call record ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCall {
    Power(bool),
    Enable(bool),
    BootSelect(bool),
    Delay(u32),
}

// ── Scripted wire ─────────────────────────────────────────────

#[derive(Default)]
pub struct Wire {
    inbound: VecDeque<u8>,
    decoder: FrameDecoder,
    outbound: Vec<Message>,
    lines: Vec<LineCall>,
    busy: bool,
}

#[derive(Clone, Default)]
pub struct WireHandle(Rc<RefCell<Wire>>);

impl WireHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message from the companion.
    pub fn push(&self, kind: MessageKind, payload: &[u8]) {
        let msg = Message::new(kind, Some(payload)).unwrap();
        let mut buf = [0u8; MAX_FRAME];
        let n = encode_frame(&msg, &mut buf).unwrap();
        self.0.borrow_mut().inbound.extend(&buf[..n]);
    }

    /// Queue raw bytes, e.g. a garbage or partial frame.
    pub fn push_raw(&self, bytes: &[u8]) {
        self.0.borrow_mut().inbound.extend(bytes);
    }

    pub fn booted(&self) {
        self.push(MessageKind::Booted, &[]);
    }

    pub fn wifi(&self, associated: bool) {
        self.push(MessageKind::WifiStatus, &[u8::from(associated)]);
    }

    pub fn time(&self, epoch: u32) {
        self.push(MessageKind::SetTime, epoch.to_string().as_bytes());
    }

    /// Kinds of every message the device sent, oldest first.
    pub fn sent(&self) -> Vec<MessageKind> {
        self.0.borrow().outbound.iter().map(|m| m.kind).collect()
    }

    pub fn sent_count(&self, kind: MessageKind) -> usize {
        self.0.borrow().outbound.iter().filter(|m| m.kind == kind).count()
    }

    pub fn last_sent(&self, kind: MessageKind) -> Option<Message> {
        self.0.borrow().outbound.iter().rev().find(|m| m.kind == kind).cloned()
    }

    pub fn clear_sent(&self) {
        self.0.borrow_mut().outbound.clear();
    }

    pub fn lines(&self) -> Vec<LineCall> {
        self.0.borrow().lines.clone()
    }

    /// Number of times the supply was switched on.
    pub fn power_ons(&self) -> usize {
        self.0
            .borrow()
            .lines
            .iter()
            .filter(|c| **c == LineCall::Power(true))
            .count()
    }

    /// Supply state after the last line call.
    pub fn supply_on(&self) -> bool {
        self.0
            .borrow()
            .lines
            .iter()
            .rev()
            .find_map(|c| match c {
                LineCall::Power(on) => Some(*on),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn set_busy(&self, busy: bool) {
        self.0.borrow_mut().busy = busy;
    }

    pub fn pending_inbound(&self) -> usize {
        self.0.borrow().inbound.len()
    }

    pub fn transport(&self) -> ScriptedTransport {
        ScriptedTransport(self.clone())
    }

    pub fn link_lines(&self) -> MockLines {
        MockLines(self.clone())
    }
}

pub struct ScriptedTransport(WireHandle);

impl Transport for ScriptedTransport {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let mut w = self.0.0.borrow_mut();
        let n = buf.len().min(w.inbound.len());
        for (slot, b) in buf.iter_mut().zip(w.inbound.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        let mut w = self.0.0.borrow_mut();
        for &b in data {
            if let Some(msg) = w.decoder.feed(b) {
                w.outbound.push(msg);
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        !self.0.0.borrow().inbound.is_empty()
    }

    fn tx_ready(&self) -> bool {
        !self.0.0.borrow().busy
    }
}

pub struct MockLines(WireHandle);

impl LinkLines for MockLines {
    fn set_power(&mut self, on: bool) {
        self.0.0.borrow_mut().lines.push(LineCall::Power(on));
    }

    fn set_enable(&mut self, on: bool) {
        self.0.0.borrow_mut().lines.push(LineCall::Enable(on));
    }

    fn set_boot_select(&mut self, app: bool) {
        self.0.0.borrow_mut().lines.push(LineCall::BootSelect(app));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.0.borrow_mut().lines.push(LineCall::Delay(ms));
    }
}

// ── Sensors ───────────────────────────────────────────────────

pub struct ConstSensor {
    pub kind: SensorKind,
    pub value: f32,
}

impl Sensor for ConstSensor {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn start(&mut self) -> bool {
        true
    }

    fn stop(&mut self) -> bool {
        true
    }

    fn get(&mut self, _wait: bool) -> Result<Reading, SensorError> {
        Ok(Reading {
            kind: self.kind,
            value: self.value,
        })
    }
}

pub fn two_sensors() -> SensorHub {
    let mut hub = SensorHub::new();
    hub.add(Box::new(ConstSensor {
        kind: SensorKind::Temperature,
        value: 21.5,
    }));
    hub.add(Box::new(ConstSensor {
        kind: SensorKind::Humidity,
        value: 40.0,
    }));
    hub
}

// ── Event recorder ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn count(&self, event: &AppEvent) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Test rig ──────────────────────────────────────────────────

/// Loop step used by [`Rig::run`].
pub const STEP_MS: u32 = 100;

pub type TestDevice = Device<ScriptedTransport, MockLines>;

/// A device on a scripted wire, a simulated board, and virtual time.
pub struct Rig {
    pub device: TestDevice,
    pub wire: WireHandle,
    pub board: SimBoard,
    pub sink: RecordingSink,
    pub irq: IrqQueue,
    pub now: u32,
}

impl Rig {
    /// Device booted against `board`.
    pub fn boot(board: SimBoard) -> Self {
        Self::boot_at(board, 0)
    }

    pub fn boot_at(board: SimBoard, now: u32) -> Self {
        let wire = WireHandle::new();
        let link = CompanionLink::new(wire.transport(), wire.link_lines());
        let mut rig = Self {
            device: Device::new(link, two_sensors()),
            wire,
            board,
            sink: RecordingSink::default(),
            irq: IrqQueue::new(),
            now,
        };
        rig.device.boot(&mut rig.board, &mut rig.sink);
        rig
    }

    /// One loop iteration at the current time.
    pub fn tick(&mut self) {
        self.device
            .tick(self.now, &self.irq, &mut self.board, &mut self.sink);
    }

    /// Advance time by `ms` in [`STEP_MS`] steps, ticking each step.
    pub fn run(&mut self, ms: u32) {
        let mut left = ms;
        while left > 0 {
            let step = left.min(STEP_MS);
            self.now = self.now.wrapping_add(step);
            self.board.rtc.advance_ms(step);
            left -= step;
            self.tick();
        }
    }
}

// ── Boards ────────────────────────────────────────────────────

/// Epoch used wherever a synced clock is needed: 2023-11-14T22:13:20Z.
pub const SYNCED_EPOCH: u32 = 1_700_000_000;

pub fn network_config() -> DeviceConfig {
    let mut c = DeviceConfig::default();
    c.mode = Mode::Network;
    c.wifi_ssid.push_str("lab").unwrap();
    c.wifi_password.push_str("secret").unwrap();
    c.token.push_str("a1b2c3").unwrap();
    c
}

pub fn mode_config(mode: Mode) -> DeviceConfig {
    if mode == Mode::Network {
        return network_config();
    }
    DeviceConfig {
        mode,
        ..Default::default()
    }
}

/// A board whose flash already holds `config`.
pub fn board_with(config: &DeviceConfig) -> SimBoard {
    let mut board = SimBoard::new();
    board.config.save(config).unwrap();
    board
}
