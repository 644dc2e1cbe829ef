//! Simulated companion co-processor.
//!
//! One shared [`SimCompanion`] backs both halves the link needs:
//! [`SimTransport`] (the UART) and [`SimLinkLines`] (power, enable and
//! boot-select).  The companion "runs" only while all three lines are in
//! the application-boot position; it then announces itself with
//! `Booted` and answers requests according to its [`CompanionBehaviour`].
//!
//! ```text
//!   CompanionLink ── SimTransport ──┐
//!                                   ├──▶ Rc<RefCell<CompanionState>>
//!   LinkControl  ── SimLinkLines ───┘
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::{debug, warn};

use crate::config::CompanionConfig;
use crate::link::codec::{FrameDecoder, MAX_FRAME, encode_frame};
use crate::link::{CompanionInfo, LinkLines, Message, MessageKind, Transport};

/// How the simulated companion responds.
#[derive(Debug, Clone)]
pub struct CompanionBehaviour {
    /// Sends `Booted` after power-on.
    pub boots: bool,
    /// Reports a successful association after `SetWifi`.
    pub joins_wifi: bool,
    /// Epoch returned for a time request.
    pub epoch: u32,
    pub acks_hello: bool,
    pub acks_publish: bool,
}

impl Default for CompanionBehaviour {
    fn default() -> Self {
        Self {
            boots: true,
            joins_wifi: true,
            epoch: 1_700_000_000,
            acks_hello: true,
            acks_publish: true,
        }
    }
}

struct CompanionState {
    behaviour: CompanionBehaviour,
    power: bool,
    enable: bool,
    app_boot: bool,
    running: bool,
    boots: u32,
    decoder: FrameDecoder,
    to_device: VecDeque<u8>,
    received: Vec<MessageKind>,
    last_config: Option<CompanionConfig>,
    last_publish: Option<Vec<u8>>,
    token: Option<Vec<u8>>,
}

impl CompanionState {
    fn lines_changed(&mut self) {
        let up = self.power && self.enable && self.app_boot;
        if up && !self.running {
            self.running = true;
            self.boots += 1;
            self.decoder.reset();
            self.to_device.clear();
            debug!("SimCompanion: powered up (boot #{})", self.boots);
            if self.behaviour.boots {
                self.reply(&Message::empty(MessageKind::Booted));
            }
        } else if !up && self.running {
            self.running = false;
            self.decoder.reset();
            self.to_device.clear();
            debug!("SimCompanion: powered down");
        }
    }

    fn reply(&mut self, msg: &Message) {
        let mut buf = [0u8; MAX_FRAME];
        match encode_frame(msg, &mut buf) {
            Ok(n) => self.to_device.extend(&buf[..n]),
            Err(e) => warn!("SimCompanion: cannot encode {:?}: {}", msg.kind, e),
        }
    }

    fn handle(&mut self, msg: &Message) {
        self.received.push(msg.kind);
        match msg.kind {
            MessageKind::SetWifi => {
                let status = u8::from(self.behaviour.joins_wifi);
                if let Ok(m) = Message::new(MessageKind::WifiStatus, Some(&[status][..])) {
                    self.reply(&m);
                }
            }
            MessageKind::SetTime => {
                let text = self.behaviour.epoch.to_string();
                if let Ok(m) = Message::new(MessageKind::SetTime, Some(text.as_bytes())) {
                    self.reply(&m);
                }
            }
            MessageKind::SetToken => self.token = Some(msg.payload.to_vec()),
            MessageKind::Hello => {
                // Registration needs a token.
                if self.behaviour.acks_hello && self.token.as_ref().is_some_and(|t| !t.is_empty()) {
                    self.reply(&Message::empty(MessageKind::HelloAck));
                }
            }
            MessageKind::PullInfo => {
                let mut info = CompanionInfo::default();
                let _ = info.version.push_str("0.9.4");
                let _ = info.build_date.push_str("2023-11-01");
                let _ = info.ip.push_str("192.168.1.42");
                let _ = info.mac.push_str("24:0A:C4:12:34:56");
                let _ = info.hostname.push_str("sensekit-sim");
                if let Ok(m) = Message::json(MessageKind::Info, &info) {
                    self.reply(&m);
                }
            }
            MessageKind::Publish => {
                self.last_publish = Some(msg.payload.to_vec());
                if self.behaviour.acks_publish {
                    self.reply(&Message::empty(MessageKind::PublishAck));
                }
            }
            MessageKind::SyncConfig => match serde_json::from_slice(&msg.payload) {
                Ok(cfg) => self.last_config = Some(cfg),
                Err(_) => warn!("SimCompanion: unreadable config"),
            },
            other => warn!("SimCompanion: unexpected {:?}", other),
        }
    }
}

/// Handle to the simulated companion.  Clones share one instance.
#[derive(Clone)]
pub struct SimCompanion {
    state: Rc<RefCell<CompanionState>>,
}

impl SimCompanion {
    pub fn new(behaviour: CompanionBehaviour) -> Self {
        Self {
            state: Rc::new(RefCell::new(CompanionState {
                behaviour,
                power: false,
                enable: false,
                app_boot: false,
                running: false,
                boots: 0,
                decoder: FrameDecoder::new(),
                to_device: VecDeque::new(),
                received: Vec::new(),
                last_config: None,
                last_publish: None,
                token: None,
            })),
        }
    }

    pub fn transport(&self) -> SimTransport {
        SimTransport {
            companion: self.clone(),
        }
    }

    pub fn lines(&self) -> SimLinkLines {
        SimLinkLines {
            companion: self.clone(),
        }
    }

    pub fn set_behaviour(&self, behaviour: CompanionBehaviour) {
        self.state.borrow_mut().behaviour = behaviour;
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Power-ups observed so far.
    pub fn boots(&self) -> u32 {
        self.state.borrow().boots
    }

    /// Kinds of every message received from the device, oldest first.
    pub fn received(&self) -> Vec<MessageKind> {
        self.state.borrow().received.clone()
    }

    pub fn count(&self, kind: MessageKind) -> usize {
        self.state.borrow().received.iter().filter(|k| **k == kind).count()
    }

    pub fn last_config(&self) -> Option<CompanionConfig> {
        self.state.borrow().last_config.clone()
    }

    pub fn last_publish(&self) -> Option<Vec<u8>> {
        self.state.borrow().last_publish.clone()
    }

    /// Report a change of association without being asked.
    pub fn announce_wifi(&self, associated: bool) {
        let mut s = self.state.borrow_mut();
        if s.running {
            let status = [u8::from(associated)];
            if let Ok(m) = Message::new(MessageKind::WifiStatus, Some(&status[..])) {
                s.reply(&m);
            }
        }
    }
}

/// UART side of the simulated companion.
pub struct SimTransport {
    companion: SimCompanion,
}

impl Transport for SimTransport {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let mut s = self.companion.state.borrow_mut();
        let n = buf.len().min(s.to_device.len());
        for (slot, byte) in buf.iter_mut().zip(s.to_device.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        let mut s = self.companion.state.borrow_mut();
        if !s.running {
            // Bytes into an unpowered UART go nowhere.
            return Ok(data.len());
        }
        for &b in data {
            if let Some(msg) = s.decoder.feed(b) {
                s.handle(&msg);
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        !self.companion.state.borrow().to_device.is_empty()
    }

    fn tx_ready(&self) -> bool {
        true
    }
}

/// Control lines of the simulated companion.
pub struct SimLinkLines {
    companion: SimCompanion,
}

impl LinkLines for SimLinkLines {
    fn set_power(&mut self, on: bool) {
        let mut s = self.companion.state.borrow_mut();
        s.power = on;
        s.lines_changed();
    }

    fn set_enable(&mut self, on: bool) {
        let mut s = self.companion.state.borrow_mut();
        s.enable = on;
        s.lines_changed();
    }

    fn set_boot_select(&mut self, app: bool) {
        let mut s = self.companion.state.borrow_mut();
        s.app_boot = app;
        s.lines_changed();
    }

    fn delay_ms(&mut self, _ms: u32) {}
}
