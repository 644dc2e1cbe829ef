//! Companion-link engine: typed send, non-blocking receive, deferred
//! configuration sync.
//!
//! The engine owns the transport, the frame decoder and the power
//! lifecycle.  Inbound messages are handed to a [`LinkDelegate`] which the
//! device implements; the engine itself only keeps link-local state (boot
//! confirmation, cached companion info, the config dirty flag).
//!
//! There is no link-level acknowledgement or retransmission.  Each logical
//! operation re-issues its own request when its retry tracker allows.

use core::fmt;

use heapless::String;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::codec::{FrameDecoder, MAX_FRAME, encode_frame};
use super::control::{LinkAction, LinkControl, LinkLines};
use super::message::{Message, MessageKind};
use super::transport::Transport;
use crate::config::CompanionConfig;
use crate::error::LinkError;

/// Upper bound on bytes consumed by one `poll_inbound` call.
const MAX_POLL_BYTES: usize = 256;

/// Minimum spacing between config-sync attempts after a refusal.
const SYNC_BACKOFF_MS: u32 = 1000;

/// Version and network details reported by the companion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionInfo {
    pub version: String<16>,
    pub build_date: String<24>,
    pub ip: String<16>,
    pub mac: String<18>,
    pub hostname: String<32>,
}

impl fmt::Display for CompanionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "companion {} ({}) host={} ip={} mac={}",
            self.version, self.build_date, self.hostname, self.ip, self.mac
        )
    }
}

/// Receives decoded inbound messages.
pub trait LinkDelegate {
    /// Companion finished booting.
    fn on_booted(&mut self) {}
    fn on_wifi_status(&mut self, associated: bool);
    /// Companion supplied the current epoch (seconds).
    fn on_time(&mut self, epoch: u32);
    fn on_hello_ack(&mut self);
    fn on_info(&mut self, info: &CompanionInfo);
    fn on_publish_ack(&mut self);
}

pub struct CompanionLink<T, L> {
    transport: T,
    control: LinkControl<L>,
    decoder: FrameDecoder,
    tx_buf: [u8; MAX_FRAME],
    info: Option<CompanionInfo>,
    config_dirty: bool,
    sync_refused_at: Option<u32>,
}

impl<T: Transport, L: LinkLines> CompanionLink<T, L> {
    pub fn new(transport: T, lines: L) -> Self {
        Self {
            transport,
            control: LinkControl::new(lines),
            decoder: FrameDecoder::new(),
            tx_buf: [0; MAX_FRAME],
            info: None,
            config_dirty: false,
            sync_refused_at: None,
        }
    }

    pub fn control(&self) -> &LinkControl<L> {
        &self.control
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_powered(&self) -> bool {
        self.control.is_powered()
    }

    /// Drive the companion's power/reset lines.
    pub fn link_control(&mut self, action: LinkAction, now_ms: u32) {
        // Partial frames from before a power change are garbage.
        self.decoder.reset();
        self.control.apply(action, now_ms);
    }

    /// Encode and transmit one message.
    ///
    /// Fails without side effects when the companion has not confirmed its
    /// boot or the outbound side cannot take a frame.
    pub fn send_message(
        &mut self,
        kind: MessageKind,
        content: Option<&[u8]>,
    ) -> Result<(), LinkError> {
        self.check_ready()?;
        let msg = Message::new(kind, content)?;
        self.transmit(&msg)
    }

    /// Send `value` as the JSON content of a `kind` message.
    pub fn send_json<V: Serialize>(
        &mut self,
        kind: MessageKind,
        value: &V,
    ) -> Result<(), LinkError> {
        self.check_ready()?;
        let msg = Message::json(kind, value)?;
        self.transmit(&msg)
    }

    fn check_ready(&self) -> Result<(), LinkError> {
        if !self.control.is_powered() {
            return Err(LinkError::NotPowered);
        }
        if !self.transport.tx_ready() {
            return Err(LinkError::Busy);
        }
        Ok(())
    }

    fn transmit(&mut self, msg: &Message) -> Result<(), LinkError> {
        let len = encode_frame(msg, &mut self.tx_buf)?;
        let mut sent = 0;
        while sent < len {
            match self.transport.write(&self.tx_buf[sent..len]) {
                Ok(0) => return Err(LinkError::Busy),
                Ok(n) => sent += n,
                Err(e) => {
                    warn!("Link: write failed: {:?}", e);
                    return Err(LinkError::Transport);
                }
            }
        }
        self.transport.flush().map_err(|_| LinkError::Transport)?;
        debug!("Link: sent {:?} ({} bytes)", msg.kind, msg.payload.len());
        Ok(())
    }

    /// Drain whatever the transport has buffered, dispatching each complete
    /// message to `delegate`.  Never waits for data.  Returns the number of
    /// messages dispatched.
    pub fn poll_inbound(&mut self, now_ms: u32, delegate: &mut impl LinkDelegate) -> usize {
        let mut dispatched = 0;
        let mut consumed = 0;
        let mut buf = [0u8; 64];

        while consumed < MAX_POLL_BYTES && self.transport.available() {
            let n = match self.transport.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("Link: read failed: {:?}", e);
                    self.decoder.reset();
                    break;
                }
            };
            consumed += n;
            for &byte in &buf[..n] {
                if let Some(msg) = self.decoder.feed(byte) {
                    if let Err(e) = self.dispatch(&msg, now_ms, delegate) {
                        warn!("Link: dropped {:?}: {}", msg.kind, e);
                    } else {
                        dispatched += 1;
                    }
                }
            }
        }
        dispatched
    }

    fn dispatch(
        &mut self,
        msg: &Message,
        now_ms: u32,
        delegate: &mut impl LinkDelegate,
    ) -> Result<(), LinkError> {
        debug!("Link: received {:?}", msg.kind);
        match msg.kind {
            MessageKind::Booted => {
                self.control.confirm_boot(now_ms);
                delegate.on_booted();
            }
            MessageKind::WifiStatus => {
                let associated = msg.payload.first().ok_or(LinkError::Decode)? != &0;
                delegate.on_wifi_status(associated);
            }
            MessageKind::SetTime => {
                let epoch = msg
                    .text()
                    .and_then(|t| t.trim().parse::<u32>().ok())
                    .ok_or(LinkError::Decode)?;
                delegate.on_time(epoch);
            }
            MessageKind::HelloAck => delegate.on_hello_ack(),
            MessageKind::Info => {
                let info: CompanionInfo =
                    serde_json::from_slice(&msg.payload).map_err(|_| LinkError::Decode)?;
                info!("Link: {}", info);
                delegate.on_info(&info);
                self.info = Some(info);
            }
            MessageKind::PublishAck => delegate.on_publish_ack(),
            other => {
                warn!("Link: unexpected inbound {:?}", other);
                return Err(LinkError::Decode);
            }
        }
        Ok(())
    }

    /// Last companion info received, if any.
    pub fn info(&self) -> Option<&CompanionInfo> {
        self.info.as_ref()
    }

    /// Mark local configuration as needing a push to the companion.
    pub fn request_config_sync(&mut self) {
        self.config_dirty = true;
        self.sync_refused_at = None;
    }

    pub fn config_sync_pending(&self) -> bool {
        self.config_dirty
    }

    /// Attempt a pending config push.
    ///
    /// `Ok(true)` when pushed, `Ok(false)` when nothing was pending or a
    /// recent refusal is still backing off.  A refused push stays pending
    /// and is retried on a later iteration.
    pub fn sync_config_if_ready(
        &mut self,
        now_ms: u32,
        config: &CompanionConfig,
    ) -> Result<bool, LinkError> {
        if !self.config_dirty {
            return Ok(false);
        }
        if let Some(t) = self.sync_refused_at {
            if now_ms.wrapping_sub(t) < SYNC_BACKOFF_MS {
                return Ok(false);
            }
        }
        match self.send_json(MessageKind::SyncConfig, config) {
            Ok(()) => {
                info!("Link: configuration synced");
                self.config_dirty = false;
                self.sync_refused_at = None;
                Ok(true)
            }
            Err(e) => {
                self.sync_refused_at = Some(now_ms);
                Err(e)
            }
        }
    }
}
