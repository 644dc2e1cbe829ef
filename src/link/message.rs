//! Typed messages exchanged with the companion processor.

use serde::Serialize;

use crate::error::LinkError;

/// Payload capacity of a single message.
pub const MAX_PAYLOAD: usize = 512;

pub type Payload = heapless::Vec<u8, MAX_PAYLOAD>;

/// Wire identifier of a message.  Values below `0x80` originate on this
/// side; `0x80` and above are sent by the companion.  `SetTime` travels both
/// ways: empty outbound it is a time request, inbound it carries the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    SetWifi = 0x01,
    SetToken = 0x02,
    Hello = 0x03,
    PullInfo = 0x04,
    Publish = 0x05,
    SetTime = 0x06,
    SyncConfig = 0x07,

    Booted = 0x81,
    WifiStatus = 0x82,
    HelloAck = 0x83,
    Info = 0x84,
    PublishAck = 0x85,
}

impl MessageKind {
    pub fn from_u8(b: u8) -> Option<Self> {
        Some(match b {
            0x01 => Self::SetWifi,
            0x02 => Self::SetToken,
            0x03 => Self::Hello,
            0x04 => Self::PullInfo,
            0x05 => Self::Publish,
            0x06 => Self::SetTime,
            0x07 => Self::SyncConfig,
            0x81 => Self::Booted,
            0x82 => Self::WifiStatus,
            0x83 => Self::HelloAck,
            0x84 => Self::Info,
            0x85 => Self::PublishAck,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Can be sent by this side.
    pub fn is_outbound(self) -> bool {
        (self as u8) < 0x80
    }

    /// Can be received from the companion.
    pub fn is_inbound(self) -> bool {
        (self as u8) >= 0x80 || self == Self::SetTime
    }
}

/// One unit of the companion conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Payload,
}

impl Message {
    /// Build a message.  Content longer than [`MAX_PAYLOAD`] is rejected,
    /// never truncated.
    pub fn new(kind: MessageKind, content: Option<&[u8]>) -> Result<Self, LinkError> {
        let mut payload = Payload::new();
        if let Some(bytes) = content {
            payload
                .extend_from_slice(bytes)
                .map_err(|_| LinkError::PayloadTooLarge)?;
        }
        Ok(Self { kind, payload })
    }

    /// Control-only message.
    pub fn empty(kind: MessageKind) -> Self {
        Self {
            kind,
            payload: Payload::new(),
        }
    }

    /// Message whose content is the JSON encoding of `value`.
    pub fn json<T: Serialize>(kind: MessageKind, value: &T) -> Result<Self, LinkError> {
        let bytes = serde_json::to_vec(value).map_err(|_| LinkError::Encode)?;
        Self::new(kind, Some(&bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload as UTF-8 text, if it is.
    pub fn text(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }
}
