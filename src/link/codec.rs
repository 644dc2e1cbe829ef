//! Length-prefix frame codec for the companion UART.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────┬──────────────────────┐
//! │ Length (2B)│ Kind (1B)│ Payload (Length-1 B) │
//! │ LE u16     │          │                      │
//! └────────────┴──────────┴──────────────────────┘
//! ```
//!
//! The decoder is fed one byte at a time and yields complete messages, so a
//! single transport read may end mid-header, mid-payload, or span several
//! frames.  No checksum: lost or corrupted requests are recovered by the
//! per-operation retry trackers.

use log::warn;

use super::message::{MAX_PAYLOAD, Message, MessageKind, Payload};
use crate::error::LinkError;

const HEADER_SIZE: usize = 2;

/// Largest encoded frame.
pub const MAX_FRAME: usize = HEADER_SIZE + 1 + MAX_PAYLOAD;

enum DecoderState {
    ReadingHeader { collected: usize },
    ReadingKind { expected: usize },
    ReadingPayload { expected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    kind: u8,
    payload: Payload,
    rejected: u32,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            kind: 0,
            payload: Payload::new(),
            rejected: 0,
        }
    }

    /// Feed one byte.  Returns a message once its last byte arrives.
    pub fn feed(&mut self, byte: u8) -> Option<Message> {
        match self.state {
            DecoderState::ReadingHeader { collected } => {
                self.header_buf[collected] = byte;
                let collected = collected + 1;
                if collected < HEADER_SIZE {
                    self.state = DecoderState::ReadingHeader { collected };
                    return None;
                }
                let expected = u16::from_le_bytes(self.header_buf) as usize;
                if expected == 0 || expected > 1 + MAX_PAYLOAD {
                    warn!("Link: invalid frame length {}", expected);
                    self.rejected = self.rejected.wrapping_add(1);
                    self.reset();
                    return None;
                }
                self.state = DecoderState::ReadingKind { expected };
                None
            }

            DecoderState::ReadingKind { expected } => {
                self.kind = byte;
                self.payload.clear();
                if expected == 1 {
                    return self.finish();
                }
                self.state = DecoderState::ReadingPayload {
                    expected: expected - 1,
                };
                None
            }

            DecoderState::ReadingPayload { expected } => {
                // Length was bounded in the header, so this cannot overflow.
                let _ = self.payload.push(byte);
                if self.payload.len() == expected {
                    return self.finish();
                }
                None
            }
        }
    }

    fn finish(&mut self) -> Option<Message> {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        match MessageKind::from_u8(self.kind) {
            Some(kind) => Some(Message {
                kind,
                payload: core::mem::take(&mut self.payload),
            }),
            None => {
                warn!("Link: unknown message kind 0x{:02x}", self.kind);
                self.rejected = self.rejected.wrapping_add(1);
                None
            }
        }
    }

    /// Discard any partial frame (e.g. after the companion reboots).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload.clear();
    }

    /// Frames dropped for bad length or unknown kind.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `msg` into `out_buf`.  Returns the number of bytes written.
pub fn encode_frame(msg: &Message, out_buf: &mut [u8]) -> Result<usize, LinkError> {
    let body = 1 + msg.payload.len();
    let total = HEADER_SIZE + body;
    if total > out_buf.len() {
        return Err(LinkError::Encode);
    }

    out_buf[..HEADER_SIZE].copy_from_slice(&(body as u16).to_le_bytes());
    out_buf[HEADER_SIZE] = msg.kind.as_u8();
    out_buf[HEADER_SIZE + 1..total].copy_from_slice(&msg.payload);
    Ok(total)
}
