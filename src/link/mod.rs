//! Companion wireless-processor link.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     CompanionLink                        │
//! │                                                          │
//! │  ┌───────────┐   ┌──────────┐   ┌────────────────────┐   │
//! │  │ Transport │──▶│  Codec   │──▶│ dispatch → Delegate│   │
//! │  │ (UART)    │◀──│ (framing)│◀──│ send_message       │   │
//! │  └───────────┘   └──────────┘   └────────────────────┘   │
//! │                                                          │
//! │  ┌──────────────────────────┐                            │
//! │  │ LinkControl (GPIO lines) │  power / reset / boot-sel  │
//! │  └──────────────────────────┘                            │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod control;
pub mod engine;
pub mod message;
pub mod transport;

pub use control::{GpioLinkLines, LinkAction, LinkControl, LinkLifecycleState, LinkLines};
pub use engine::{CompanionInfo, CompanionLink, LinkDelegate};
pub use message::{MAX_PAYLOAD, Message, MessageKind};
pub use transport::Transport;
