//! Inbound setup commands.
//!
//! Accepted only while the device is in setup (entered with a long press
//! or automatically when configuration is missing).  Outside setup the
//! [`Device`](super::service::Device) rejects them with
//! [`Error::NotInSetup`](crate::error::Error::NotInSetup).

use crate::config::{Password, Ssid, Token};
use crate::state::Mode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupCommand {
    SetWifi { ssid: Ssid, password: Password },
    SetToken(Token),
    SetMode(Mode),
    /// Persist and leave setup.
    Exit,
}
