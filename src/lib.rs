//! SenseKit firmware library.
//!
//! Control backbone of a battery-powered environmental sensing board with
//! a companion WiFi processor: retry-gated operations, the mode machine,
//! the companion link, the sleep scheduler and the button classifier.
//! Everything here runs on the host; board adapters plug in through the
//! traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod link;
pub mod power;
pub mod retry;
pub mod sensors;
pub mod state;
pub mod time;

pub mod adapters;
pub mod drivers;
