//! Application core — device orchestration, zero I/O.
//!
//! This module ties the control-plane pieces together: the mode machine,
//! retry-gated companion operations, the publish path, setup handling and
//! the sleep scheduler.  All interaction with hardware happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
