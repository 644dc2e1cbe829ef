//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one area of the control
//! loop against mock adapters.  All tests run on the host with no real
//! hardware required.

mod device_tests;
mod mock_hw;
mod network_tests;
mod sleep_tests;
