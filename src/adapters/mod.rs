//! Adapters — concrete implementations of the port traits.
//!
//! | Adapter         | Implements            | Connects to                  |
//! |-----------------|-----------------------|------------------------------|
//! | `board`         | Board (all below)     | Simulated board              |
//! | `companion_sim` | Transport, LinkLines  | Simulated companion firmware |
//! | `config_store`  | ConfigPort            | Flash page (postcard blob)   |
//! | `device_id`     | IdentityPort          | MCU serial number            |
//! | `log_sink`      | EventSink             | `log` facade                 |
//! | `sensors_sim`   | Sensor                | Synthetic readings           |
//! | `storage`       | StoragePort           | In-memory SD card            |
//! | `time`          | RtcPort               | Simulated RTC, loop clock    |

pub mod board;
pub mod companion_sim;
pub mod config_store;
pub mod device_id;
pub mod log_sink;
pub mod sensors_sim;
pub mod storage;
pub mod time;
