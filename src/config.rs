//! Device configuration.
//!
//! Persisted through [`ConfigPort`](crate::app::ports::ConfigPort) and
//! partially mirrored to the companion processor (see [`CompanionConfig`]).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::power::WakeTime;
use crate::retry::RetryBudget;
use crate::state::Mode;

pub type Ssid = heapless::String<32>;
pub type Password = heapless::String<64>;
pub type Token = heapless::String<16>;

/// Retry budgets for every gated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudgets {
    pub wifi: RetryBudget,
    pub time: RetryBudget,
    pub hello: RetryBudget,
    pub info: RetryBudget,
    pub publish: RetryBudget,
    /// Power-cycles of the companion when boot is not confirmed.
    pub link_boot: RetryBudget,
}

impl Default for RetryBudgets {
    fn default() -> Self {
        Self {
            wifi: RetryBudget::new(1, 60_000),
            time: RetryBudget::new(2, 3000),
            hello: RetryBudget::new(3, 5000),
            info: RetryBudget::new(3, 5000),
            publish: RetryBudget::new(3, 5000),
            link_boot: RetryBudget::new(3, 10_000),
        }
    }
}

/// Core device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    // --- Operating mode ---
    /// Working mode selected during setup.
    pub mode: Mode,

    // --- Network ---
    pub wifi_ssid: Ssid,
    pub wifi_password: Password,
    /// Backend registration token.
    pub token: Token,

    // --- Timing ---
    /// Seconds between sensor publishes.
    pub publish_interval_secs: u32,
    /// Daily wake time (UTC).
    pub wake_time: WakeTime,
    /// Milliseconds the device stays awake after a button wake.
    pub wake_window_ms: u32,

    // --- Retry budgets ---
    pub retries: RetryBudgets,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mode: Mode::NotConfigured,
            wifi_ssid: Ssid::new(),
            wifi_password: Password::new(),
            token: Token::new(),
            publish_interval_secs: 60,
            wake_time: WakeTime::new(3, 0, 0),
            wake_window_ms: 60_000,
            retries: RetryBudgets::default(),
        }
    }
}

impl DeviceConfig {
    pub fn wifi_set(&self) -> bool {
        !self.wifi_ssid.is_empty()
    }

    pub fn token_set(&self) -> bool {
        !self.token.is_empty()
    }

    /// Whether the stored settings are enough to leave `NotConfigured`.
    pub fn is_complete(&self) -> bool {
        match self.mode {
            Mode::NotConfigured => false,
            Mode::Network => self.wifi_set() && self.token_set(),
            Mode::SdCard | Mode::Sleep => true,
        }
    }

    /// Range-check every field.  Called before persisting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.wake_time.is_valid() {
            return Err(ConfigError::ValidationFailed(
                "wake_time must be hh<24, mm<60, ss<60",
            ));
        }
        if !(10..=86_400).contains(&self.publish_interval_secs) {
            return Err(ConfigError::ValidationFailed(
                "publish_interval_secs must be 10–86400",
            ));
        }
        if self.wake_window_ms > 600_000 {
            return Err(ConfigError::ValidationFailed(
                "wake_window_ms must be at most 600000",
            ));
        }
        if self.mode == Mode::Network && !self.token_set() {
            return Err(ConfigError::ValidationFailed(
                "token is required in network mode",
            ));
        }
        let budgets = [
            self.retries.wifi,
            self.retries.time,
            self.retries.hello,
            self.retries.info,
            self.retries.publish,
            self.retries.link_boot,
        ];
        if budgets.iter().any(|b| b.max_retries == 0 || b.timeout_ms == 0) {
            return Err(ConfigError::ValidationFailed(
                "retry budgets need at least one attempt and a non-zero timeout",
            ));
        }
        Ok(())
    }

    /// The subset of settings the companion processor needs.
    pub fn companion_view(&self) -> CompanionConfig {
        CompanionConfig {
            mode: self.mode,
            publish_interval: self.publish_interval_secs,
            ssid: self.wifi_ssid.clone(),
            password: self.wifi_password.clone(),
            token: self.token.clone(),
        }
    }
}

/// Settings pushed to the companion with a sync-config message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionConfig {
    pub mode: Mode,
    pub publish_interval: u32,
    pub ssid: Ssid,
    pub password: Password,
    pub token: Token,
}
