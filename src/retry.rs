//! Timeout-gated retry budget.
//!
//! Every fallible multi-step operation (wifi association, time sync, hello
//! handshake, info fetch, publish, companion boot) owns one
//! [`RetryStatus`].  The tracker only answers "may I try now?"; *how* to
//! try is the caller's business.
//!
//! ```text
//!   retry(now) ──▶ retries ≥ max? ──yes──▶ error = true, false
//!                       │no
//!                       ▼
//!            now - last < timeout? ──yes──▶ false (too soon)
//!                       │no
//!                       ▼
//!            retries += 1, last = now, true
//! ```
//!
//! Timestamps are milliseconds from a free-running counter and are
//! compared with wrapping arithmetic, so a `u32` rollover (~49 days) never
//! stalls a tracker.

use serde::{Deserialize, Serialize};

/// Per-operation budget: how many attempts, and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    pub max_retries: u8,
    pub timeout_ms: u32,
}

impl RetryBudget {
    pub const fn new(max_retries: u8, timeout_ms: u32) -> Self {
        Self {
            max_retries,
            timeout_ms,
        }
    }
}

/// Retry-budget tracker for a single logical operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStatus {
    /// Last attempt was confirmed successful.
    pub ok: bool,
    /// Budget exhausted without a confirmed success.
    pub error: bool,
    retries: u8,
    max_retries: u8,
    last_attempt_ms: Option<u32>,
    timeout_ms: u32,
}

impl RetryStatus {
    pub const fn new(max_retries: u8, timeout_ms: u32) -> Self {
        Self {
            ok: false,
            error: false,
            retries: 0,
            max_retries,
            last_attempt_ms: None,
            timeout_ms,
        }
    }

    pub const fn from_budget(budget: RetryBudget) -> Self {
        Self::new(budget.max_retries, budget.timeout_ms)
    }

    /// Ask for permission to attempt the operation at `now_ms`.
    ///
    /// Returns `true` when the caller should attempt now.  Returns `false`
    /// either because the previous attempt is still within its timeout, or
    /// because the budget is spent (in which case `error` is raised and stays
    /// raised until [`reset`](Self::reset)).
    pub fn retry(&mut self, now_ms: u32) -> bool {
        if self.retries >= self.max_retries {
            self.error = true;
            return false;
        }

        if let Some(last) = self.last_attempt_ms {
            if now_ms.wrapping_sub(last) < self.timeout_ms {
                return false;
            }
        }

        self.retries += 1;
        self.last_attempt_ms = Some(now_ms);
        true
    }

    /// Mark the operation successful.  The attempt counter is kept, so a
    /// stale tracker that is reused without a reset still honours the
    /// cumulative budget.
    pub fn set_ok(&mut self) {
        self.ok = true;
        self.error = false;
    }

    /// Start a fresh attempt cycle.
    pub fn reset(&mut self) {
        self.ok = false;
        self.error = false;
        self.retries = 0;
        self.last_attempt_ms = None;
    }

    /// Attempts granted so far in this cycle.
    pub fn retries(&self) -> u8 {
        self.retries
    }

    pub fn max_retries(&self) -> u8 {
        self.max_retries
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Timestamp of the last granted attempt, if any.
    pub fn last_attempt_ms(&self) -> Option<u32> {
        self.last_attempt_ms
    }

    /// Whether an attempt is outstanding: granted at least once, neither
    /// confirmed nor failed.
    pub fn in_flight(&self) -> bool {
        self.retries > 0 && !self.ok && !self.error
    }

    /// The last attempt is still inside its timeout window.
    pub fn is_waiting(&self, now_ms: u32) -> bool {
        self.last_attempt_ms
            .is_some_and(|last| now_ms.wrapping_sub(last) < self.timeout_ms)
    }
}

impl From<RetryBudget> for RetryStatus {
    fn from(budget: RetryBudget) -> Self {
        Self::from_budget(budget)
    }
}
