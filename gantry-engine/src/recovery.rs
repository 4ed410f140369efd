//! Recovery policy
//!
//! A failed stage gets at most one automatic retry, after a fixed delay.
//! The retry redraws the failure decision like a fresh attempt; if it fails
//! the run stays Failed until an explicit reset.

use std::time::Duration;

use crate::config::EngineConfig;

/// Attempt number of the single recovery retry
pub const RECOVERY_ATTEMPT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub enabled: bool,
    pub delay: Duration,
}

impl RecoveryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            enabled: config.recovery_enabled,
            delay: config.recovery_delay,
        }
    }

    /// Delay before the retry of a stage that failed on `attempt`, or
    /// `None` when no retry follows
    pub fn retry_after(&self, attempt: u32) -> Option<Duration> {
        (self.enabled && attempt < RECOVERY_ATTEMPT).then_some(self.delay)
    }
}
