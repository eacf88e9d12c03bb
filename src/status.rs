use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of a single quota check.
///
/// Created once per request by a [`QuotaEngine`](crate::engine::QuotaEngine)
/// and consumed by the pipeline to pick a branch and decorate the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    quota: u64,
    remaining_attempts: u64,
    reset_at: SystemTime,
    quota_exceeded: bool,
}

impl Status {
    pub fn new(quota: u64, remaining_attempts: u64, reset_at: SystemTime, quota_exceeded: bool) -> Self {
        Self {
            quota,
            remaining_attempts,
            reset_at,
            quota_exceeded,
        }
    }

    /// Build a status from the number of operations counted in the current
    /// window, including the one being checked.
    pub fn from_usage(limit: u64, current: u64, reset_at: SystemTime) -> Self {
        Self {
            quota: limit,
            remaining_attempts: limit.saturating_sub(current),
            reset_at,
            quota_exceeded: current > limit,
        }
    }

    pub fn quota(&self) -> u64 {
        self.quota
    }

    pub fn remaining_attempts(&self) -> u64 {
        self.remaining_attempts
    }

    pub fn reset_at(&self) -> SystemTime {
        self.reset_at
    }

    /// Reset instant as Unix epoch seconds.
    pub fn reset_timestamp(&self) -> u64 {
        self.reset_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    pub fn quota_exceeded(&self) -> bool {
        self.quota_exceeded
    }
}
