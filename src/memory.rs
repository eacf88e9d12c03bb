use crate::engine::{effective_window, window_key, QuotaEngine};
use crate::error::{QuotaError, Result};
use crate::identifier::Identifier;
use crate::policy::QuotaPolicy;
use crate::status::Status;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// In-process fixed-window quota engine.
///
/// Each identifier/policy pair owns a counter that resets once its window
/// elapses. Counting and reporting happen under a single lock, so concurrent
/// checks for one identifier are serialized.
#[derive(Clone, Default)]
pub struct InMemoryEngine {
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    reset_at: SystemTime,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_at(&self, identifier: &Identifier, policy: &QuotaPolicy, now: SystemTime) -> Result<Status> {
        let next_reset = now.checked_add(effective_window(policy)).ok_or_else(|| {
            QuotaError::Validation(format!(
                "Quota window of {:?} is out of range",
                policy.window()
            ))
        })?;

        let mut windows = self
            .windows
            .lock()
            .map_err(|_| QuotaError::Engine("Failed to acquire lock on quota windows".to_string()))?;

        let window = windows
            .entry(window_key(identifier, policy))
            .or_insert(Window {
                count: 0,
                reset_at: next_reset,
            });

        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = next_reset;
        }

        window.count = window.count.saturating_add(1);

        Ok(Status::from_usage(policy.limit(), window.count, window.reset_at))
    }

    /// Drop windows that have already elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = SystemTime::now();
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| QuotaError::Engine("Failed to acquire lock on quota windows".to_string()))?;

        let initial_count = windows.len();
        windows.retain(|_, window| window.reset_at > now);
        let purged = initial_count - windows.len();

        if purged > 0 {
            tracing::debug!(target: "quota_gate::memory", purged, "Purged expired quota windows");
        }
        Ok(purged)
    }

    /// Number of windows currently tracked.
    pub fn tracked_windows(&self) -> Result<usize> {
        let windows = self
            .windows
            .lock()
            .map_err(|_| QuotaError::Engine("Failed to acquire lock on quota windows".to_string()))?;
        Ok(windows.len())
    }
}

#[async_trait]
impl QuotaEngine for InMemoryEngine {
    async fn check(&self, identifier: &Identifier, policy: &QuotaPolicy) -> Result<Status> {
        self.check_at(identifier, policy, SystemTime::now())
    }
}
