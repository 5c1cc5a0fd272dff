//! In-memory mirror of run progress for external observers
//!
//! Durable truth lives in the repository; the registry only reflects the
//! latest observed state of runs started in this process. Entries are
//! retained for the lifetime of the process so observers can read terminal
//! states after a run finishes.

use bench_core::types::RunStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Observed state of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    pub status: RunStatus,
    /// Percentage in 0..=100, non-decreasing within a run
    pub progress: u8,
    pub error: Option<String>,
}

/// Thread-safe map of `run_id -> RunState`.
///
/// Single writer (the run coordinator), many readers; a `std` RwLock is
/// sufficient since writes never suspend.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    inner: RwLock<HashMap<Uuid, RunState>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, run_id: Uuid) -> Option<RunState> {
        self.read().get(&run_id).cloned()
    }

    pub fn contains(&self, run_id: Uuid) -> bool {
        self.read().contains_key(&run_id)
    }

    /// Publish the full state of a run. Progress never moves backwards: a
    /// lower value than previously observed is clamped up.
    pub fn publish(&self, run_id: Uuid, status: RunStatus, progress: u8, error: Option<String>) {
        let mut map = self.write();
        let progress = match map.get(&run_id) {
            Some(existing) => existing.progress.max(progress.min(100)),
            None => progress.min(100),
        };
        map.insert(
            run_id,
            RunState {
                status,
                progress,
                error,
            },
        );
    }

    /// Update only the progress of a known run, keeping status and error
    pub fn set_progress(&self, run_id: Uuid, progress: u8) {
        let mut map = self.write();
        if let Some(state) = map.get_mut(&run_id) {
            state.progress = state.progress.max(progress.min(100));
        }
    }

    /// All tracked runs and their states
    pub fn snapshot(&self) -> Vec<(Uuid, RunState)> {
        self.read().iter().map(|(id, state)| (*id, state.clone())).collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, RunState>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, RunState>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
