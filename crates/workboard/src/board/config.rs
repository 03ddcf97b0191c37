//! Board capacity configuration

use serde::{Deserialize, Serialize};

use super::BoardError;

const DEFAULT_MAX_WAITING_JOBS: usize = 64;
const DEFAULT_WORKER_SLOTS: usize = 8;

/// Board configuration
///
/// Both capacities are fixed for the lifetime of the board.
///
/// # Example
///
/// ```
/// use workboard::BoardConfig;
///
/// let config = BoardConfig::default()
///     .with_max_waiting_jobs(10)
///     .with_worker_slots(4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// How many units of work can be queued before `post_work` suspends
    pub max_waiting_jobs: usize,

    /// How many workers can be offered at once before registration suspends.
    /// A throttle on concurrent offers, not a cap on how many workers exist.
    pub worker_slots: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_waiting_jobs: DEFAULT_MAX_WAITING_JOBS,
            worker_slots: DEFAULT_WORKER_SLOTS,
        }
    }
}

impl BoardConfig {
    /// Create a configuration with explicit capacities
    pub fn new(max_waiting_jobs: usize, worker_slots: usize) -> Self {
        Self {
            max_waiting_jobs,
            worker_slots,
        }
    }

    /// Load capacities from `WORKBOARD_MAX_WAITING_JOBS` and
    /// `WORKBOARD_WORKER_SLOTS`, falling back to defaults
    pub fn from_env() -> Self {
        let max_waiting_jobs = std::env::var("WORKBOARD_MAX_WAITING_JOBS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_WAITING_JOBS);

        let worker_slots = std::env::var("WORKBOARD_WORKER_SLOTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_WORKER_SLOTS);

        Self {
            max_waiting_jobs,
            worker_slots,
        }
    }

    /// Set the pending-work capacity
    pub fn with_max_waiting_jobs(mut self, max: usize) -> Self {
        self.max_waiting_jobs = max;
        self
    }

    /// Set the worker-offer capacity
    pub fn with_worker_slots(mut self, slots: usize) -> Self {
        self.worker_slots = slots;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), BoardError> {
        if self.max_waiting_jobs == 0 {
            return Err(BoardError::InvalidConfig(
                "max_waiting_jobs must be greater than 0".into(),
            ));
        }
        if self.worker_slots == 0 {
            return Err(BoardError::InvalidConfig(
                "worker_slots must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
