//! Scheduler and frame budget configuration.

use crate::Millis;
use crate::priority::Priority;

/// Largest signed 31-bit integer; idle work uses it as its timeout.
pub const MAX_SIGNED_31_BIT_INT: Millis = 1_073_741_823;

/// Timeout added to a callback's start time, per priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Negative, so immediate callbacks are already expired.
    pub immediate_timeout: Millis,
    pub user_blocking_timeout: Millis,
    pub normal_timeout: Millis,
    pub idle_timeout: Millis,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            immediate_timeout: -1,
            user_blocking_timeout: 250,
            normal_timeout: 5000,
            idle_timeout: MAX_SIGNED_31_BIT_INT,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout for one priority level.
    pub fn with_timeout(mut self, priority: Priority, timeout: Millis) -> Self {
        match priority {
            Priority::Immediate => self.immediate_timeout = timeout,
            Priority::UserBlocking => self.user_blocking_timeout = timeout,
            Priority::Normal => self.normal_timeout = timeout,
            Priority::Idle => self.idle_timeout = timeout,
        }
        self
    }

    pub fn timeout(&self, priority: Priority) -> Millis {
        match priority {
            Priority::Immediate => self.immediate_timeout,
            Priority::UserBlocking => self.user_blocking_timeout,
            Priority::Normal => self.normal_timeout,
            Priority::Idle => self.idle_timeout,
        }
    }
}

/// Tuning for the per-frame time slice estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBudgetConfig {
    /// Starting slice, about 30 frames per second.
    pub initial_frame_time: Millis,
    /// Smallest slice the estimate may shrink to, about 120 frames per second.
    pub min_frame_time: Millis,
}

impl Default for FrameBudgetConfig {
    fn default() -> Self {
        Self {
            initial_frame_time: 33,
            min_frame_time: 8,
        }
    }
}

impl FrameBudgetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_frame_time(mut self, ms: Millis) -> Self {
        self.initial_frame_time = ms;
        self
    }

    pub fn with_min_frame_time(mut self, ms: Millis) -> Self {
        self.min_frame_time = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts() {
        let config = SchedulerConfig::default();
        assert_eq!(config.timeout(Priority::Immediate), -1);
        assert_eq!(config.timeout(Priority::UserBlocking), 250);
        assert_eq!(config.timeout(Priority::Normal), 5000);
        assert_eq!(config.timeout(Priority::Idle), MAX_SIGNED_31_BIT_INT);
    }

    #[test]
    fn builder_overrides_one_level() {
        let config = SchedulerConfig::new().with_timeout(Priority::Normal, 1000);
        assert_eq!(config.timeout(Priority::Normal), 1000);
        assert_eq!(config.timeout(Priority::UserBlocking), 250);
    }
}
