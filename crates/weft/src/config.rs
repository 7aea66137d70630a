//! Runtime configuration.

use weft_core::RE_RENDER_LIMIT;
use weft_scheduler::Millis;

/// Tuning for the render driver.
///
/// Per-priority timeouts live in the scheduler's
/// [`SchedulerConfig`](weft_scheduler::SchedulerConfig); the runtime only
/// decides how coarsely update urgencies are bucketed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Bucket width for user-blocking updates.
    pub user_blocking_bucket: Millis,
    /// Bucket width for normal updates.
    pub normal_bucket: Millis,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            user_blocking_bucket: 100,
            normal_bucket: 250,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_blocking_bucket(mut self, ms: Millis) -> Self {
        self.user_blocking_bucket = ms;
        self
    }

    pub fn with_normal_bucket(mut self, ms: Millis) -> Self {
        self.normal_bucket = ms;
        self
    }

    /// Render attempts allowed per pass. Not configurable.
    pub fn re_render_limit(&self) -> usize {
        RE_RENDER_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.user_blocking_bucket, 100);
        assert_eq!(config.normal_bucket, 250);
        assert_eq!(config.re_render_limit(), 25);
    }

    #[test]
    fn builders_override_buckets() {
        let config = RuntimeConfig::new()
            .with_user_blocking_bucket(10)
            .with_normal_bucket(1);
        assert_eq!(config.user_blocking_bucket, 10);
        assert_eq!(config.normal_bucket, 1);
    }
}
