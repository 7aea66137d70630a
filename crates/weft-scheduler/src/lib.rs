//! Cooperative priority scheduler for weft.
//!
//! Work is queued with a [`Priority`], which turns into an absolute
//! expiration time. A [`Host`] decides when the [`Scheduler`] may run;
//! [`ManualHost`] is driven by hand, [`FrameHost`] slices work into frames,
//! and with the `tokio-host` feature `TimerHost` paces frames from a tokio
//! interval.

/// Milliseconds on the host clock.
pub type Millis = i64;

pub mod config;
pub mod frame;
pub mod host;
pub mod priority;
pub mod ready_queue;
pub mod scheduler;
#[cfg(feature = "tokio-host")]
pub mod timer;

pub use config::{FrameBudgetConfig, MAX_SIGNED_31_BIT_INT, SchedulerConfig};
pub use frame::{Clock, FrameBudget, FrameHost, IdleOutcome, MonotonicClock};
pub use host::{Host, HostError, ManualHost};
pub use priority::Priority;
pub use ready_queue::CallbackNode;
pub use scheduler::{Deadline, ScheduleOptions, Scheduler, Task};
#[cfg(feature = "tokio-host")]
pub use timer::{FallbackHost, TimerHost, TimerHostConfig, timer_host_or_manual};
