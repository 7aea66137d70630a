//! Weft - interruptible, priority-ordered rendering of stateful function
//! components.
//!
//! A component is a render function with hook state. The [`Runtime`]
//! mounts components, turns state updates into prioritized render work on a
//! cooperative [`Scheduler`], and commits effects once a render completes.
//! Low-priority updates never block urgent ones: a render at high urgency
//! skips them and a later pass replays them in order.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::rc::Rc;
//! use weft::prelude::*;
//!
//! fn counter(cx: &mut RenderContext<'_>) -> Result<String, HookError> {
//!     let (count, set_count) = cx.use_state(|| 0)?;
//!     cx.use_effect(move || tracing::info!(count, "rendered"), Some(count))?;
//!     Ok(format!("count = {count}"))
//! }
//!
//! let host = Rc::new(ManualHost::new());
//! let scheduler = Scheduler::new(host.clone(), SchedulerConfig::default());
//! let runtime = Runtime::new(scheduler, RuntimeConfig::default());
//! let handle = runtime.mount(counter)?;
//! host.drain(runtime.scheduler());
//! assert_eq!(handle.output(), "count = 0");
//! ```
//!
//! # Hooks
//!
//! The hooks live on [`RenderContext`]. See the [`weft_core::hooks`] module
//! for the full list and the rules every render must follow.

pub mod config;
pub mod error;
pub mod events;
pub mod runtime;

pub mod prelude {
    //! Common imports for weft applications.
    pub use crate::config::RuntimeConfig;
    pub use crate::error::RenderError;
    pub use crate::events::EventHandlerId;
    pub use crate::runtime::{Runtime, UnitHandle};
    pub use weft_core::{
        Component, Dispatch, EVERY_RENDER, ForwardedRef, HookError, RefHandle, RenderContext,
        SetState, Urgency,
    };
    pub use weft_scheduler::{ManualHost, Priority, ScheduleOptions, Scheduler, SchedulerConfig};
    #[cfg(feature = "tokio-host")]
    pub use weft_scheduler::{FallbackHost, TimerHost, TimerHostConfig, timer_host_or_manual};
}

pub use config::RuntimeConfig;
pub use error::RenderError;
pub use events::{EventCallback, EventHandlerId, EventRegistry};
pub use runtime::{Runtime, UnitHandle};

/// Install the default `tracing_subscriber` formatter.
///
/// Does nothing if a global subscriber is already set.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}
