//! Frame-aligned host.
//!
//! [`FrameHost`] models a display loop: the embedder reports each frame
//! start with [`FrameHost::animation_frame`] and then gives the host a
//! chance to run with [`FrameHost::idle_tick`] once the frame's own work is
//! done. The time slice granted to the scheduler adapts to the observed
//! frame rate.

use crate::Millis;
use crate::config::FrameBudgetConfig;
use crate::host::Host;
use crate::scheduler::Scheduler;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

/// Millisecond clock.
pub trait Clock {
    fn now(&self) -> Millis;
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> Millis {
        (**self).now()
    }
}

/// Wall clock measured from its own creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Millis {
        Millis::try_from(self.origin.elapsed().as_millis()).unwrap_or(Millis::MAX)
    }
}

/// Running estimate of how long a frame lasts.
///
/// Two short frames in a row shrink the estimate (the display is faster
/// than assumed); one long frame resets the baseline.
#[derive(Debug, Clone)]
pub struct FrameBudget {
    config: FrameBudgetConfig,
    previous_frame_time: Millis,
    active_frame_time: Millis,
    frame_deadline: Millis,
}

impl FrameBudget {
    pub fn new(config: FrameBudgetConfig) -> Self {
        Self {
            previous_frame_time: config.initial_frame_time,
            active_frame_time: config.initial_frame_time,
            frame_deadline: 0,
            config,
        }
    }

    /// Account for a frame starting at `frame_start`. Returns the new
    /// frame deadline.
    pub fn on_animation_frame(&mut self, frame_start: Millis) -> Millis {
        let mut next_frame_time = frame_start - self.frame_deadline + self.active_frame_time;
        if next_frame_time < self.active_frame_time
            && self.previous_frame_time < self.active_frame_time
        {
            if next_frame_time < self.config.min_frame_time {
                tracing::debug!(next_frame_time, "frame time estimate clamped");
                next_frame_time = self.config.min_frame_time;
            }
            self.active_frame_time = next_frame_time.max(self.previous_frame_time);
        } else {
            self.previous_frame_time = next_frame_time;
        }
        self.frame_deadline = frame_start + self.active_frame_time;
        self.frame_deadline
    }

    pub fn frame_deadline(&self) -> Millis {
        self.frame_deadline
    }

    pub fn active_frame_time(&self) -> Millis {
        self.active_frame_time
    }
}

/// What an idle tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Nothing was requested.
    NoWork,
    /// The frame was spent and nothing had expired; retry next frame.
    Deferred,
    /// The scheduler ran.
    Flushed { did_timeout: bool },
}

/// Host that grants the scheduler the remainder of each frame.
pub struct FrameHost<C: Clock = MonotonicClock> {
    clock: C,
    budget: RefCell<FrameBudget>,
    requested: Cell<Option<Millis>>,
    animation_scheduled: Cell<bool>,
    idle_scheduled: Cell<bool>,
    flushing: Cell<bool>,
}

impl FrameHost<MonotonicClock> {
    pub fn new(config: FrameBudgetConfig) -> Self {
        Self::with_clock(MonotonicClock::new(), config)
    }
}

impl<C: Clock> FrameHost<C> {
    pub fn with_clock(clock: C, config: FrameBudgetConfig) -> Self {
        Self {
            clock,
            budget: RefCell::new(FrameBudget::new(config)),
            requested: Cell::new(None),
            animation_scheduled: Cell::new(false),
            idle_scheduled: Cell::new(false),
            flushing: Cell::new(false),
        }
    }

    /// Whether the host is waiting for the next frame start.
    pub fn wants_animation_frame(&self) -> bool {
        self.animation_scheduled.get()
    }

    /// Whether an idle tick is pending.
    pub fn wants_idle_tick(&self) -> bool {
        self.idle_scheduled.get()
    }

    pub fn active_frame_time(&self) -> Millis {
        self.budget.borrow().active_frame_time()
    }

    /// Frame start. Returns `false` once no work is requested, after which
    /// the host stops asking for frames.
    pub fn animation_frame(&self, frame_start: Millis) -> bool {
        if self.requested.get().is_none() {
            self.animation_scheduled.set(false);
            return false;
        }
        // Keep asking for frames while work is outstanding.
        self.animation_scheduled.set(true);
        let deadline = self.budget.borrow_mut().on_animation_frame(frame_start);
        tracing::trace!(frame_start, deadline, "animation frame");
        self.idle_scheduled.set(true);
        true
    }

    /// Run the scheduler with whatever is left of the frame.
    pub fn idle_tick(&self, scheduler: &Scheduler) -> IdleOutcome {
        if !self.idle_scheduled.replace(false) {
            return IdleOutcome::NoWork;
        }
        let Some(timeout) = self.requested.take() else {
            return IdleOutcome::NoWork;
        };

        let now = self.clock.now();
        let mut did_timeout = false;
        if self.frame_deadline() - now <= 0 {
            if timeout <= now {
                did_timeout = true;
            } else {
                self.animation_scheduled.set(true);
                self.requested.set(Some(timeout));
                tracing::trace!(now, timeout, "frame spent; deferring to the next one");
                return IdleOutcome::Deferred;
            }
        }

        self.flushing.set(true);
        let _flushing = FlushingGuard(&self.flushing);
        scheduler.flush_work(did_timeout);
        IdleOutcome::Flushed { did_timeout }
    }
}

struct FlushingGuard<'a>(&'a Cell<bool>);

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<C: Clock> Host for FrameHost<C> {
    fn now(&self) -> Millis {
        self.clock.now()
    }

    fn request_host_callback(&self, deadline: Millis) {
        self.requested.set(Some(deadline));
        if self.flushing.get() || deadline <= self.clock.now() {
            self.idle_scheduled.set(true);
        } else {
            self.animation_scheduled.set(true);
        }
    }

    fn cancel_host_callback(&self) {
        self.requested.set(None);
        self.idle_scheduled.set(false);
    }

    fn frame_deadline(&self) -> Millis {
        self.budget.borrow().frame_deadline()
    }
}
