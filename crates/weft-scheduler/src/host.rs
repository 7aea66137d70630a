//! The environment a [`Scheduler`] runs in.
//!
//! A host owns the clock and decides when the scheduler gets to run. The
//! scheduler asks for at most one host callback at a time; the host answers
//! by calling [`Scheduler::flush_work`], passing whether the requested
//! deadline has already passed.

use crate::Millis;
use crate::scheduler::Scheduler;
use std::cell::Cell;
use std::time::Duration;
use thiserror::Error;

/// Environment hooks required by the scheduler.
pub trait Host {
    /// Current time in milliseconds.
    fn now(&self) -> Millis;

    /// Arrange for [`Scheduler::flush_work`] to be called, by `deadline` at
    /// the latest. Replaces any earlier request.
    fn request_host_callback(&self, deadline: Millis);

    /// Drop the outstanding request, if any.
    fn cancel_host_callback(&self);

    /// End of the current time slice. Hosts without frames never run out.
    fn frame_deadline(&self) -> Millis {
        Millis::MAX
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("no tokio runtime is running on this thread")]
    NoRuntime,

    #[error("frame tick must be at least one millisecond, got {0:?}")]
    InvalidTick(Duration),
}

/// Host driven by hand, with a clock that moves only when told to.
///
/// Used by tests and by embedders that pump the scheduler from their own
/// loop.
#[derive(Debug)]
pub struct ManualHost {
    now: Cell<Millis>,
    frame_deadline: Cell<Millis>,
    requested: Cell<Option<Millis>>,
    requests: Cell<usize>,
    cancels: Cell<usize>,
}

impl Default for ManualHost {
    fn default() -> Self {
        Self {
            now: Cell::new(0),
            frame_deadline: Cell::new(Millis::MAX),
            requested: Cell::new(None),
            requests: Cell::new(0),
            cancels: Cell::new(0),
        }
    }
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: Millis) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    pub fn set_now(&self, now: Millis) {
        self.now.set(now);
    }

    pub fn set_frame_deadline(&self, deadline: Millis) {
        self.frame_deadline.set(deadline);
    }

    /// Deadline of the outstanding host callback request.
    pub fn scheduled(&self) -> Option<Millis> {
        self.requested.get()
    }

    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.get()
    }

    /// Deliver the outstanding host callback.
    ///
    /// Returns `false` if nothing was requested.
    pub fn fire(&self, scheduler: &Scheduler) -> bool {
        let Some(deadline) = self.requested.take() else {
            return false;
        };
        let did_timeout = deadline <= self.now.get();
        tracing::trace!(deadline, now = self.now.get(), did_timeout, "manual host callback");
        scheduler.flush_work(did_timeout);
        true
    }

    /// Fire host callbacks until none are requested. Returns how many fired.
    ///
    /// The clock does not move, so with a finite frame deadline in the past
    /// only expired work makes progress; callers that need everything to
    /// run should leave the deadline open.
    pub fn drain(&self, scheduler: &Scheduler) -> usize {
        let mut fired = 0;
        while self.fire(scheduler) {
            fired += 1;
        }
        fired
    }
}

impl Host for ManualHost {
    fn now(&self) -> Millis {
        self.now.get()
    }

    fn request_host_callback(&self, deadline: Millis) {
        self.requested.set(Some(deadline));
        self.requests.set(self.requests.get() + 1);
    }

    fn cancel_host_callback(&self) {
        self.requested.set(None);
        self.cancels.set(self.cancels.get() + 1);
    }

    fn frame_deadline(&self) -> Millis {
        self.frame_deadline.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ScheduleOptions, SchedulerConfig};
    use std::rc::Rc;

    #[test]
    fn fire_without_request_does_nothing() {
        let host = Rc::new(ManualHost::new());
        let scheduler = Scheduler::new(host.clone(), SchedulerConfig::default());
        assert!(!host.fire(&scheduler));
        assert_eq!(host.request_count(), 0);
    }

    #[test]
    fn drain_runs_everything_with_an_open_frame() {
        let host = Rc::new(ManualHost::new());
        let scheduler = Scheduler::new(host.clone(), SchedulerConfig::default());
        let count = Rc::new(Cell::new(0));
        for _ in 0..4 {
            let count = count.clone();
            scheduler.schedule_callback(
                move |_| {
                    count.set(count.get() + 1);
                    None
                },
                ScheduleOptions::default(),
            );
        }
        assert_eq!(host.drain(&scheduler), 1);
        assert_eq!(count.get(), 4);
        assert_eq!(host.scheduled(), None);
    }

    #[test]
    fn clock_moves_only_when_told() {
        let host = ManualHost::new();
        assert_eq!(host.now(), 0);
        host.advance(16);
        host.advance(4);
        assert_eq!(host.now(), 20);
        host.set_now(3);
        assert_eq!(host.now(), 3);
        assert_eq!(host.frame_deadline(), Millis::MAX);
    }
}
