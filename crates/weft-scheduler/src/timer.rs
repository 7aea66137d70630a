//! Frame host paced by a tokio interval.

use crate::Millis;
use crate::config::FrameBudgetConfig;
use crate::frame::{FrameHost, IdleOutcome, MonotonicClock};
use crate::host::{Host, HostError, ManualHost};
use crate::scheduler::Scheduler;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerHostConfig {
    /// Interval between simulated frames.
    pub tick: Duration,
    pub frame: FrameBudgetConfig,
}

impl Default for TimerHostConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(16),
            frame: FrameBudgetConfig::default(),
        }
    }
}

impl TimerHostConfig {
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_frame(mut self, frame: FrameBudgetConfig) -> Self {
        self.frame = frame;
        self
    }
}

/// [`FrameHost`] whose frames come from a tokio interval on the current
/// thread's runtime.
pub struct TimerHost {
    frames: FrameHost<MonotonicClock>,
    tick: Duration,
}

impl TimerHost {
    /// Create a host bound to the running tokio runtime.
    pub fn connect(config: TimerHostConfig) -> Result<Rc<Self>, HostError> {
        if config.tick < Duration::from_millis(1) {
            return Err(HostError::InvalidTick(config.tick));
        }
        tokio::runtime::Handle::try_current().map_err(|_| HostError::NoRuntime)?;
        Ok(Rc::new(Self {
            frames: FrameHost::new(config.frame),
            tick: config.tick,
        }))
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Drive `scheduler` frame by frame until its queue is empty and no host
    /// callback is outstanding.
    pub async fn run_until_idle(&self, scheduler: &Scheduler) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frames = 0usize;
        loop {
            self.drain_idle_ticks(scheduler);
            if !self.frames.wants_animation_frame() && !self.frames.wants_idle_tick() {
                break;
            }
            interval.tick().await;
            if self.frames.wants_animation_frame() {
                frames += 1;
                self.frames.animation_frame(self.frames.now());
            }
        }
        tracing::debug!(frames, "scheduler idle");
    }

    fn drain_idle_ticks(&self, scheduler: &Scheduler) {
        while self.frames.wants_idle_tick() {
            if let IdleOutcome::Deferred = self.frames.idle_tick(scheduler) {
                break;
            }
        }
    }
}

impl Host for TimerHost {
    fn now(&self) -> Millis {
        self.frames.now()
    }

    fn request_host_callback(&self, deadline: Millis) {
        self.frames.request_host_callback(deadline);
    }

    fn cancel_host_callback(&self) {
        self.frames.cancel_host_callback();
    }

    fn frame_deadline(&self) -> Millis {
        self.frames.frame_deadline()
    }
}

static FALLBACK_REPORTED: AtomicBool = AtomicBool::new(false);

/// Host chosen by [`timer_host_or_manual`].
#[derive(Clone)]
pub enum FallbackHost {
    Timer(Rc<TimerHost>),
    /// No tokio runtime; callbacks run only when drained.
    Manual(Rc<ManualHost>),
}

impl FallbackHost {
    pub fn host(&self) -> Rc<dyn Host> {
        match self {
            Self::Timer(host) => host.clone(),
            Self::Manual(host) => host.clone(),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual(_))
    }

    /// Run `scheduler` until it has no work left. A manual host drains
    /// synchronously.
    pub async fn run_until_idle(&self, scheduler: &Scheduler) {
        match self {
            Self::Timer(host) => host.run_until_idle(scheduler).await,
            Self::Manual(host) => {
                let fired = host.drain(scheduler);
                tracing::debug!(fired, "manual host drained");
            }
        }
    }
}

/// Connect a [`TimerHost`], or fall back to a [`ManualHost`] when the timer
/// host cannot start. The failure is logged once per process.
pub fn timer_host_or_manual(config: TimerHostConfig) -> FallbackHost {
    match TimerHost::connect(config) {
        Ok(host) => FallbackHost::Timer(host),
        Err(err) => {
            if !FALLBACK_REPORTED.swap(true, Ordering::Relaxed) {
                tracing::error!(%err, "timer host unavailable; falling back to manual host");
            }
            FallbackHost::Manual(Rc::new(ManualHost::new()))
        }
    }
}
