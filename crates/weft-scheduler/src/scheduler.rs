//! Cooperative priority scheduler.
//!
//! Callbacks wait in a [`ReadyQueue`] ordered by expiration. The host calls
//! [`Scheduler::flush_work`] when it has time to spare; the scheduler then
//! runs callbacks one at a time until the frame budget is spent, or, when
//! the host reports a timeout, until no overdue callbacks remain. Callbacks
//! are never interrupted: yielding happens only between them.

use crate::Millis;
use crate::config::SchedulerConfig;
use crate::host::Host;
use crate::priority::Priority;
use crate::ready_queue::{CallbackNode, Placement, ReadyQueue};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A unit of work run by the scheduler.
///
/// Returning a task from a callback schedules it as a continuation with the
/// same priority and expiration.
pub struct Task(Box<dyn FnOnce(&Deadline) -> Option<Task>>);

impl Task {
    pub fn new(f: impl FnOnce(&Deadline) -> Option<Task> + 'static) -> Self {
        Task(Box::new(f))
    }

    fn run(self, deadline: &Deadline) -> Option<Task> {
        (self.0)(deadline)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task(..)")
    }
}

/// Options for [`Scheduler::schedule_callback`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOptions {
    /// Priority to schedule at. Defaults to the current priority level.
    pub priority: Option<Priority>,
    /// Explicit timeout from the start time, overriding the priority's.
    pub timeout: Option<Millis>,
}

impl ScheduleOptions {
    pub fn priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Millis) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Time budget handed to a running callback.
pub struct Deadline {
    scheduler: Scheduler,
    did_timeout: bool,
}

impl Deadline {
    /// Whether the callback runs because its expiration passed.
    pub fn did_timeout(&self) -> bool {
        self.did_timeout
    }

    /// Milliseconds left in the current frame.
    ///
    /// Zero as soon as something more urgent than the running callback has
    /// been scheduled.
    pub fn time_remaining(&self) -> Millis {
        let inner = &self.scheduler.inner;
        {
            let state = inner.state.borrow();
            if let (Some(head), Some(current)) =
                (state.queue.head_expiration(), state.ambient.expiration)
                && head < current
            {
                return 0;
            }
        }
        inner
            .host
            .frame_deadline()
            .saturating_sub(inner.host.now())
            .max(0)
    }

    pub fn should_yield(&self) -> bool {
        self.time_remaining() <= 0
    }
}

#[derive(Clone, Copy)]
struct Ambient {
    priority: Priority,
    event_start: Option<Millis>,
    expiration: Option<Millis>,
}

struct State {
    queue: ReadyQueue<Task>,
    ambient: Ambient,
    is_executing: bool,
    is_host_callback_scheduled: bool,
}

struct SchedulerInner {
    host: Rc<dyn Host>,
    config: SchedulerConfig,
    state: RefCell<State>,
}

/// Restores the ambient priority context on drop, including on unwind.
struct AmbientGuard<'s> {
    inner: &'s SchedulerInner,
    saved: Ambient,
}

impl Drop for AmbientGuard<'_> {
    fn drop(&mut self) {
        self.inner.state.borrow_mut().ambient = self.saved;
    }
}

/// Holds the "already executing" flag, restoring its previous value on drop.
struct ExecutingGuard<'s> {
    inner: &'s SchedulerInner,
    previous: bool,
}

impl<'s> ExecutingGuard<'s> {
    fn enter(inner: &'s SchedulerInner) -> Self {
        let previous = std::mem::replace(&mut inner.state.borrow_mut().is_executing, true);
        Self { inner, previous }
    }
}

impl Drop for ExecutingGuard<'_> {
    fn drop(&mut self) {
        self.inner.state.borrow_mut().is_executing = self.previous;
    }
}

/// Handle to a cooperative scheduler. Clones share the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub fn new<H: Host + 'static>(host: Rc<H>, config: SchedulerConfig) -> Self {
        Self::with_host(host, config)
    }

    pub fn with_host(host: Rc<dyn Host>, config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                host,
                config,
                state: RefCell::new(State {
                    queue: ReadyQueue::new(),
                    ambient: Ambient {
                        priority: Priority::Normal,
                        event_start: None,
                        expiration: None,
                    },
                    is_executing: false,
                    is_host_callback_scheduled: false,
                }),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.inner.host
    }

    /// Current time on the host's clock.
    pub fn now(&self) -> Millis {
        self.inner.host.now()
    }

    /// Base for new expirations: the current event's start time inside
    /// [`run_with_priority`](Self::run_with_priority), otherwise now.
    pub fn current_start_time(&self) -> Millis {
        let event_start = self.inner.state.borrow().ambient.event_start;
        event_start.unwrap_or_else(|| self.inner.host.now())
    }

    pub fn current_priority_level(&self) -> Priority {
        self.inner.state.borrow().ambient.priority
    }

    /// Whether no callbacks are waiting.
    pub fn is_idle(&self) -> bool {
        self.inner.state.borrow().queue.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.inner.state.borrow().queue.len()
    }

    pub fn is_host_callback_scheduled(&self) -> bool {
        self.inner.state.borrow().is_host_callback_scheduled
    }

    /// Expiration of the next callback to run.
    pub fn next_expiration(&self) -> Option<Millis> {
        self.inner.state.borrow().queue.head_expiration()
    }

    /// Queue `callback` to run once the host grants time.
    ///
    /// The expiration is the start time plus the priority's timeout, where
    /// the start time is the current event's start if called from within
    /// [`run_with_priority`](Self::run_with_priority), and now otherwise.
    /// Callbacks with equal expirations run in the order they were scheduled.
    pub fn schedule_callback(
        &self,
        callback: impl FnOnce(&Deadline) -> Option<Task> + 'static,
        options: ScheduleOptions,
    ) -> CallbackNode {
        let (node, priority, expiration, became_head) = {
            let mut state = self.inner.state.borrow_mut();
            let start = state
                .ambient
                .event_start
                .unwrap_or_else(|| self.inner.host.now());
            let priority = options.priority.unwrap_or(state.ambient.priority);
            let timeout = options
                .timeout
                .unwrap_or_else(|| self.inner.config.timeout(priority));
            let expiration = start.saturating_add(timeout);
            let (node, became_head) = state.queue.insert(
                priority,
                expiration,
                Task::new(callback),
                Placement::AfterEqual,
            );
            (node, priority, expiration, became_head)
        };
        tracing::debug!(?node, %priority, expiration, became_head, "callback scheduled");
        if became_head {
            self.ensure_host_callback();
        }
        node
    }

    /// Remove a callback that has not started running.
    ///
    /// Returns `false` if the callback already ran or was canceled.
    pub fn cancel_callback(&self, node: CallbackNode) -> bool {
        let removed = self.inner.state.borrow_mut().queue.remove(node).is_some();
        if removed {
            tracing::debug!(?node, "callback canceled");
        } else {
            tracing::debug!(?node, "cancel of a callback no longer queued ignored");
        }
        removed
    }

    /// Run `f` with `priority` as the current priority level.
    ///
    /// Callbacks scheduled inside `f` measure their expiration from the
    /// moment `f` started. The previous level is restored afterwards, even
    /// if `f` panics, and any immediate work scheduled by `f` is flushed
    /// before returning.
    pub fn run_with_priority<R>(&self, priority: Priority, f: impl FnOnce() -> R) -> R {
        let result = {
            let _restore = self.enter_event(priority);
            f()
        };
        self.flush_immediate_work();
        result
    }

    /// [`run_with_priority`](Self::run_with_priority) with a numeric level.
    /// Unknown levels run at `Normal`.
    pub fn run_with_priority_level<R>(&self, level: u8, f: impl FnOnce() -> R) -> R {
        self.run_with_priority(Priority::from_level(level), f)
    }

    /// Capture the current priority level; the returned closure runs `f` at
    /// that level no matter where it is called from.
    pub fn wrap_callback<R>(
        &self,
        mut f: impl FnMut() -> R + 'static,
    ) -> impl FnMut() -> R + 'static {
        let scheduler = self.clone();
        let priority = self.current_priority_level();
        move || scheduler.run_with_priority(priority, &mut f)
    }

    /// Host entry point: run queued callbacks.
    ///
    /// With `did_timeout`, every callback whose expiration has passed runs
    /// without yielding. Otherwise callbacks run until the frame deadline.
    pub fn flush_work(&self, did_timeout: bool) {
        if self.inner.state.borrow().is_executing {
            tracing::warn!("flush_work called while callbacks are running; ignored");
            return;
        }
        {
            let _executing = ExecutingGuard::enter(&self.inner);
            if did_timeout {
                loop {
                    let now = self.now();
                    if !self.head_expired_at(now) {
                        break;
                    }
                    while self.head_expired_at(now) {
                        self.flush_first_callback(true);
                    }
                }
            } else if !self.is_idle() {
                loop {
                    self.flush_first_callback(false);
                    let remaining = self.inner.host.frame_deadline().saturating_sub(self.now());
                    if self.is_idle() || remaining <= 0 {
                        break;
                    }
                }
            }
        }
        self.after_flush();
        self.flush_immediate_work();
    }

    /// Run queued immediate callbacks now, for callers that produce sync
    /// work outside [`run_with_priority`](Self::run_with_priority).
    ///
    /// Does nothing inside an event or while callbacks are running; the
    /// event or the running flush picks the work up when it ends.
    pub fn flush_immediate(&self) {
        if self.inner.state.borrow().is_executing {
            return;
        }
        self.flush_immediate_work();
    }

    fn enter_event(&self, priority: Priority) -> AmbientGuard<'_> {
        let now = self.inner.host.now();
        let mut state = self.inner.state.borrow_mut();
        let saved = state.ambient;
        state.ambient.priority = priority;
        state.ambient.event_start = Some(now);
        AmbientGuard {
            inner: &self.inner,
            saved,
        }
    }

    fn head_expired_at(&self, now: Millis) -> bool {
        self.next_expiration().is_some_and(|expiration| expiration <= now)
    }

    fn flush_first_callback(&self, did_timeout: bool) {
        let (node, entry, restore) = {
            let mut state = self.inner.state.borrow_mut();
            let Some((node, entry)) = state.queue.pop_head() else {
                tracing::debug!("flush of an empty ready queue ignored");
                return;
            };
            let saved = state.ambient;
            state.ambient.priority = entry.priority;
            state.ambient.expiration = Some(entry.expiration);
            let restore = AmbientGuard {
                inner: &self.inner,
                saved,
            };
            (node, entry, restore)
        };

        tracing::trace!(?node, priority = %entry.priority, did_timeout, "running callback");
        let deadline = Deadline {
            scheduler: self.clone(),
            did_timeout,
        };
        let continuation = entry.value.run(&deadline);
        drop(restore);

        if let Some(task) = continuation {
            let (node, became_head) = self.inner.state.borrow_mut().queue.insert(
                entry.priority,
                entry.expiration,
                task,
                Placement::BeforeEqual,
            );
            tracing::debug!(?node, became_head, "continuation scheduled");
            if became_head {
                self.ensure_host_callback();
            }
        }
    }

    /// Run immediate callbacks at the head of the queue, once outside any
    /// event handler.
    fn flush_immediate_work(&self) {
        let should_flush = {
            let state = self.inner.state.borrow();
            state.ambient.event_start.is_none()
                && state.queue.head_priority() == Some(Priority::Immediate)
        };
        if !should_flush {
            return;
        }
        {
            let _executing = ExecutingGuard::enter(&self.inner);
            loop {
                self.flush_first_callback(true);
                if self.inner.state.borrow().queue.head_priority() != Some(Priority::Immediate) {
                    break;
                }
            }
        }
        self.after_flush();
    }

    fn after_flush(&self) {
        let has_work = {
            let mut state = self.inner.state.borrow_mut();
            if state.queue.is_empty() {
                state.is_host_callback_scheduled = false;
                false
            } else {
                true
            }
        };
        if has_work {
            self.ensure_host_callback();
        }
    }

    fn ensure_host_callback(&self) {
        let (expiration, was_scheduled) = {
            let mut state = self.inner.state.borrow_mut();
            if state.is_executing {
                return;
            }
            let Some(expiration) = state.queue.head_expiration() else {
                return;
            };
            let was_scheduled = std::mem::replace(&mut state.is_host_callback_scheduled, true);
            (expiration, was_scheduled)
        };
        if was_scheduled {
            self.inner.host.cancel_host_callback();
        }
        tracing::trace!(expiration, "requesting host callback");
        self.inner.host.request_host_callback(expiration);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Scheduler")
            .field("pending", &state.queue.len())
            .field("priority", &state.ambient.priority)
            .field("executing", &state.is_executing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ManualHost;
    use std::cell::{Cell, RefCell};

    fn setup() -> (Rc<ManualHost>, Scheduler) {
        let host = Rc::new(ManualHost::new());
        let scheduler = Scheduler::new(host.clone(), SchedulerConfig::default());
        (host, scheduler)
    }

    fn record(
        log: &Rc<RefCell<Vec<Millis>>>,
        tag: Millis,
    ) -> impl FnOnce(&Deadline) -> Option<Task> + 'static {
        let log = log.clone();
        move |_| {
            log.borrow_mut().push(tag);
            None
        }
    }

    #[test]
    fn drains_in_expiration_order_with_fifo_ties() {
        let (host, scheduler) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (tag, timeout) in [(1, 50), (2, 10), (3, 30), (4, 10)] {
            scheduler.schedule_callback(
                record(&log, tag),
                ScheduleOptions::default().with_timeout(timeout),
            );
        }
        assert!(host.fire(&scheduler));
        assert_eq!(*log.borrow(), vec![2, 4, 3, 1]);
        assert!(scheduler.is_idle());
        assert!(!scheduler.is_host_callback_scheduled());
    }

    #[test]
    fn host_callback_follows_the_head() {
        let (host, scheduler) = setup();
        scheduler.schedule_callback(|_| None, ScheduleOptions::default().with_timeout(100));
        assert_eq!(host.scheduled(), Some(100));
        scheduler.schedule_callback(|_| None, ScheduleOptions::default().with_timeout(200));
        assert_eq!(host.scheduled(), Some(100));
        assert_eq!(host.request_count(), 1);
        scheduler.schedule_callback(|_| None, ScheduleOptions::default().with_timeout(20));
        assert_eq!(host.scheduled(), Some(20));
        assert_eq!(host.cancel_count(), 1);
    }

    #[test]
    fn expiration_comes_from_priority_timeout() {
        let (host, scheduler) = setup();
        host.set_now(1000);
        scheduler.schedule_callback(|_| None, ScheduleOptions::priority(Priority::UserBlocking));
        assert_eq!(scheduler.next_expiration(), Some(1250));
        scheduler.run_with_priority(Priority::Normal, || {
            scheduler.schedule_callback(|_| None, ScheduleOptions::default());
        });
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn budget_limited_flush_leaves_the_rest_queued() {
        let (host, scheduler) = setup();
        host.set_frame_deadline(5);
        let ran = Rc::new(Cell::new(0));
        for _ in 0..6 {
            let host = host.clone();
            let ran = ran.clone();
            scheduler.schedule_callback(
                move |_| {
                    host.advance(2);
                    ran.set(ran.get() + 1);
                    None
                },
                ScheduleOptions::default(),
            );
        }
        assert!(host.fire(&scheduler));
        assert_eq!(ran.get(), 3);
        assert_eq!(scheduler.pending(), 3);
        assert_eq!(host.scheduled(), scheduler.next_expiration());
    }

    #[test]
    fn timed_out_flush_runs_only_overdue_callbacks() {
        let (host, scheduler) = setup();
        host.set_frame_deadline(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.schedule_callback(record(&log, 1), ScheduleOptions::default().with_timeout(10));
        scheduler.schedule_callback(record(&log, 2), ScheduleOptions::default().with_timeout(20));
        scheduler.schedule_callback(record(&log, 3), ScheduleOptions::default().with_timeout(90));
        host.set_now(25);
        assert!(host.fire(&scheduler));
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn deadline_reports_more_urgent_work() {
        let (host, scheduler) = setup();
        let observed = Rc::new(RefCell::new(Vec::new()));
        let inner_scheduler = scheduler.clone();
        let seen = observed.clone();
        scheduler.schedule_callback(
            move |deadline| {
                seen.borrow_mut().push(deadline.time_remaining() > 0);
                inner_scheduler.schedule_callback(
                    |_| None,
                    ScheduleOptions::priority(Priority::UserBlocking),
                );
                seen.borrow_mut().push(deadline.time_remaining() > 0);
                None
            },
            ScheduleOptions::priority(Priority::Normal),
        );
        host.fire(&scheduler);
        assert_eq!(*observed.borrow(), vec![true, false]);
    }

    #[test]
    fn continuation_runs_before_equal_expirations() {
        let (host, scheduler) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = log.clone();
        let continuation = log.clone();
        scheduler.schedule_callback(
            move |deadline| {
                first.borrow_mut().push(1);
                assert!(!deadline.did_timeout());
                Some(Task::new(move |_| {
                    continuation.borrow_mut().push(10);
                    None
                }))
            },
            ScheduleOptions::default().with_timeout(50),
        );
        scheduler.schedule_callback(record(&log, 2), ScheduleOptions::default().with_timeout(50));
        host.set_frame_deadline(0);
        host.fire(&scheduler);
        assert_eq!(*log.borrow(), vec![1]);
        host.set_frame_deadline(Millis::MAX);
        host.fire(&scheduler);
        assert_eq!(*log.borrow(), vec![1, 10, 2]);
    }

    #[test]
    fn cancel_is_idempotent() {
        let (host, scheduler) = setup();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let node = scheduler.schedule_callback(move |_| {
            flag.set(true);
            None
        }, ScheduleOptions::default());
        assert!(scheduler.cancel_callback(node));
        assert!(!scheduler.cancel_callback(node));
        host.fire(&scheduler);
        assert!(!ran.get());
    }

    #[test]
    fn run_with_priority_restores_and_flushes_immediate_work() {
        let (_host, scheduler) = setup();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let seen = scheduler.run_with_priority(Priority::Immediate, || {
            scheduler.schedule_callback(
                move |deadline| {
                    flag.set(deadline.did_timeout());
                    None
                },
                ScheduleOptions::default(),
            );
            assert!(!ran.get());
            scheduler.current_priority_level()
        });
        assert_eq!(seen, Priority::Immediate);
        assert_eq!(scheduler.current_priority_level(), Priority::Normal);
        assert!(ran.get());
        assert!(scheduler.is_idle());
    }

    #[test]
    fn nested_events_flush_immediate_work_at_the_outermost_level() {
        let (_host, scheduler) = setup();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        scheduler.run_with_priority(Priority::UserBlocking, || {
            scheduler.run_with_priority(Priority::Immediate, || {
                scheduler.schedule_callback(
                    move |_| {
                        flag.set(true);
                        None
                    },
                    ScheduleOptions::default(),
                );
            });
            assert!(!ran.get());
        });
        assert!(ran.get());
    }

    #[test]
    fn flush_immediate_runs_sync_work_outside_events() {
        let (host, scheduler) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let immediate = ScheduleOptions::priority(Priority::Immediate);
        scheduler.schedule_callback(record(&log, 2), ScheduleOptions::priority(Priority::Normal));
        scheduler.schedule_callback(record(&log, 1), immediate);

        scheduler.run_with_priority(Priority::UserBlocking, || {
            scheduler.flush_immediate();
            assert!(log.borrow().is_empty());
        });
        assert_eq!(*log.borrow(), vec![1]);

        scheduler.schedule_callback(record(&log, 3), immediate);
        scheduler.flush_immediate();
        assert_eq!(*log.borrow(), vec![1, 3]);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(host.scheduled(), scheduler.next_expiration());
    }

    #[test]
    fn priority_is_restored_after_a_panic() {
        let (_host, scheduler) = setup();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            scheduler.run_with_priority(Priority::Idle, || panic!("handler failed"));
        }));
        assert!(result.is_err());
        assert_eq!(scheduler.current_priority_level(), Priority::Normal);
    }

    #[test]
    fn unknown_level_runs_at_normal() {
        let (_host, scheduler) = setup();
        let level = scheduler.run_with_priority_level(42, || scheduler.current_priority_level());
        assert_eq!(level, Priority::Normal);
    }

    #[test]
    fn wrapped_callback_keeps_its_priority() {
        let (_host, scheduler) = setup();
        let mut wrapped = scheduler.run_with_priority(Priority::UserBlocking, || {
            let inner = scheduler.clone();
            scheduler.wrap_callback(move || inner.current_priority_level())
        });
        assert_eq!(scheduler.current_priority_level(), Priority::Normal);
        assert_eq!(wrapped(), Priority::UserBlocking);
    }

    #[test]
    fn flush_is_not_reentrant() {
        let (host, scheduler) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner = scheduler.clone();
        let outer_log = log.clone();
        scheduler.schedule_callback(
            move |_| {
                outer_log.borrow_mut().push(1);
                inner.flush_work(true);
                None
            },
            ScheduleOptions::default().with_timeout(1),
        );
        scheduler.schedule_callback(record(&log, 2), ScheduleOptions::default().with_timeout(2));
        host.set_frame_deadline(Millis::MAX);
        host.fire(&scheduler);
        assert_eq!(*log.borrow(), vec![1, 2]);
    }
}
