//! Render driver.
//!
//! The [`Runtime`] owns every mounted unit and connects the hooks engine to
//! the scheduler. Dispatches raise a unit's pending urgency and keep one
//! perform-work callback per unit in the scheduler's queue; when the
//! callback runs, the unit renders at its pending urgency, commits, and is
//! rescheduled if the pass skipped updates.

use crate::config::RuntimeConfig;
use crate::error::RenderError;
use crate::events::EventRegistry;
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use weft_core::{
    Component, ContextStore, EffectList, EffectPhase, EffectTag, HookError, HookList, HookMeta,
    RenderOutput, Unit, UnitId, UpdateScheduler, Urgency, render_with_hooks,
};
use weft_scheduler::{CallbackNode, Priority, ScheduleOptions, Scheduler};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    Idle,
    Rendering(Urgency),
    Committing,
}

struct PhaseGuard<'a> {
    cell: &'a Cell<Phase>,
    previous: Phase,
}

impl<'a> PhaseGuard<'a> {
    fn enter(cell: &'a Cell<Phase>, phase: Phase) -> Self {
        Self {
            previous: cell.replace(phase),
            cell,
        }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.cell.set(self.previous);
    }
}

/// A completed, not yet committed render pass.
struct Pass {
    hooks: HookList,
    effects: EffectList,
    remaining: Option<Urgency>,
    attempts: usize,
}

type RenderFn =
    Box<dyn Fn(&Rc<Unit>, Option<&HookList>, Urgency, &ContextStore) -> Result<Pass, HookError>>;

struct Mounted {
    unit: Rc<Unit>,
    name: &'static str,
    render: RenderFn,
    hooks: RefCell<Option<HookList>>,
    pending: Cell<Option<Urgency>>,
    callback: Cell<Option<(CallbackNode, Urgency)>>,
}

/// Handle to a mounted unit and its latest committed output.
pub struct UnitHandle<O> {
    id: UnitId,
    output: Rc<RefCell<O>>,
}

impl<O> Clone for UnitHandle<O> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            output: self.output.clone(),
        }
    }
}

impl<O> UnitHandle<O> {
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Borrow the latest committed output.
    pub fn borrow_output(&self) -> Ref<'_, O> {
        self.output.borrow()
    }
}

impl<O: Clone> UnitHandle<O> {
    pub fn output(&self) -> O {
        self.output.borrow().clone()
    }
}

impl<O> fmt::Debug for UnitHandle<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UnitHandle").field(&self.id).finish()
    }
}

/// Renders units on behalf of the scheduler.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

struct RuntimeInner {
    this: Weak<RuntimeInner>,
    events: EventRegistry,
    scheduler: Scheduler,
    config: RuntimeConfig,
    next_unit: Cell<u64>,
    units: RefCell<HashMap<UnitId, Rc<Mounted>>>,
    contexts: RefCell<ContextStore>,
    phase: Cell<Phase>,
    pending_passive: RefCell<Vec<(UnitId, EffectList)>>,
    passive_callback: Cell<Option<CallbackNode>>,
    errors: RefCell<Vec<RenderError>>,
}

impl Runtime {
    pub fn new(scheduler: Scheduler, config: RuntimeConfig) -> Self {
        let inner = Rc::new_cyclic(|this| RuntimeInner {
            this: this.clone(),
            events: EventRegistry::new(scheduler.clone()),
            scheduler,
            config,
            next_unit: Cell::new(1),
            units: RefCell::new(HashMap::new()),
            contexts: RefCell::new(ContextStore::new()),
            phase: Cell::new(Phase::Idle),
            pending_passive: RefCell::new(Vec::new()),
            passive_callback: Cell::new(None),
            errors: RefCell::new(Vec::new()),
        });
        Self { inner }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Event handlers whose dispatches run at their registered priority.
    pub fn events(&self) -> &EventRegistry {
        &self.inner.events
    }

    /// Render `component` synchronously and commit it.
    ///
    /// Layout effects have run when this returns; passive effects are
    /// queued at normal priority.
    pub fn mount<C: Component>(
        &self,
        component: C,
    ) -> Result<UnitHandle<C::Output>, RenderError> {
        let inner = &self.inner;
        let id = UnitId(inner.next_unit.get());
        inner.next_unit.set(id.0 + 1);
        let scheduler: Weak<dyn UpdateScheduler> = inner.this.clone();
        let unit = Unit::new(id, scheduler);
        let name = component.name();

        inner.flush_pending_passive();
        let contexts = inner.contexts.borrow().clone();
        let rendered = {
            let _phase = PhaseGuard::enter(&inner.phase, Phase::Rendering(Urgency::SYNC));
            render_with_hooks(&unit, None, Urgency::SYNC, &contexts, |cx| component.render(cx))
        };
        let RenderOutput {
            output,
            hooks,
            effects,
            remaining,
            attempts,
        } = match rendered {
            Ok(rendered) => rendered,
            Err(source) => {
                unit.mark_unmounted();
                tracing::error!(unit = %id, component = name, error = %source, "mount failed");
                return Err(RenderError::new(id, source));
            }
        };

        let output = Rc::new(RefCell::new(output));
        let latest = output.clone();
        let render: RenderFn = Box::new(move |unit, committed, urgency, contexts| {
            let RenderOutput {
                output,
                hooks,
                effects,
                remaining,
                attempts,
            } = render_with_hooks(unit, committed, urgency, contexts, |cx| component.render(cx))?;
            *latest.borrow_mut() = output;
            Ok(Pass {
                hooks,
                effects,
                remaining,
                attempts,
            })
        });

        let mounted = Rc::new(Mounted {
            unit,
            name,
            render,
            hooks: RefCell::new(None),
            pending: Cell::new(None),
            callback: Cell::new(None),
        });
        inner.units.borrow_mut().insert(id, mounted.clone());
        tracing::debug!(unit = %id, component = name, attempts, "mounted");
        inner.commit(
            &mounted,
            Pass {
                hooks,
                effects,
                remaining,
                attempts,
            },
        );
        inner.scheduler.flush_immediate();
        Ok(UnitHandle { id, output })
    }

    /// Render a unit now at its pending urgency instead of waiting for its
    /// scheduled callback. Does nothing if no update is pending.
    pub fn flush_sync<O>(&self, handle: &UnitHandle<O>) -> Result<(), RenderError> {
        let inner = &self.inner;
        let Some(mounted) = inner.mounted(handle.id) else {
            tracing::debug!(unit = %handle.id, "flush of an unmounted unit ignored");
            return Ok(());
        };
        inner.flush_pending_passive();
        if let Some((node, _)) = mounted.callback.take() {
            inner.scheduler.cancel_callback(node);
        }
        let Some(urgency) = mounted.pending.take() else {
            tracing::debug!(unit = %handle.id, "nothing pending to flush");
            return Ok(());
        };
        let rendered = inner.render_unit(&mounted, urgency);
        inner.scheduler.flush_immediate();
        rendered
    }

    /// Run passive effects from earlier commits now.
    pub fn flush_passive_effects(&self) {
        self.inner.flush_pending_passive();
    }

    /// Unmount a unit: run its effect teardowns and drop its hook state.
    ///
    /// Later dispatches to the unit are ignored. Returns `false` if the unit
    /// was not mounted.
    pub fn unmount<O>(&self, handle: &UnitHandle<O>) -> bool {
        let inner = &self.inner;
        let Some(mounted) = inner.units.borrow_mut().remove(&handle.id) else {
            tracing::debug!(unit = %handle.id, "unmount of an unknown unit ignored");
            return false;
        };
        mounted.unit.mark_unmounted();
        if let Some((node, _)) = mounted.callback.take() {
            inner.scheduler.cancel_callback(node);
        }
        mounted.pending.set(None);

        let queued = std::mem::take(&mut *inner.pending_passive.borrow_mut());
        let (dropped, kept): (Vec<_>, Vec<_>) =
            queued.into_iter().partition(|(unit, _)| *unit == handle.id);
        inner.pending_passive.borrow_mut().extend(kept);
        drop(dropped);

        let hooks = mounted.hooks.borrow_mut().take();
        if let Some(mut hooks) = hooks {
            hooks.unmount();
        }
        tracing::debug!(unit = %handle.id, component = mounted.name, "unmounted");
        true
    }

    /// Make `value` readable through `use_context` on later renders.
    pub fn provide_context<T: Clone + 'static>(&self, value: T) {
        self.inner.contexts.borrow_mut().provide(value);
    }

    /// Render failures collected since the last call.
    pub fn take_errors(&self) -> Vec<RenderError> {
        std::mem::take(&mut *self.inner.errors.borrow_mut())
    }

    /// Committed hooks of a unit, in call order.
    pub fn hook_meta<O>(&self, handle: &UnitHandle<O>) -> Vec<HookMeta> {
        let Some(mounted) = self.inner.mounted(handle.id) else {
            return Vec::new();
        };
        let hooks = mounted.hooks.borrow();
        hooks.as_ref().map(HookList::meta).unwrap_or_default()
    }

    /// Urgency of the unit's next render, if an update is pending.
    pub fn pending_urgency<O>(&self, handle: &UnitHandle<O>) -> Option<Urgency> {
        self.inner.mounted(handle.id).and_then(|mounted| mounted.pending.get())
    }

    pub fn is_mounted(&self, id: UnitId) -> bool {
        self.inner.units.borrow().contains_key(&id)
    }

    pub fn unit_count(&self) -> usize {
        self.inner.units.borrow().len()
    }

    /// Urgency for an update dispatched at `priority` right now.
    pub fn urgency_for(&self, priority: Priority) -> Urgency {
        self.inner.urgency_for(priority)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("units", &self.inner.units.borrow().len())
            .field("phase", &self.inner.phase.get())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl RuntimeInner {
    fn mounted(&self, id: UnitId) -> Option<Rc<Mounted>> {
        self.units.borrow().get(&id).cloned()
    }

    fn urgency_for(&self, priority: Priority) -> Urgency {
        let start = self.scheduler.current_start_time();
        let timeout = self.scheduler.config().timeout(priority);
        match priority {
            Priority::Immediate => Urgency::SYNC,
            Priority::UserBlocking => {
                Urgency::bucketed(start, timeout, self.config.user_blocking_bucket)
            }
            Priority::Normal => Urgency::bucketed(start, timeout, self.config.normal_bucket),
            Priority::Idle => Urgency::NEVER,
        }
    }

    /// Updates dispatched during commit are synchronous; during a render
    /// they share the render's urgency.
    fn current_update_urgency(&self) -> Urgency {
        match self.phase.get() {
            Phase::Committing => Urgency::SYNC,
            Phase::Rendering(urgency) => urgency,
            Phase::Idle => self.urgency_for(self.scheduler.current_priority_level()),
        }
    }

    fn perform_work(&self, id: UnitId) {
        let Some(mounted) = self.mounted(id) else {
            tracing::debug!(unit = %id, "work for an unmounted unit skipped");
            return;
        };
        // Updates from passive effects land in this pass. A callback they
        // scheduled is redundant, and canceling the running one is a no-op.
        self.flush_pending_passive();
        if let Some((node, _)) = mounted.callback.take() {
            self.scheduler.cancel_callback(node);
        }
        let Some(urgency) = mounted.pending.take() else {
            return;
        };
        if let Err(err) = self.render_unit(&mounted, urgency) {
            self.errors.borrow_mut().push(err);
        }
    }

    fn render_unit(&self, mounted: &Rc<Mounted>, urgency: Urgency) -> Result<(), RenderError> {
        let id = mounted.unit.id();
        if mounted.unit.is_unmounted() {
            return Ok(());
        }

        let contexts = self.contexts.borrow().clone();
        let rendered = {
            let committed = mounted.hooks.borrow();
            let _phase = PhaseGuard::enter(&self.phase, Phase::Rendering(urgency));
            (mounted.render)(&mounted.unit, committed.as_ref(), urgency, &contexts)
        };
        match rendered {
            Ok(pass) => {
                tracing::debug!(
                    unit = %id,
                    %urgency,
                    attempts = pass.attempts,
                    remaining = ?pass.remaining,
                    "rendered"
                );
                self.commit(mounted, pass);
                Ok(())
            }
            Err(source) => {
                tracing::error!(
                    unit = %id,
                    component = mounted.name,
                    %urgency,
                    error = %source,
                    "render failed"
                );
                Err(RenderError::new(id, source))
            }
        }
    }

    fn commit(&self, mounted: &Rc<Mounted>, pass: Pass) {
        let Pass {
            mut hooks,
            mut effects,
            remaining,
            ..
        } = pass;
        hooks.commit();
        *mounted.hooks.borrow_mut() = Some(hooks);

        {
            let _phase = PhaseGuard::enter(&self.phase, Phase::Committing);
            effects.commit(EffectPhase::Layout);
        }
        if effects.tag().contains(EffectTag::PASSIVE) {
            self.pending_passive
                .borrow_mut()
                .push((mounted.unit.id(), effects));
            self.ensure_passive_flush();
        }
        if let Some(remaining) = remaining {
            self.mark_pending(mounted, remaining);
        }
    }

    fn mark_pending(&self, mounted: &Rc<Mounted>, urgency: Urgency) {
        let target = Urgency::most_urgent(mounted.pending.get(), urgency);
        mounted.pending.set(Some(target));

        if let Some((node, scheduled)) = mounted.callback.get() {
            if scheduled <= target {
                return;
            }
            self.scheduler.cancel_callback(node);
        }

        let options = if target == Urgency::SYNC {
            ScheduleOptions::priority(Priority::Immediate)
        } else {
            let start = self.scheduler.current_start_time();
            ScheduleOptions::priority(Priority::Normal)
                .with_timeout(target.expiration().saturating_sub(start))
        };
        let runtime = self.this.clone();
        let id = mounted.unit.id();
        let node = self.scheduler.schedule_callback(
            move |_| {
                if let Some(runtime) = runtime.upgrade() {
                    runtime.perform_work(id);
                }
                None
            },
            options,
        );
        mounted.callback.set(Some((node, target)));
        tracing::debug!(unit = %id, urgency = %target, "render scheduled");
    }

    fn ensure_passive_flush(&self) {
        if self.passive_callback.get().is_some() {
            return;
        }
        let runtime = self.this.clone();
        let node = self.scheduler.schedule_callback(
            move |_| {
                if let Some(runtime) = runtime.upgrade() {
                    runtime.passive_callback.set(None);
                    runtime.run_passive_effects();
                }
                None
            },
            ScheduleOptions::priority(Priority::Normal),
        );
        self.passive_callback.set(Some(node));
    }

    fn flush_pending_passive(&self) {
        if let Some(node) = self.passive_callback.take() {
            self.scheduler.cancel_callback(node);
        }
        self.run_passive_effects();
    }

    fn run_passive_effects(&self) {
        let queued = std::mem::take(&mut *self.pending_passive.borrow_mut());
        if queued.is_empty() {
            return;
        }
        tracing::trace!(units = queued.len(), "running passive effects");
        for (_, mut effects) in queued {
            effects.commit(EffectPhase::Passive);
        }
    }
}

impl UpdateScheduler for RuntimeInner {
    fn request_update_urgency(&self, _unit: &Unit) -> Urgency {
        self.current_update_urgency()
    }

    fn flush_passive_effects(&self) {
        self.flush_pending_passive();
    }

    fn schedule_update(&self, unit: &Rc<Unit>, urgency: Urgency) {
        let Some(mounted) = self.mounted(unit.id()) else {
            tracing::debug!(unit = %unit.id(), "update for a unit that is not mounted dropped");
            return;
        };
        self.mark_pending(&mounted, urgency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{HookKind, RenderContext, SetState};
    use weft_scheduler::{ManualHost, SchedulerConfig};

    fn setup() -> (Rc<ManualHost>, Runtime) {
        let host = Rc::new(ManualHost::new());
        let scheduler = Scheduler::new(host.clone(), SchedulerConfig::default());
        (host, Runtime::new(scheduler, RuntimeConfig::default()))
    }

    type Setter = Rc<RefCell<Option<SetState<i32>>>>;

    fn counter(
        setter: &Setter,
    ) -> impl Fn(&mut RenderContext<'_>) -> Result<i32, HookError> + 'static {
        let setter = setter.clone();
        move |cx: &mut RenderContext<'_>| -> Result<i32, HookError> {
            let (count, set) = cx.use_state(|| 0)?;
            *setter.borrow_mut() = Some(set);
            Ok(count)
        }
    }

    fn set(setter: &Setter, value: i32) {
        if let Some(set) = setter.borrow().as_ref() {
            set.set(value);
        }
    }

    #[test]
    fn mount_renders_and_commits_synchronously() {
        let (_host, runtime) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let effects = log.clone();
        let handle = runtime
            .mount(move |cx: &mut RenderContext<'_>| -> Result<&'static str, HookError> {
                let layout = effects.clone();
                cx.use_layout_effect(move || layout.borrow_mut().push("layout"), Some(()))?;
                let passive = effects.clone();
                cx.use_effect(move || passive.borrow_mut().push("passive"), Some(()))?;
                Ok("ready")
            })
            .expect("mount succeeds");

        assert_eq!(handle.output(), "ready");
        assert_eq!(*log.borrow(), vec!["layout"]);
        runtime.flush_passive_effects();
        assert_eq!(*log.borrow(), vec!["layout", "passive"]);
        let kinds: Vec<_> = runtime.hook_meta(&handle).iter().map(|meta| meta.kind).collect();
        assert_eq!(kinds, vec![HookKind::LayoutEffect, HookKind::Effect]);
    }

    #[test]
    fn passive_effects_run_from_a_scheduled_callback() {
        let (host, runtime) = setup();
        let ran = Rc::new(Cell::new(0));
        let count = ran.clone();
        runtime
            .mount(move |cx: &mut RenderContext<'_>| -> Result<(), HookError> {
                let count = count.clone();
                cx.use_effect(move || count.set(count.get() + 1), Some(()))
            })
            .expect("mount succeeds");
        assert_eq!(ran.get(), 0);
        assert!(host.fire(runtime.scheduler()));
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn update_renders_when_the_host_fires() {
        let (host, runtime) = setup();
        let setter = Setter::default();
        let handle = runtime.mount(counter(&setter)).expect("mount succeeds");

        set(&setter, 5);
        assert_eq!(handle.output(), 0);
        assert_eq!(runtime.pending_urgency(&handle), Some(Urgency::from_expiration(5000)));
        host.drain(runtime.scheduler());
        assert_eq!(handle.output(), 5);
        assert_eq!(runtime.pending_urgency(&handle), None);
    }

    #[test]
    fn more_urgent_update_reschedules_the_unit() {
        let (host, runtime) = setup();
        let setter = Setter::default();
        let handle = runtime.mount(counter(&setter)).expect("mount succeeds");
        runtime.flush_passive_effects();

        set(&setter, 1);
        assert_eq!(runtime.scheduler().next_expiration(), Some(5000));
        runtime.scheduler().run_with_priority(Priority::UserBlocking, || set(&setter, 2));
        assert_eq!(runtime.scheduler().pending(), 1);
        assert_eq!(runtime.scheduler().next_expiration(), Some(300));
        assert_eq!(host.scheduled(), Some(300));

        host.drain(runtime.scheduler());
        assert_eq!(handle.output(), 2);
    }

    #[test]
    fn immediate_updates_flush_before_the_event_returns() {
        let (_host, runtime) = setup();
        let setter = Setter::default();
        let handle = runtime.mount(counter(&setter)).expect("mount succeeds");
        runtime.scheduler().run_with_priority(Priority::Immediate, || set(&setter, 9));
        assert_eq!(handle.output(), 9);
    }

    #[test]
    fn flush_sync_renders_without_the_host() {
        let (host, runtime) = setup();
        let setter = Setter::default();
        let handle = runtime.mount(counter(&setter)).expect("mount succeeds");
        set(&setter, 3);
        runtime.flush_sync(&handle).expect("render succeeds");
        assert_eq!(handle.output(), 3);
        assert_eq!(runtime.pending_urgency(&handle), None);
        runtime.flush_sync(&handle).expect("nothing pending is fine");
        host.drain(runtime.scheduler());
        assert_eq!(handle.output(), 3);
    }

    #[test]
    fn unmount_runs_teardowns_and_ignores_later_updates() {
        let (host, runtime) = setup();
        let setter = Setter::default();
        let torn_down = Rc::new(Cell::new(false));
        let flag = torn_down.clone();
        let inner = counter(&setter);
        let handle = runtime
            .mount(move |cx: &mut RenderContext<'_>| -> Result<i32, HookError> {
                let count = inner(cx)?;
                let flag = flag.clone();
                cx.use_mount(move || move || flag.set(true))?;
                Ok(count)
            })
            .expect("mount succeeds");
        runtime.flush_passive_effects();

        assert!(runtime.unmount(&handle));
        assert!(torn_down.get());
        assert!(!runtime.is_mounted(handle.id()));
        set(&setter, 4);
        host.drain(runtime.scheduler());
        assert_eq!(handle.output(), 0);
        assert!(!runtime.unmount(&handle));
    }

    #[test]
    fn failed_render_is_reported_and_discarded() {
        let (host, runtime) = setup();
        let setter = Setter::default();
        let hook_setter = setter.clone();
        let handle = runtime
            .mount(move |cx: &mut RenderContext<'_>| -> Result<i32, HookError> {
                let (count, set) = cx.use_state(|| 0)?;
                *hook_setter.borrow_mut() = Some(set);
                if count > 0 {
                    return Ok(count);
                }
                cx.use_ref(|| ())?;
                Ok(count)
            })
            .expect("mount succeeds");

        set(&setter, 1);
        host.drain(runtime.scheduler());
        let errors = runtime.take_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].unit, handle.id());
        assert!(matches!(errors[0].source, HookError::TooFewHooks { .. }));
        assert_eq!(handle.output(), 0);
        assert!(runtime.take_errors().is_empty());
    }

    #[test]
    fn failed_mount_returns_the_error() {
        let (_host, runtime) = setup();
        let result = runtime.mount(|cx: &mut RenderContext<'_>| -> Result<(), HookError> {
            let (_, set) = cx.use_state(|| 0)?;
            set.update(|n| n + 1);
            Ok(())
        });
        let err = result.expect_err("render loops forever");
        assert_eq!(err.source, HookError::TooManyReRenders { limit: 25 });
        assert_eq!(runtime.unit_count(), 0);
    }

    #[test]
    fn layout_effect_updates_are_sync() {
        let (_host, runtime) = setup();
        let seen = Rc::new(Cell::new(None));
        let inner = runtime.clone();
        let record = seen.clone();
        let setter = Setter::default();
        let render = counter(&setter);
        runtime
            .mount(move |cx: &mut RenderContext<'_>| -> Result<i32, HookError> {
                let count = render(cx)?;
                let runtime = inner.clone();
                let record = record.clone();
                cx.use_layout_effect(
                    move || record.set(Some(runtime.inner.current_update_urgency())),
                    Some(()),
                )?;
                Ok(count)
            })
            .expect("mount succeeds");
        assert_eq!(seen.get(), Some(Urgency::SYNC));
    }

    #[test]
    fn layout_effect_update_is_visible_when_mount_returns() {
        let (host, runtime) = setup();
        let handle = runtime
            .mount(|cx: &mut RenderContext<'_>| -> Result<i32, HookError> {
                let (n, set) = cx.use_state(|| 0)?;
                cx.use_layout_effect(
                    move || {
                        if n == 0 {
                            set.set(1);
                        }
                    },
                    Some(n),
                )?;
                Ok(n)
            })
            .expect("mount succeeds");

        assert_eq!(handle.output(), 1);
        assert_eq!(runtime.pending_urgency(&handle), None);
        runtime.flush_passive_effects();
        assert!(runtime.scheduler().is_idle());
        host.drain(runtime.scheduler());
        assert_eq!(handle.output(), 1);
    }

    #[test]
    fn layout_effect_update_is_visible_after_flush_sync() {
        let (_host, runtime) = setup();
        let setter = Setter::default();
        let render = counter(&setter);
        let handle = runtime
            .mount(move |cx: &mut RenderContext<'_>| -> Result<i32, HookError> {
                let count = render(cx)?;
                let (doubled, set_doubled) = cx.use_state(|| 0)?;
                cx.use_layout_effect(move || set_doubled.set(count * 2), Some(count))?;
                Ok(count + doubled)
            })
            .expect("mount succeeds");

        set(&setter, 2);
        runtime.flush_sync(&handle).expect("render succeeds");
        assert_eq!(handle.output(), 6);
    }

    #[test]
    fn passive_updates_join_the_pass_that_flushes_them() {
        let (_host, runtime) = setup();
        let renders = Rc::new(RefCell::new(Vec::new()));
        let setter = Setter::default();
        let render = counter(&setter);
        let log = renders.clone();
        let first = runtime
            .mount(move |cx: &mut RenderContext<'_>| -> Result<i32, HookError> {
                let count = render(cx)?;
                log.borrow_mut().push(count);
                Ok(count)
            })
            .expect("mount succeeds");

        let layout = setter.clone();
        let passive = setter.clone();
        runtime
            .mount(move |cx: &mut RenderContext<'_>| -> Result<(), HookError> {
                let layout = layout.clone();
                cx.use_layout_effect(move || set(&layout, 1), Some(()))?;
                let passive = passive.clone();
                cx.use_effect(
                    move || {
                        if let Some(set) = passive.borrow().as_ref() {
                            set.update(|n| n + 10);
                        }
                    },
                    Some(()),
                )
            })
            .expect("mount succeeds");

        assert_eq!(first.output(), 11);
        assert_eq!(*renders.borrow(), vec![0, 11]);
        assert_eq!(runtime.scheduler().pending(), 0);
    }

    #[test]
    fn urgency_buckets_follow_priority() {
        let (host, runtime) = setup();
        host.set_now(1010);
        assert_eq!(runtime.urgency_for(Priority::Immediate), Urgency::SYNC);
        assert_eq!(
            runtime.urgency_for(Priority::UserBlocking),
            Urgency::from_expiration(1300)
        );
        assert_eq!(
            runtime.urgency_for(Priority::Normal),
            Urgency::from_expiration(6250)
        );
        assert_eq!(runtime.urgency_for(Priority::Idle), Urgency::NEVER);
    }

    #[test]
    fn context_is_read_on_the_next_render() {
        let (_host, runtime) = setup();
        runtime.provide_context(String::from("dark"));
        let handle = runtime
            .mount(|cx: &mut RenderContext<'_>| -> Result<Option<String>, HookError> {
                Ok(cx.use_context::<String>())
            })
            .expect("mount succeeds");
        assert_eq!(handle.output().as_deref(), Some("dark"));
    }
}
