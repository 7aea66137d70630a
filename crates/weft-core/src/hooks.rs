//! React-style hooks for units rendered by the weft runtime.
//!
//! A unit is a render function plus the hook state it keeps between renders.
//! There is no component instance: each call to a hook method on
//! [`RenderContext`] claims the next slot in the unit's hook list, and the
//! slot's contents survive until the unit unmounts.
//!
//! # Quick Start
//!
//! ```ignore
//! use weft::prelude::*;
//!
//! fn counter(cx: &mut RenderContext<'_>) -> Result<String, HookError> {
//!     let (count, set_count) = cx.use_state(|| 0)?;
//!     let label = cx.use_memo(|| format!("clicked {count} times"), Some(count))?;
//!
//!     cx.use_effect(move || tracing::info!(count, "counter changed"), Some(count))?;
//!
//!     set_count.update(|n| n + 1); // from an event handler, usually
//!     Ok(label)
//! }
//! ```
//!
//! # Available Hooks
//!
//! | Hook | Purpose |
//! |------|---------|
//! | [`use_state`](RenderContext::use_state) | State with a `(value, setter)` API |
//! | [`use_reducer`](RenderContext::use_reducer) | State driven by a reducer and dispatched actions |
//! | [`use_effect`](RenderContext::use_effect) | Side effects run after commit |
//! | [`use_layout_effect`](RenderContext::use_layout_effect) | Side effects run synchronously during commit |
//! | [`use_memo`](RenderContext::use_memo) | Memoized computations |
//! | [`use_callback`](RenderContext::use_callback) | Memoized callbacks |
//! | [`use_ref`](RenderContext::use_ref) | Mutable cell with a stable identity |
//! | [`use_context`](RenderContext::use_context) | Read a value provided by the runtime |
//! | [`use_imperative_handle`](RenderContext::use_imperative_handle) | Expose a handle through a forwarded ref |
//!
//! # Updates and urgency
//!
//! Every dispatched update carries an [`Urgency`]. A render pass runs at one
//! urgency and only applies the updates it covers; the rest are skipped in
//! place and reported through [`RenderOutput::remaining`] so the driver can
//! schedule another pass. Skipped updates never reorder: the first skipped
//! update pins the hook's base, and the later pass replays everything from
//! there.
//!
//! Dispatching to the unit that is currently rendering is a render-phase
//! update. It is stashed rather than scheduled, and the render function is
//! invoked again with the update applied, at most [`RE_RENDER_LIMIT`] times.
//!
//! # Rules of Hooks
//!
//! Hooks are identified by their position in the call sequence, so every
//! render of a unit must call the same hooks in the same order. Do not call
//! hooks inside conditionals, loops with a varying number of iterations, or
//! after an early return.
//!
//! Calling a hook outside a render is not possible: hooks are methods on
//! [`RenderContext`], which only exists while a render pass runs.
//!
//! # Error Messages
//!
//! Breaking the rules aborts the render with a [`HookError`]:
//!
//! ```text
//! rendered fewer hooks than expected: previous render had 3 hooks, this render had 2.
//! This usually means a hook was skipped by an early return
//! ```
//!
//! ```text
//! hook order mismatch at index 1: previous render called `use_effect`, this render called `use_state`
//! ```

use crate::context::ContextStore;
use crate::deps::{HookInput, deps_changed};
use crate::effects::{Effect, EffectFn, EffectList, EffectPhase, Teardown, TeardownSlot};
use crate::error::HookError;
use crate::update_queue::{RenderPhaseQueue, UpdateId, UpdateQueue};
use crate::urgency::Urgency;
use std::any::{Any, type_name};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

/// Number of times a render function may be invoked in one pass before
/// render-phase updates are treated as an infinite loop.
pub const RE_RENDER_LIMIT: usize = 25;

// ============================================================================
// Units
// ============================================================================

/// Identifier of a rendered unit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// The capability the hooks engine needs from whoever drives rendering.
pub trait UpdateScheduler {
    /// Urgency for an update dispatched to `unit` right now.
    fn request_update_urgency(&self, unit: &Unit) -> Urgency;

    /// Run passive effects left over from earlier commits.
    fn flush_passive_effects(&self) {}

    /// Make sure `unit` re-renders at `urgency` or sooner.
    fn schedule_update(&self, unit: &Rc<Unit>, urgency: Urgency);
}

#[derive(Default)]
struct RenderPhase {
    did_schedule: bool,
    queues: Vec<Rc<dyn RenderPhaseQueue>>,
}

/// Shared identity of a rendered unit.
///
/// Dispatch handles hold a weak reference to their unit; once the driver
/// drops the unit or marks it unmounted, dispatches become no-ops.
pub struct Unit {
    id: UnitId,
    scheduler: Weak<dyn UpdateScheduler>,
    render_phase: RefCell<Option<RenderPhase>>,
    unmounted: Cell<bool>,
}

impl Unit {
    pub fn new(id: UnitId, scheduler: Weak<dyn UpdateScheduler>) -> Rc<Self> {
        Rc::new(Self {
            id,
            scheduler,
            render_phase: RefCell::new(None),
            unmounted: Cell::new(false),
        })
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Whether a render pass for this unit is in progress.
    pub fn is_rendering(&self) -> bool {
        self.render_phase.borrow().is_some()
    }

    pub fn is_unmounted(&self) -> bool {
        self.unmounted.get()
    }

    pub fn mark_unmounted(&self) {
        self.unmounted.set(true);
    }

    fn take_did_schedule(&self) -> bool {
        self.render_phase
            .borrow_mut()
            .as_mut()
            .is_some_and(|phase| std::mem::take(&mut phase.did_schedule))
    }

    fn take_render_phase_queues(&self) -> Vec<Rc<dyn RenderPhaseQueue>> {
        self.render_phase
            .borrow_mut()
            .as_mut()
            .map(|phase| std::mem::take(&mut phase.queues))
            .unwrap_or_default()
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("rendering", &self.is_rendering())
            .field("unmounted", &self.is_unmounted())
            .finish()
    }
}

/// Marks a unit as rendering for the lifetime of the guard.
///
/// Render-phase updates still stashed when the guard drops belong to a pass
/// that was abandoned and are discarded.
struct RenderGuard<'u> {
    unit: &'u Unit,
}

impl<'u> RenderGuard<'u> {
    fn enter(unit: &'u Unit) -> Self {
        let previous = unit.render_phase.replace(Some(RenderPhase::default()));
        debug_assert!(previous.is_none(), "{} is already rendering", unit.id);
        Self { unit }
    }
}

impl Drop for RenderGuard<'_> {
    fn drop(&mut self) {
        let phase = self.unit.render_phase.borrow_mut().take();
        if let Some(phase) = phase {
            for queue in phase.queues {
                queue.discard_render_phase();
            }
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Handle that enqueues actions on one state hook.
///
/// The handle is stable across renders: every render of the same hook
/// returns a dispatch for the same queue.
pub struct Dispatch<A> {
    queue: Rc<RefCell<UpdateQueue<A>>>,
    unit: Weak<Unit>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            unit: self.unit.clone(),
        }
    }
}

impl<A: 'static> Dispatch<A> {
    pub fn dispatch(&self, action: A) {
        let Some(unit) = self.unit.upgrade() else {
            tracing::debug!("dispatch to a dropped unit ignored");
            return;
        };
        if unit.is_unmounted() {
            tracing::debug!(unit = %unit.id, "dispatch to an unmounted unit ignored");
            return;
        }

        {
            let mut phase = unit.render_phase.borrow_mut();
            if let Some(phase) = phase.as_mut() {
                if self.queue.borrow_mut().stash_render_phase(action) {
                    phase.queues.push(self.queue.clone());
                }
                phase.did_schedule = true;
                tracing::debug!(unit = %unit.id, "render-phase update stashed");
                return;
            }
        }

        let Some(scheduler) = unit.scheduler.upgrade() else {
            tracing::debug!(unit = %unit.id, "dispatch without a scheduler ignored");
            return;
        };
        scheduler.flush_passive_effects();
        let urgency = scheduler.request_update_urgency(&unit);
        self.queue.borrow_mut().enqueue(urgency, action);
        tracing::debug!(unit = %unit.id, %urgency, "update enqueued");
        scheduler.schedule_update(&unit, urgency);
    }

    /// Whether both handles feed the same hook.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.queue, &other.queue)
    }
}

/// Action understood by [`use_state`](RenderContext::use_state) hooks.
pub enum StateAction<S> {
    Replace(S),
    Update(Box<dyn Fn(&S) -> S>),
}

fn apply_state_action<S: Clone>(state: &S, action: &StateAction<S>) -> S {
    match action {
        StateAction::Replace(value) => value.clone(),
        StateAction::Update(update) => update(state),
    }
}

/// Setter returned by [`use_state`](RenderContext::use_state).
pub struct SetState<S> {
    dispatch: Dispatch<StateAction<S>>,
}

impl<S> Clone for SetState<S> {
    fn clone(&self) -> Self {
        Self {
            dispatch: self.dispatch.clone(),
        }
    }
}

impl<S: 'static> SetState<S> {
    /// Replace the state.
    pub fn set(&self, value: S) {
        self.dispatch.dispatch(StateAction::Replace(value));
    }

    /// Derive the next state from whatever the state is when the update is
    /// processed.
    pub fn update(&self, update: impl Fn(&S) -> S + 'static) {
        self.dispatch.dispatch(StateAction::Update(Box::new(update)));
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.dispatch.ptr_eq(&other.dispatch)
    }
}

// ============================================================================
// Refs
// ============================================================================

/// Mutable cell with a stable identity, returned by
/// [`use_ref`](RenderContext::use_ref).
pub struct RefHandle<T> {
    inner: Rc<RefCell<T>>,
}

impl<T> Clone for RefHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> RefHandle<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(value)),
        }
    }

    /// Get a reference to the current value.
    pub fn borrow(&self) -> std::cell::Ref<'_, T> {
        self.inner.borrow()
    }

    /// Get a mutable reference to the current value.
    pub fn borrow_mut(&self) -> std::cell::RefMut<'_, T> {
        self.inner.borrow_mut()
    }

    /// Set the value directly.
    pub fn set(&self, value: T) {
        *self.inner.borrow_mut() = value;
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl<T: Clone> RefHandle<T> {
    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.inner.borrow().clone()
    }
}

/// Target of [`use_imperative_handle`](RenderContext::use_imperative_handle).
pub enum ForwardedRef<T> {
    /// A cell that holds the handle while the unit is mounted.
    Object(RefHandle<Option<T>>),
    /// Called with the handle on attach and with `None` on detach.
    Callback(Rc<dyn Fn(Option<T>)>),
}

impl<T> Clone for ForwardedRef<T> {
    fn clone(&self) -> Self {
        match self {
            ForwardedRef::Object(cell) => ForwardedRef::Object(cell.clone()),
            ForwardedRef::Callback(callback) => ForwardedRef::Callback(callback.clone()),
        }
    }
}

impl<T: 'static> ForwardedRef<T> {
    pub fn callback(callback: impl Fn(Option<T>) + 'static) -> Self {
        ForwardedRef::Callback(Rc::new(callback))
    }

    fn identity(&self) -> RefIdentity {
        match self {
            ForwardedRef::Object(cell) => RefIdentity(cell.identity()),
            ForwardedRef::Callback(callback) => {
                RefIdentity(Rc::as_ptr(callback) as *const () as usize)
            }
        }
    }

    fn attach(self, create: impl FnOnce() -> T) -> Teardown {
        match self {
            ForwardedRef::Object(cell) => {
                cell.set(Some(create()));
                Box::new(move || cell.set(None))
            }
            ForwardedRef::Callback(callback) => {
                callback(Some(create()));
                Box::new(move || callback(None))
            }
        }
    }
}

impl<T> From<RefHandle<Option<T>>> for ForwardedRef<T> {
    fn from(cell: RefHandle<Option<T>>) -> Self {
        ForwardedRef::Object(cell)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct RefIdentity(usize);

impl HookInput for RefIdentity {
    fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

// ============================================================================
// Hook records
// ============================================================================

/// Kind of hook stored in a slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum HookKind {
    State,
    Reducer,
    Effect,
    LayoutEffect,
    Memo,
    Callback,
    Ref,
    ImperativeHandle,
}

impl HookKind {
    /// Name of the hook method that creates this kind of slot.
    pub fn name(self) -> &'static str {
        match self {
            HookKind::State => "use_state",
            HookKind::Reducer => "use_reducer",
            HookKind::Effect => "use_effect",
            HookKind::LayoutEffect => "use_layout_effect",
            HookKind::Memo => "use_memo",
            HookKind::Callback => "use_callback",
            HookKind::Ref => "use_ref",
            HookKind::ImperativeHandle => "use_imperative_handle",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metadata about a hook for debugging purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookMeta {
    pub kind: HookKind,
    /// The hook method name (e.g. "use_state", "use_effect")
    pub hook_type: &'static str,
    /// The type of value stored (from std::any::type_name)
    pub value_type: &'static str,
}

trait HookData: Any {
    /// Copy the fields that carry over into the next render.
    fn carry_over(&self) -> Box<dyn HookData>;

    fn on_commit(&mut self) {}

    fn on_unmount(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

struct StateHook<S, A> {
    memoized: S,
    base_state: S,
    base_update: Option<UpdateId>,
    queue: Rc<RefCell<UpdateQueue<A>>>,
}

impl<S: Clone + 'static, A: 'static> HookData for StateHook<S, A> {
    fn carry_over(&self) -> Box<dyn HookData> {
        Box::new(StateHook {
            memoized: self.memoized.clone(),
            base_state: self.base_state.clone(),
            base_update: self.base_update,
            queue: self.queue.clone(),
        })
    }

    fn on_commit(&mut self) {
        if let Some(base) = self.base_update.take() {
            self.queue.borrow_mut().retire_through(base);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct EffectHook<D> {
    deps: Option<D>,
    teardown: TeardownSlot,
}

impl<D: HookInput> HookData for EffectHook<D> {
    fn carry_over(&self) -> Box<dyn HookData> {
        Box::new(EffectHook {
            deps: self.deps.clone(),
            teardown: self.teardown.clone(),
        })
    }

    fn on_unmount(&mut self) {
        self.teardown.run();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct MemoHook<T, D> {
    value: T,
    deps: Option<D>,
}

impl<T: Clone + 'static, D: HookInput> HookData for MemoHook<T, D> {
    fn carry_over(&self) -> Box<dyn HookData> {
        Box::new(MemoHook {
            value: self.value.clone(),
            deps: self.deps.clone(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct RefHook<T> {
    handle: RefHandle<T>,
}

impl<T: 'static> HookData for RefHook<T> {
    fn carry_over(&self) -> Box<dyn HookData> {
        Box::new(RefHook {
            handle: self.handle.clone(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct Hook {
    kind: HookKind,
    value_type: &'static str,
    data: Box<dyn HookData>,
}

impl Hook {
    fn meta(&self) -> HookMeta {
        HookMeta {
            kind: self.kind,
            hook_type: self.kind.name(),
            value_type: self.value_type,
        }
    }

    fn into_record<T: 'static>(self, index: usize, expected: &'static str) -> Result<T, HookError> {
        let found = self.value_type;
        self.data
            .into_any()
            .downcast::<T>()
            .map(|record| *record)
            .map_err(|_| HookError::HookTypeMismatch {
                index,
                expected,
                found,
            })
    }
}

/// Ordered hook slots of one unit, as produced by a render pass.
#[derive(Default)]
pub struct HookList {
    hooks: Vec<Hook>,
}

impl HookList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Debug information about each hook, in call order.
    pub fn meta(&self) -> Vec<HookMeta> {
        self.hooks.iter().map(Hook::meta).collect()
    }

    /// Mark this list as the unit's committed list.
    ///
    /// Updates folded into each state hook's base are retired from its queue.
    pub fn commit(&mut self) {
        for hook in &mut self.hooks {
            hook.data.on_commit();
        }
    }

    /// Run every outstanding effect teardown.
    pub fn unmount(&mut self) {
        for hook in &mut self.hooks {
            hook.data.on_unmount();
        }
    }
}

impl fmt::Debug for HookList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|hook| hook.kind))
            .finish()
    }
}

// ============================================================================
// Render pass
// ============================================================================

enum Slot<'a> {
    /// Nothing existed at this position before.
    Fresh,
    /// A previous pass left a hook here.
    Reused {
        prior: Hook,
        committed: Option<&'a Hook>,
    },
}

/// Result of invoking a render function once.
pub enum RenderOutcome<O> {
    Complete(RenderOutput<O>),
    /// Render-phase updates were dispatched; the hooks produced by this
    /// attempt seed the next one.
    RetryWithPendingUpdates(HookList),
}

/// Everything a completed render pass hands to the driver.
pub struct RenderOutput<O> {
    pub output: O,
    pub hooks: HookList,
    pub effects: EffectList,
    /// Most urgent update skipped by this pass.
    pub remaining: Option<Urgency>,
    /// How many times the render function ran.
    pub attempts: usize,
}

/// State of one render pass of one unit.
pub struct RenderContext<'a> {
    unit: &'a Rc<Unit>,
    urgency: Urgency,
    committed: Option<&'a HookList>,
    seed: VecDeque<Hook>,
    expected: Option<usize>,
    hooks: Vec<Hook>,
    effects: EffectList,
    remaining: Option<Urgency>,
    contexts: &'a ContextStore,
}

impl<'a> RenderContext<'a> {
    fn begin(
        unit: &'a Rc<Unit>,
        urgency: Urgency,
        committed: Option<&'a HookList>,
        seed: Option<HookList>,
        contexts: &'a ContextStore,
    ) -> Self {
        let expected = committed
            .map(HookList::len)
            .or(seed.as_ref().map(HookList::len));
        Self {
            unit,
            urgency,
            committed,
            seed: seed.map(|list| VecDeque::from(list.hooks)).unwrap_or_default(),
            expected,
            hooks: Vec::with_capacity(expected.unwrap_or(0)),
            effects: EffectList::new(),
            remaining: None,
            contexts,
        }
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit.id
    }

    /// Urgency this pass renders at.
    pub fn urgency(&self) -> Urgency {
        self.urgency
    }

    /// Whether this pass is the unit's first committed render.
    pub fn is_mount(&self) -> bool {
        self.committed.is_none()
    }

    fn advance(&mut self, kind: HookKind) -> Result<Slot<'a>, HookError> {
        let index = self.hooks.len();
        if let Some(expected) = self.expected
            && index >= expected
        {
            return Err(HookError::TooManyHooks { expected });
        }

        let committed = self.committed.and_then(|list| list.hooks.get(index));
        let prior = self.seed.pop_front();
        let previous = prior.as_ref().or(committed).map(|hook| hook.kind);
        if let Some(previous) = previous
            && previous != kind
        {
            return Err(HookError::HookOrderMismatch {
                index,
                previous,
                current: kind,
            });
        }

        Ok(match (prior, committed) {
            (Some(prior), committed) => Slot::Reused { prior, committed },
            (None, Some(hook)) => Slot::Reused {
                prior: Hook {
                    kind: hook.kind,
                    value_type: hook.value_type,
                    data: hook.data.carry_over(),
                },
                committed: Some(hook),
            },
            (None, None) => Slot::Fresh,
        })
    }

    fn push(&mut self, kind: HookKind, value_type: &'static str, data: impl HookData) {
        self.hooks.push(Hook {
            kind,
            value_type,
            data: Box::new(data),
        });
    }

    fn finish<O>(self, output: O, attempt: usize) -> Result<RenderOutcome<O>, HookError> {
        if self.unit.take_did_schedule() {
            return Ok(RenderOutcome::RetryWithPendingUpdates(HookList {
                hooks: self.hooks,
            }));
        }
        if let Some(expected) = self.expected
            && self.hooks.len() < expected
        {
            return Err(HookError::TooFewHooks {
                expected,
                rendered: self.hooks.len(),
            });
        }
        Ok(RenderOutcome::Complete(RenderOutput {
            output,
            hooks: HookList { hooks: self.hooks },
            effects: self.effects,
            remaining: self.remaining,
            attempts: attempt,
        }))
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    /// State with a React-style `(value, setter)` API.
    ///
    /// `init` only runs on the unit's first render.
    pub fn use_state<S>(
        &mut self,
        init: impl FnOnce() -> S,
    ) -> Result<(S, SetState<S>), HookError>
    where
        S: Clone + 'static,
    {
        let (state, dispatch) =
            self.reducer_hook(HookKind::State, &apply_state_action::<S>, init)?;
        Ok((state, SetState { dispatch }))
    }

    /// State computed by folding dispatched actions through `reducer`.
    ///
    /// On the first render the state starts at `initial`, with
    /// `initial_action` applied to it if one is given.
    ///
    /// # Example
    ///
    /// ```ignore
    /// enum Step { Inc, Dec }
    ///
    /// let (count, dispatch) = cx.use_reducer(
    ///     |n: &i32, step: &Step| match step { Step::Inc => n + 1, Step::Dec => n - 1 },
    ///     0,
    ///     None,
    /// )?;
    /// dispatch.dispatch(Step::Inc);
    /// ```
    pub fn use_reducer<S, A, R>(
        &mut self,
        reducer: R,
        initial: S,
        initial_action: Option<A>,
    ) -> Result<(S, Dispatch<A>), HookError>
    where
        S: Clone + 'static,
        A: 'static,
        R: Fn(&S, &A) -> S,
    {
        let init = || match &initial_action {
            Some(action) => reducer(&initial, action),
            None => initial.clone(),
        };
        self.reducer_hook(HookKind::Reducer, &reducer, init)
    }

    fn reducer_hook<S, A>(
        &mut self,
        kind: HookKind,
        reducer: &dyn Fn(&S, &A) -> S,
        init: impl FnOnce() -> S,
    ) -> Result<(S, Dispatch<A>), HookError>
    where
        S: Clone + 'static,
        A: 'static,
    {
        let index = self.hooks.len();
        let record = match self.advance(kind)? {
            Slot::Fresh => {
                let state = init();
                StateHook {
                    memoized: state.clone(),
                    base_state: state,
                    base_update: None,
                    queue: Rc::new(RefCell::new(UpdateQueue::new())),
                }
            }
            Slot::Reused { prior, .. } => {
                let mut hook: StateHook<S, A> = prior.into_record(index, type_name::<S>())?;
                let folded = hook.queue.borrow().fold(
                    &hook.base_state,
                    hook.base_update,
                    self.urgency,
                    reducer,
                );
                if let Some(fold) = folded {
                    hook.memoized = fold.state;
                    hook.base_state = fold.base_state;
                    hook.base_update = fold.base_update;
                    if let Some(skipped) = fold.remaining {
                        self.remaining = Some(Urgency::most_urgent(self.remaining, skipped));
                    }
                }
                hook
            }
        };

        let value = record.memoized.clone();
        let dispatch = Dispatch {
            queue: record.queue.clone(),
            unit: Rc::downgrade(self.unit),
        };
        self.push(kind, type_name::<S>(), record);
        Ok((value, dispatch))
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    /// Run a side effect after commit when `deps` change.
    ///
    /// Pass [`EVERY_RENDER`](crate::deps::EVERY_RENDER) to run after every
    /// render.
    pub fn use_effect<F, D>(&mut self, effect: F, deps: Option<D>) -> Result<(), HookError>
    where
        F: FnOnce() + 'static,
        D: HookInput,
    {
        self.use_effect_cleanup(
            move || {
                effect();
                || {}
            },
            deps,
        )
    }

    /// Like [`use_effect`](Self::use_effect), with a cleanup that runs before
    /// the effect runs again and when the unit unmounts.
    ///
    /// # Example
    ///
    /// ```ignore
    /// cx.use_effect_cleanup(move || {
    ///     let subscription = feed.subscribe(id);
    ///     move || subscription.cancel()
    /// }, Some(id))?;
    /// ```
    pub fn use_effect_cleanup<F, C, D>(
        &mut self,
        effect: F,
        deps: Option<D>,
    ) -> Result<(), HookError>
    where
        F: FnOnce() -> C + 'static,
        C: FnOnce() + 'static,
        D: HookInput,
    {
        self.effect_hook(HookKind::Effect, EffectPhase::Passive, with_teardown(effect), deps)
    }

    /// Run a side effect synchronously during commit when `deps` change.
    pub fn use_layout_effect<F, D>(&mut self, effect: F, deps: Option<D>) -> Result<(), HookError>
    where
        F: FnOnce() + 'static,
        D: HookInput,
    {
        self.use_layout_effect_cleanup(
            move || {
                effect();
                || {}
            },
            deps,
        )
    }

    pub fn use_layout_effect_cleanup<F, C, D>(
        &mut self,
        effect: F,
        deps: Option<D>,
    ) -> Result<(), HookError>
    where
        F: FnOnce() -> C + 'static,
        C: FnOnce() + 'static,
        D: HookInput,
    {
        self.effect_hook(
            HookKind::LayoutEffect,
            EffectPhase::Layout,
            with_teardown(effect),
            deps,
        )
    }

    /// Run an effect once, after the first commit. The returned cleanup runs
    /// on unmount.
    pub fn use_mount<F, C>(&mut self, effect: F) -> Result<(), HookError>
    where
        F: FnOnce() -> C + 'static,
        C: FnOnce() + 'static,
    {
        self.use_effect_cleanup(effect, Some(()))
    }

    /// Expose a handle created by `create` through `target`.
    ///
    /// The handle is attached during commit and detached when it changes or
    /// the unit unmounts. With explicit `deps`, a different `target` also
    /// counts as a change.
    pub fn use_imperative_handle<T, F, D>(
        &mut self,
        target: Option<&ForwardedRef<T>>,
        create: F,
        deps: Option<D>,
    ) -> Result<(), HookError>
    where
        T: 'static,
        F: FnOnce() -> T + 'static,
        D: HookInput,
    {
        let target = target.cloned();
        let identity = target.as_ref().map(ForwardedRef::identity);
        let deps = deps.map(|deps| (deps, identity));
        let effect: EffectFn = Box::new(move || target.map(|target| target.attach(create)));
        self.effect_hook(HookKind::ImperativeHandle, EffectPhase::Layout, effect, deps)
    }

    fn effect_hook<D: HookInput>(
        &mut self,
        kind: HookKind,
        phase: EffectPhase,
        effect: EffectFn,
        deps: Option<D>,
    ) -> Result<(), HookError> {
        let index = self.hooks.len();
        let (teardown, changed) = match self.advance(kind)? {
            Slot::Fresh => (TeardownSlot::new(), true),
            Slot::Reused { prior, committed } => {
                let prior: EffectHook<D> = prior.into_record(index, type_name::<D>())?;
                let changed = match committed {
                    Some(hook) => {
                        let previous = hook
                            .data
                            .as_any()
                            .downcast_ref::<EffectHook<D>>()
                            .and_then(|hook| hook.deps.as_ref());
                        deps_changed(previous, deps.as_ref())
                    }
                    None => true,
                };
                (prior.teardown, changed)
            }
        };

        let record = if changed {
            Effect::new(phase, effect, teardown.clone())
        } else {
            Effect::placeholder(phase, teardown.clone())
        };
        self.effects.push(record);
        self.push(kind, type_name::<D>(), EffectHook { deps, teardown });
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Memoization
    // ------------------------------------------------------------------------

    /// Memoize `compute` until `deps` change.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let total = cx.use_memo(|| items.iter().sum::<i32>(), Some(items.clone()))?;
    /// ```
    pub fn use_memo<T, F, D>(&mut self, compute: F, deps: Option<D>) -> Result<T, HookError>
    where
        T: Clone + 'static,
        F: FnOnce() -> T,
        D: HookInput,
    {
        self.memo_hook(HookKind::Memo, compute, deps)
    }

    /// Keep returning the first `callback` until `deps` change.
    pub fn use_callback<F, D>(&mut self, callback: F, deps: Option<D>) -> Result<F, HookError>
    where
        F: Clone + 'static,
        D: HookInput,
    {
        self.memo_hook(HookKind::Callback, || callback, deps)
    }

    fn memo_hook<T, F, D>(
        &mut self,
        kind: HookKind,
        compute: F,
        deps: Option<D>,
    ) -> Result<T, HookError>
    where
        T: Clone + 'static,
        F: FnOnce() -> T,
        D: HookInput,
    {
        let index = self.hooks.len();
        let cached = match self.advance(kind)? {
            Slot::Fresh => None,
            Slot::Reused { prior, .. } => {
                let prior: MemoHook<T, D> = prior.into_record(index, type_name::<T>())?;
                (!deps_changed(prior.deps.as_ref(), deps.as_ref())).then_some(prior.value)
            }
        };
        let value = match cached {
            Some(value) => value,
            None => compute(),
        };
        self.push(
            kind,
            type_name::<T>(),
            MemoHook {
                value: value.clone(),
                deps,
            },
        );
        Ok(value)
    }

    // ------------------------------------------------------------------------
    // Refs and context
    // ------------------------------------------------------------------------

    /// A mutable cell that persists across renders without triggering them.
    pub fn use_ref<T: 'static>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> Result<RefHandle<T>, HookError> {
        let index = self.hooks.len();
        let handle = match self.advance(HookKind::Ref)? {
            Slot::Fresh => RefHandle::new(init()),
            Slot::Reused { prior, .. } => {
                prior
                    .into_record::<RefHook<T>>(index, type_name::<T>())?
                    .handle
            }
        };
        self.push(
            HookKind::Ref,
            type_name::<T>(),
            RefHook {
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }

    /// Read the context value of type `T`, if one was provided.
    ///
    /// Does not occupy a hook slot.
    pub fn use_context<T: Clone + 'static>(&self) -> Option<T> {
        self.contexts.get::<T>()
    }
}

fn with_teardown<F, C>(effect: F) -> EffectFn
where
    F: FnOnce() -> C + 'static,
    C: FnOnce() + 'static,
{
    Box::new(move || Some(Box::new(effect()) as Teardown))
}

/// Render one unit, re-running `render` while it dispatches render-phase
/// updates to itself.
///
/// `committed` is the unit's hook list from its last commit, or `None` on
/// mount. The returned [`RenderOutput`] is not committed; the caller decides
/// whether to commit it. On failure every render-phase update merged during
/// the pass is rolled back.
pub fn render_with_hooks<O, R>(
    unit: &Rc<Unit>,
    committed: Option<&HookList>,
    urgency: Urgency,
    contexts: &ContextStore,
    mut render: R,
) -> Result<RenderOutput<O>, HookError>
where
    R: FnMut(&mut RenderContext<'_>) -> Result<O, HookError>,
{
    let _guard = RenderGuard::enter(unit);
    let mut merged: Vec<(Rc<dyn RenderPhaseQueue>, Option<UpdateId>)> = Vec::new();
    let mut seed = None;

    for attempt in 1..=RE_RENDER_LIMIT {
        let mut cx = RenderContext::begin(unit, urgency, committed, seed.take(), contexts);
        let outcome = match render(&mut cx) {
            Ok(output) => cx.finish(output, attempt),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(RenderOutcome::Complete(output)) => return Ok(output),
            Ok(RenderOutcome::RetryWithPendingUpdates(hooks)) => {
                tracing::debug!(unit = %unit.id, attempt, "re-rendering with render-phase updates");
                for queue in unit.take_render_phase_queues() {
                    let mark = queue.merge_render_phase(urgency);
                    merged.push((queue, mark));
                }
                seed = Some(hooks);
            }
            Err(err) => {
                roll_back(merged);
                return Err(err);
            }
        }
    }

    roll_back(merged);
    Err(HookError::TooManyReRenders {
        limit: RE_RENDER_LIMIT,
    })
}

fn roll_back(merged: Vec<(Rc<dyn RenderPhaseQueue>, Option<UpdateId>)>) {
    for (queue, mark) in merged.into_iter().rev() {
        queue.rollback(mark);
    }
}
