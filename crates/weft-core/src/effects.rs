//! Side effects produced by a render pass and run at commit.

use crate::ring::Ring;
use std::cell::RefCell;
use std::fmt;
use std::ops::BitOr;
use std::rc::Rc;

/// Cleanup returned by an effect, run before the effect re-runs or when the
/// unit unmounts.
pub type Teardown = Box<dyn FnOnce()>;

/// Effect body. Returns an optional teardown.
pub type EffectFn = Box<dyn FnOnce() -> Option<Teardown>>;

/// When an effect runs relative to commit.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EffectPhase {
    /// Synchronously during commit.
    Layout,
    /// Asynchronously after commit.
    Passive,
}

impl EffectPhase {
    fn tag(self) -> EffectTag {
        match self {
            EffectPhase::Layout => EffectTag::LAYOUT,
            EffectPhase::Passive => EffectTag::PASSIVE,
        }
    }
}

/// Commit work a render pass left behind for its unit.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectTag(u8);

impl EffectTag {
    pub const NONE: EffectTag = EffectTag(0);
    pub const LAYOUT: EffectTag = EffectTag(1);
    pub const PASSIVE: EffectTag = EffectTag(1 << 1);

    pub fn contains(self, other: EffectTag) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EffectTag {
    type Output = EffectTag;

    fn bitor(self, rhs: EffectTag) -> EffectTag {
        EffectTag(self.0 | rhs.0)
    }
}

impl fmt::Debug for EffectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.contains(EffectTag::LAYOUT) {
            set.entry(&"layout");
        }
        if self.contains(EffectTag::PASSIVE) {
            set.entry(&"passive");
        }
        set.finish()
    }
}

/// Teardown storage shared by every render of one effect hook.
#[derive(Clone, Default)]
pub struct TeardownSlot(Rc<RefCell<Option<Teardown>>>);

impl TeardownSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Run and clear the stored teardown, if any.
    pub fn run(&self) -> bool {
        let teardown = self.0.borrow_mut().take();
        match teardown {
            Some(teardown) => {
                teardown();
                true
            }
            None => false,
        }
    }

    fn store(&self, teardown: Option<Teardown>) {
        *self.0.borrow_mut() = teardown;
    }
}

/// One effect recorded by a render pass.
///
/// An effect without a body is a placeholder for a hook whose dependencies
/// did not change. It keeps its position in the list but does nothing at
/// commit.
pub struct Effect {
    phase: EffectPhase,
    create: Option<EffectFn>,
    teardown: TeardownSlot,
}

impl Effect {
    pub fn new(phase: EffectPhase, create: EffectFn, teardown: TeardownSlot) -> Self {
        Self {
            phase,
            create: Some(create),
            teardown,
        }
    }

    pub fn placeholder(phase: EffectPhase, teardown: TeardownSlot) -> Self {
        Self {
            phase,
            create: None,
            teardown,
        }
    }

    pub fn phase(&self) -> EffectPhase {
        self.phase
    }

    pub fn needs_commit(&self) -> bool {
        self.create.is_some()
    }
}

/// Ordered effects from one render pass.
#[derive(Default)]
pub struct EffectList {
    effects: Ring<Effect>,
    tag: EffectTag,
}

impl EffectList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) {
        if effect.needs_commit() {
            self.tag = self.tag | effect.phase.tag();
        }
        self.effects.push_back(effect);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Phases with at least one effect that needs to run.
    pub fn tag(&self) -> EffectTag {
        self.tag
    }

    /// Run the previous teardown of every changed effect in `phase`.
    pub fn run_teardowns(&self, phase: EffectPhase) -> usize {
        self.effects
            .iter()
            .filter(|(_, effect)| effect.phase == phase && effect.needs_commit())
            .filter(|(_, effect)| effect.teardown.run())
            .count()
    }

    /// Run every changed effect body in `phase`, storing new teardowns.
    ///
    /// Effects of the other phase stay in the list.
    pub fn run_mounts(&mut self, phase: EffectPhase) -> usize {
        let mut kept = Ring::new();
        let mut ran = 0;
        while let Some((_, mut effect)) = self.effects.pop_front() {
            if effect.phase != phase {
                kept.push_back(effect);
                continue;
            }
            if let Some(create) = effect.create.take() {
                effect.teardown.store(create());
                ran += 1;
            }
        }
        self.effects = kept;
        self.tag = EffectTag::NONE;
        for (_, effect) in self.effects.iter() {
            if effect.needs_commit() {
                self.tag = self.tag | effect.phase.tag();
            }
        }
        ran
    }

    /// Run teardowns then bodies for `phase`.
    pub fn commit(&mut self, phase: EffectPhase) -> usize {
        self.run_teardowns(phase);
        self.run_mounts(phase)
    }
}
