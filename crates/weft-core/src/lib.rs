//! Core types for weft: the incremental hook-state engine.

pub mod component;
pub mod context;
pub mod deps;
pub mod effects;
pub mod error;
pub mod hooks;
pub mod ring;
pub mod update_queue;
pub mod urgency;

pub use component::Component;
pub use context::ContextStore;
pub use deps::{ByEq, EVERY_RENDER, HookInput};
pub use effects::{EffectList, EffectPhase, EffectTag, Teardown};
pub use error::HookError;
pub use hooks::{
    Dispatch, ForwardedRef, HookKind, HookList, HookMeta, RE_RENDER_LIMIT, RefHandle,
    RenderContext, RenderOutcome, RenderOutput, SetState, StateAction, Unit, UnitId,
    UpdateScheduler, render_with_hooks,
};
pub use urgency::{Millis, Urgency};
