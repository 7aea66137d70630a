//! Hook contract violations.

use crate::hooks::HookKind;
use thiserror::Error;

/// A fatal misuse of the hooks API detected while rendering a unit.
///
/// Every variant aborts the render pass that raised it. The render output
/// is discarded and the error is surfaced to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error(
        "rendered fewer hooks than expected: previous render had {expected} hooks, this render had {rendered}. \
         This usually means a hook was skipped by an early return"
    )]
    TooFewHooks { expected: usize, rendered: usize },

    #[error(
        "rendered more hooks than during the previous render ({expected}). \
         Hooks must be called unconditionally and in the same order every render"
    )]
    TooManyHooks { expected: usize },

    #[error("hook order mismatch at index {index}: previous render called `{previous}`, this render called `{current}`")]
    HookOrderMismatch {
        index: usize,
        previous: HookKind,
        current: HookKind,
    },

    #[error("hook at index {index} holds `{found}` but this render asked for `{expected}`")]
    HookTypeMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("too many re-renders: render-phase updates were still being scheduled after {limit} attempts")]
    TooManyReRenders { limit: usize },
}
