use thiserror::Error;
use weft_core::{HookError, UnitId};

/// A render pass that failed and was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{unit} failed to render")]
pub struct RenderError {
    pub unit: UnitId,
    #[source]
    pub source: HookError,
}

impl RenderError {
    pub fn new(unit: UnitId, source: HookError) -> Self {
        Self { unit, source }
    }
}
