//! Component trait.

use crate::error::HookError;
use crate::hooks::RenderContext;

/// A renderable unit with hook state.
///
/// Closures of the shape `Fn(&mut RenderContext<'_>) -> Result<O, HookError>`
/// are components too.
///
/// # Example
///
/// ```ignore
/// struct Greeting {
///     name: String,
/// }
///
/// impl Component for Greeting {
///     type Output = String;
///
///     fn render(&self, cx: &mut RenderContext<'_>) -> Result<String, HookError> {
///         let (visits, _) = cx.use_state(|| 1)?;
///         Ok(format!("Hello, {} (visit {visits})", self.name))
///     }
/// }
/// ```
pub trait Component: 'static {
    type Output: 'static;

    fn render(&self, cx: &mut RenderContext<'_>) -> Result<Self::Output, HookError>;

    /// Name used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F, O> Component for F
where
    F: Fn(&mut RenderContext<'_>) -> Result<O, HookError> + 'static,
    O: 'static,
{
    type Output = O;

    fn render(&self, cx: &mut RenderContext<'_>) -> Result<O, HookError> {
        self(cx)
    }
}
