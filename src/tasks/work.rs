use async_trait::async_trait;
use serde_json::Value;

use crate::error::TaskError;
use crate::tasks::context::AttemptContext;

/// # Retryable unit of work.
///
/// `run` is called once per attempt with a fresh [`AttemptContext`]. Return
/// `Ok(result)` on success, a classified [`TaskError`] on failure, and
/// [`TaskError::Canceled`] when stopping early because of cancellation.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use serde_json::{Value, json};
/// use taskpulse::{AttemptContext, TaskError, Work};
///
/// struct Index;
///
/// #[async_trait]
/// impl Work for Index {
///     fn name(&self) -> &str { "index" }
///
///     async fn run(&self, ctx: AttemptContext) -> Result<Value, TaskError> {
///         if ctx.is_cancelled() {
///             return Err(TaskError::Canceled);
///         }
///         ctx.report_progress(50.0, Some("halfway"));
///         Ok(json!({"indexed": 10}))
///     }
/// }
/// ```
#[async_trait]
pub trait Work: Send + Sync + 'static {
    /// Returns a stable, human-readable name.
    fn name(&self) -> &str;

    /// Runs one attempt.
    async fn run(&self, ctx: AttemptContext) -> Result<Value, TaskError>;
}
