use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TaskError;
use crate::tasks::context::AttemptContext;
use crate::tasks::work::Work;

/// Shared handle to a unit of work.
pub type WorkRef = Arc<dyn Work>;

/// Function-backed work.
///
/// Wraps a closure that *creates* a new future per attempt.
#[derive(Debug)]
pub struct WorkFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> WorkFn<F> {
    /// Creates new function-backed work.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the work and returns it as a shared handle.
    ///
    /// ## Example
    /// ```rust
    /// use serde_json::json;
    /// use taskpulse::{AttemptContext, TaskError, Work, WorkFn, WorkRef};
    ///
    /// let w: WorkRef = WorkFn::arc("hello", |_ctx: AttemptContext| async {
    ///     Ok::<_, TaskError>(json!("hi"))
    /// });
    /// assert_eq!(w.name(), "hello");
    /// ```
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Work for WorkFn<F>
where
    F: Fn(AttemptContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: AttemptContext) -> Result<Value, TaskError> {
        (self.f)(ctx).await
    }
}
