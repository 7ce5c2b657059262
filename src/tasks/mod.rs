//! # Units of work and submissions.
//!
//! - [`Work`]: trait for retryable async work producing a JSON result
//! - [`WorkFn`]: closure-backed implementation
//! - [`WorkRef`]: shared handle (`Arc<dyn Work>`)
//! - [`AttemptContext`]: per-attempt identity, cancellation and progress reporting
//! - [`Submission`]: work bundled with its subject, task id and retry override

mod context;
mod submission;
mod work;
mod work_fn;

pub use context::AttemptContext;
pub use submission::Submission;
pub use work::Work;
pub use work_fn::{WorkFn, WorkRef};
