//! Error types used by the taskpulse runtime, the execution engine and transports.
//!
//! - [`TaskError`] outcome of one failed attempt of a unit of work.
//! - [`SendError`] transport failure while delivering to an observer.
//! - [`SubmitError`] rejected work submission.
//! - [`ConfigError`] invalid or unparsable configuration.
//! - [`RuntimeError`] failures of the runtime itself (shutdown).
//!
//! Every enum exposes `as_label()` with a short stable snake_case label for logs/metrics.

use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the taskpulse runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some executions were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Ids of the task executions that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskpulse::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// # Errors produced by one attempt of a unit of work.
///
/// The engine classifies each failure as **transient** (retried with backoff until
/// `max_retries` is exhausted) or **fatal** (terminal immediately).
/// [`TaskError::Kind`] carries a symbolic error kind that is classified against the
/// configured retryable kinds (see [`RetryPolicy`](crate::RetryPolicy)).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Failure that may succeed if retried.
    #[error("transient failure: {error}")]
    Transient {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable failure (never retried).
    #[error("fatal failure (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Failure tagged with a symbolic kind such as `rate_limit` or `timeout`.
    #[error("{kind}: {error}")]
    Kind {
        /// Symbolic error kind.
        kind: String,
        /// The underlying error message.
        error: String,
    },

    /// The work observed cancellation and stopped early.
    #[error("execution cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Transient`].
    pub fn transient(error: impl Into<String>) -> Self {
        TaskError::Transient {
            error: error.into(),
        }
    }

    /// Shorthand for [`TaskError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        TaskError::Fatal {
            error: error.into(),
        }
    }

    /// Shorthand for [`TaskError::Kind`].
    pub fn kind(kind: impl Into<String>, error: impl Into<String>) -> Self {
        TaskError::Kind {
            kind: kind.into(),
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// For [`TaskError::Kind`] the label is the kind itself.
    ///
    /// # Example
    /// ```
    /// use taskpulse::TaskError;
    ///
    /// assert_eq!(TaskError::transient("io").as_label(), "task_transient");
    /// assert_eq!(TaskError::kind("rate_limit", "429").as_label(), "rate_limit");
    /// ```
    pub fn as_label(&self) -> &str {
        match self {
            TaskError::Transient { .. } => "task_transient",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Kind { kind, .. } => kind,
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Returns the bare error message without the classification prefix.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Transient { error }
            | TaskError::Fatal { error }
            | TaskError::Kind { error, .. } => error.clone(),
            TaskError::Canceled => "execution cancelled".to_string(),
        }
    }
}

/// # Errors produced while delivering an update to an observer.
///
/// Any send error marks the observer as dead; the registry disconnects it.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The remote end (or the channel feeding it) is gone.
    #[error("observer transport closed")]
    Closed,

    /// The transport reported an I/O or encoding failure.
    #[error("observer send failed: {0}")]
    Failed(String),
}

impl SendError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SendError::Closed => "send_closed",
            SendError::Failed(_) => "send_failed",
        }
    }
}

/// # Errors returned by [`Engine::submit`](crate::Engine::submit).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// A non-terminal execution with the same task id already exists.
    #[error("task {0} is already active")]
    Duplicate(String),

    /// The runtime is shutting down and no longer accepts work.
    #[error("engine closed")]
    Closed,
}

impl SubmitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubmitError::Duplicate(_) => "submit_duplicate",
            SubmitError::Closed => "submit_closed",
        }
    }
}

/// # Errors produced while loading or validating [`Config`](crate::Config).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range.
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// Name of the offending option.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// An environment variable could not be parsed.
    #[error("cannot parse {key}={value:?}")]
    Parse {
        /// Environment variable name.
        key: String,
        /// Raw value.
        value: String,
    },

    /// JSON configuration could not be decoded.
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Invalid { .. } => "config_invalid",
            ConfigError::Parse { .. } => "config_parse",
            ConfigError::Json(_) => "config_json",
        }
    }
}
