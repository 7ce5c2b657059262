use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::engine::snapshot::TaskSnapshot;
use crate::ids::TaskId;

/// Caller-side handle of a submitted execution.
///
/// Dropping the handle does not cancel the execution.
#[derive(Clone, Debug)]
pub struct ExecutionHandle {
    task_id: TaskId,
    state: watch::Receiver<TaskSnapshot>,
    token: CancellationToken,
}

impl ExecutionHandle {
    pub(crate) fn new(task_id: TaskId, state: watch::Receiver<TaskSnapshot>, token: CancellationToken) -> Self {
        Self {
            task_id,
            state,
            token,
        }
    }

    /// Execution id.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Current state of the execution.
    pub fn snapshot(&self) -> TaskSnapshot {
        self.state.borrow().clone()
    }

    /// Requests cancellation (same as [`Engine::cancel`](crate::Engine::cancel)).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for a terminal state and returns the final snapshot.
    ///
    /// If the execution was aborted (grace exceeded) the last known snapshot is returned.
    pub async fn wait(&self) -> TaskSnapshot {
        let mut rx = self.state.clone();
        let _ = rx.wait_for(TaskSnapshot::is_terminal).await;
        rx.borrow().clone()
    }
}
