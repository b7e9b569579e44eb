//! Units of deferred work passed from the broker to the worker pool.

use crate::domain::context::RequestContext;
use crate::error::AppError;
use tokio::sync::oneshot;

/// Rendezvous on which a `ReadList` caller waits for its answer.
pub type ListReply = oneshot::Sender<Result<Vec<String>, AppError>>;

/// Optional rendezvous for the terminal outcome of a write-behind.
pub type WriteAck = oneshot::Sender<Result<(), AppError>>;

pub enum TaskKind {
    /// Load the owner's key list from the backing store and cache it.
    ReadList { reply: ListReply },
    /// Commit the owner's staged payload to the backing store.
    WriteBehind {
        superuser: bool,
        ack: Option<WriteAck>,
    },
}

/// A task is consumed exactly once by exactly one worker.
pub struct Task {
    pub kind: TaskKind,
    pub ctx: RequestContext,
    pub owner: String,
    /// Cache key for reads, short key for writes.
    pub key: String,
}

impl Task {
    pub fn read_list(ctx: RequestContext, owner: &str, list_key: String, reply: ListReply) -> Self {
        Self {
            kind: TaskKind::ReadList { reply },
            ctx,
            owner: owner.to_string(),
            key: list_key,
        }
    }

    pub fn write_behind(
        ctx: RequestContext,
        owner: &str,
        key: &str,
        superuser: bool,
        ack: Option<WriteAck>,
    ) -> Self {
        Self {
            kind: TaskKind::WriteBehind { superuser, ack },
            ctx,
            owner: owner.to_string(),
            key: key.to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            TaskKind::ReadList { .. } => "read_list",
            TaskKind::WriteBehind { .. } => "write_behind",
        }
    }

    /// Answers whoever is waiting on this task with `err` without running it.
    pub fn reject(self, err: AppError) {
        match self.kind {
            TaskKind::ReadList { reply } => {
                let _ = reply.send(Err(err));
            }
            TaskKind::WriteBehind { ack: Some(ack), .. } => {
                let _ = ack.send(Err(err));
            }
            TaskKind::WriteBehind { ack: None, .. } => {}
        }
    }
}

/// Handle on the terminal outcome of an acknowledged write-behind.
#[derive(Debug)]
pub struct WriteReceipt {
    outcome: oneshot::Receiver<Result<(), AppError>>,
}

impl WriteReceipt {
    pub(crate) fn new(outcome: oneshot::Receiver<Result<(), AppError>>) -> Self {
        Self { outcome }
    }

    /// A receipt for a write that already reached its terminal state.
    pub(crate) fn ready(result: Result<(), AppError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self::new(rx)
    }

    /// Waits until a worker has committed or given up on the write.
    ///
    /// # Errors
    ///
    /// Returns the worker's terminal error, or [`AppError::WorkerUnavailable`]
    /// if the task was dropped without an answer.
    pub async fn wait(self) -> Result<(), AppError> {
        self.outcome
            .await
            .map_err(|_| AppError::WorkerUnavailable)?
    }
}
