//! Producer side of the worker queue.

use super::task::{Task, WriteReceipt};
use crate::domain::context::RequestContext;
use crate::error::AppError;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// How tasks are spread over the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueRouting {
    /// One queue consumed by every worker. Tasks of one owner may complete
    /// out of submission order.
    #[default]
    Shared,
    /// One queue per worker, chosen by a hash of the owner. Tasks of one
    /// owner are processed in submission order.
    Owner,
}

impl QueueRouting {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "shared" => Some(Self::Shared),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }
}

/// Turns deferred operations into [`Task`]s and hands them to the worker queue.
///
/// Cloning is cheap; every clone feeds the same queues. Once the pool starts
/// shutting down, every submission fails fast with [`AppError::QueueClosed`].
#[derive(Clone)]
pub struct TaskBroker {
    senders: Arc<[mpsc::Sender<Task>]>,
    routing: QueueRouting,
    closing: watch::Receiver<bool>,
}

impl TaskBroker {
    pub(crate) fn new(
        senders: Vec<mpsc::Sender<Task>>,
        routing: QueueRouting,
        closing: watch::Receiver<bool>,
    ) -> Self {
        Self {
            senders: senders.into(),
            routing,
            closing,
        }
    }

    /// Returns true once the pool has stopped accepting tasks.
    pub fn is_closed(&self) -> bool {
        *self.closing.borrow()
    }

    fn queue_for(&self, owner: &str) -> usize {
        match self.routing {
            QueueRouting::Shared => 0,
            QueueRouting::Owner => {
                let mut hasher = DefaultHasher::new();
                owner.hash(&mut hasher);
                (hasher.finish() % self.senders.len() as u64) as usize
            }
        }
    }

    /// Enqueues `task`, waiting for queue room if necessary.
    async fn enqueue(&self, task: Task) -> Result<(), AppError> {
        if self.is_closed() {
            return Err(AppError::QueueClosed);
        }

        let sender = &self.senders[self.queue_for(&task.owner)];
        let mut closing = self.closing.clone();

        tokio::select! {
            biased;
            _ = closing.wait_for(|closed| *closed) => Err(AppError::QueueClosed),
            sent = sender.send(task) => sent.map_err(|_| AppError::QueueClosed),
        }
    }

    /// Submits a `ReadList` for `owner` and waits for the worker's answer.
    ///
    /// Waiting for queue room is bounded by the caller's deadline. Once
    /// queued, the deadline is enforced by the worker.
    ///
    /// # Errors
    ///
    /// - [`AppError::QueueClosed`] if the pool is shutting down
    /// - [`AppError::DeadlineExceeded`] if the deadline passes first
    /// - whatever the worker reports for the read
    pub async fn submit_read(
        &self,
        ctx: &RequestContext,
        owner: &str,
        list_key: String,
    ) -> Result<Vec<String>, AppError> {
        let (reply, answer) = oneshot::channel();
        let task = Task::read_list(ctx.clone(), owner, list_key, reply);

        ctx.run(self.enqueue(task)).await?;

        answer.await.map_err(|_| AppError::WorkerUnavailable)?
    }

    /// Submits a `WriteBehind` for `owner`/`key` without waiting for it to run.
    ///
    /// Returns once the task sits in its queue's slot, which may be before
    /// any worker is free to take it.
    ///
    /// # Errors
    ///
    /// Only enqueue failures are reported; the write itself is logged by the
    /// worker.
    pub async fn submit_write(
        &self,
        ctx: &RequestContext,
        owner: &str,
        key: &str,
        superuser: bool,
    ) -> Result<(), AppError> {
        let task = Task::write_behind(ctx.clone(), owner, key, superuser, None);
        ctx.run(self.enqueue(task)).await
    }

    /// Like [`submit_write`](Self::submit_write) but returns a receipt that
    /// resolves to the worker's terminal outcome.
    pub async fn submit_write_acknowledged(
        &self,
        ctx: &RequestContext,
        owner: &str,
        key: &str,
        superuser: bool,
    ) -> Result<WriteReceipt, AppError> {
        let (ack, outcome) = oneshot::channel();
        let task = Task::write_behind(ctx.clone(), owner, key, superuser, Some(ack));

        ctx.run(self.enqueue(task)).await?;
        Ok(WriteReceipt::new(outcome))
    }
}
