//! Fixed pool of long-lived workers draining the task queues.

use super::broker::{QueueRouting, TaskBroker};
use super::task::{Task, TaskKind};
use crate::application::invalidation::Invalidator;
use crate::domain::context::RequestContext;
use crate::domain::entities::Link;
use crate::domain::repositories::BackingStore;
use crate::error::{AppError, CacheError};
use crate::infrastructure::cache::keys::staged_key;
use crate::infrastructure::cache::CacheStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, error, info, warn};

type SharedQueue = Arc<Mutex<mpsc::Receiver<Task>>>;

/// Tunables of the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// TTL of `list:<owner>` entries populated by workers.
    pub list_ttl: Duration,
    /// Retries of a failed backing write after the first attempt.
    pub retry_attempts: usize,
    /// Base of the exponential backoff between retries, in milliseconds.
    pub retry_base_ms: u64,
    /// Upper bound of a single backoff delay.
    pub retry_max_delay: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            list_ttl: Duration::from_secs(3600),
            retry_attempts: 3,
            retry_base_ms: 10,
            retry_max_delay: Duration::from_secs(1),
        }
    }
}

/// Summary returned by [`WorkerPool::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// Tasks executed to completion since the pool started.
    pub processed: u64,
    /// Tasks still queued when the pool stopped; their callers got `QueueClosed`.
    pub dropped: usize,
    /// True if the drain timeout expired and workers were cancelled.
    pub timed_out: bool,
}

/// N workers consuming [`Task`]s and performing the store and cache I/O.
///
/// The pool size is fixed at construction. Workers stop when
/// [`shutdown`](Self::shutdown) is called or the pool is dropped.
pub struct WorkerPool {
    size: usize,
    queues: Vec<SharedQueue>,
    closing: watch::Sender<bool>,
    cancel: watch::Sender<bool>,
    workers: Mutex<JoinSet<()>>,
    processed: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Spawns `size` workers and returns the pool with a broker feeding it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        size: usize,
        routing: QueueRouting,
        store: Arc<dyn BackingStore>,
        aggregates: Arc<Invalidator>,
        settings: WorkerSettings,
    ) -> (Self, TaskBroker) {
        let size = size.max(1);
        let queue_count = match routing {
            QueueRouting::Shared => 1,
            QueueRouting::Owner => size,
        };

        let (closing_tx, closing_rx) = watch::channel(false);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut senders = Vec::with_capacity(queue_count);
        let mut queues = Vec::with_capacity(queue_count);
        for _ in 0..queue_count {
            let (tx, rx) = mpsc::channel(1);
            senders.push(tx);
            queues.push(Arc::new(Mutex::new(rx)));
        }

        let processed = Arc::new(AtomicU64::new(0));
        let executor = Arc::new(Executor {
            store,
            cache: aggregates.cache().clone(),
            aggregates,
            settings,
        });

        let mut workers = JoinSet::new();
        for id in 0..size {
            let worker = Worker {
                id,
                queue: queues[id % queue_count].clone(),
                executor: executor.clone(),
                closing: closing_rx.clone(),
                cancel: cancel_rx.clone(),
                processed: processed.clone(),
            };
            workers.spawn(worker.run());
        }

        info!(workers = size, ?routing, "Worker pool started");

        let pool = Self {
            size,
            queues,
            closing: closing_tx,
            cancel: cancel_tx,
            workers: Mutex::new(workers),
            processed,
        };
        (pool, TaskBroker::new(senders, routing, closing_rx))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks executed to completion so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Stops accepting tasks and drains the queues.
    ///
    /// Workers finish what is queued until the queues are empty or
    /// `drain_timeout` expires; then they are cancelled. A `ReadList` cut off
    /// mid-execution gets [`AppError::Cancelled`], anything left in a queue
    /// gets [`AppError::QueueClosed`]. Calling this twice is harmless.
    pub async fn shutdown(&self, drain_timeout: Duration) -> ShutdownReport {
        self.closing.send_replace(true);
        info!("Worker pool draining");

        let mut workers = self.workers.lock().await;
        let drained = tokio::time::timeout(drain_timeout, join_all(&mut workers))
            .await
            .is_ok();

        if !drained {
            warn!(
                timeout_ms = drain_timeout.as_millis() as u64,
                "Drain timeout expired, cancelling workers"
            );
            self.cancel.send_replace(true);
            join_all(&mut workers).await;
        }

        let mut dropped = 0;
        for queue in &self.queues {
            let mut rx = queue.lock().await;
            rx.close();
            while let Ok(task) = rx.try_recv() {
                debug!(kind = task.label(), owner = %task.owner, "Dropping queued task");
                task.reject(AppError::QueueClosed);
                dropped += 1;
            }
        }

        let report = ShutdownReport {
            processed: self.processed(),
            dropped,
            timed_out: !drained,
        };
        info!(
            processed = report.processed,
            dropped = report.dropped,
            timed_out = report.timed_out,
            "Worker pool stopped"
        );
        report
    }
}

async fn join_all(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined
            && e.is_panic()
        {
            error!(error = %e, "Worker panicked");
        }
    }
}

/// Store and cache handles shared by every worker.
struct Executor {
    store: Arc<dyn BackingStore>,
    cache: Arc<dyn CacheStore>,
    aggregates: Arc<Invalidator>,
    settings: WorkerSettings,
}

impl Executor {
    async fn read_list(
        &self,
        ctx: &RequestContext,
        owner: &str,
        list_key: &str,
    ) -> Result<Vec<String>, AppError> {
        if ctx.is_expired() {
            return Err(AppError::DeadlineExceeded);
        }

        let seen = self.aggregates.epoch(list_key);
        let keys = ctx.run(self.store.list_owned(owner)).await?;

        self.aggregates
            .populate(list_key, &keys, self.settings.list_ttl, seen)
            .await;

        Ok(keys)
    }

    async fn write_behind(
        &self,
        ctx: &RequestContext,
        owner: &str,
        key: &str,
        superuser: bool,
    ) -> Result<(), AppError> {
        let staged = staged_key(owner);
        let Some(raw) = self.cache.get(&staged).await? else {
            return Err(AppError::StagedValueAbandoned {
                owner: owner.to_string(),
            });
        };
        let link: Link = serde_json::from_str(&raw).map_err(CacheError::from)?;

        // A later Put of another key replaced this task's payload.
        if link.short_key != key {
            debug!(owner, key, staged = %link.short_key, "Staged value belongs to another key");
            return Err(AppError::StagedValueAbandoned {
                owner: owner.to_string(),
            });
        }

        let strategy = ExponentialBackoff::from_millis(self.settings.retry_base_ms)
            .max_delay(self.settings.retry_max_delay)
            .take(self.settings.retry_attempts);

        let mut attempts = 0;
        let committed = ctx
            .run(RetryIf::spawn(
                strategy,
                || {
                    attempts += 1;
                    let link = link.clone();
                    async move { self.store.put(owner, key, link, superuser).await }
                },
                |e: &crate::error::StoreError| {
                    warn!(owner, key, error = %e, "Backing write failed");
                    !e.is_permanent()
                },
            ))
            .await;

        if let Err(e) = committed {
            return Err(AppError::WriteBehindFailed {
                owner: owner.to_string(),
                key: key.to_string(),
                attempts,
                reason: e.to_string(),
            });
        }

        // A newer Put may have replaced the payload meanwhile; leave it for its own task.
        match self.cache.delete_if_eq(&staged, &raw).await {
            Ok(true) => {}
            Ok(false) => debug!(owner, "Staged value replaced, keeping it"),
            Err(e) => warn!(owner, error = %e, "Failed to clear staged value"),
        }
        self.aggregates.flush_owner(owner).await;

        debug!(owner, key, attempts, "Write-behind committed");
        Ok(())
    }
}

struct Worker {
    id: usize,
    queue: SharedQueue,
    executor: Arc<Executor>,
    closing: watch::Receiver<bool>,
    cancel: watch::Receiver<bool>,
    processed: Arc<AtomicU64>,
}

impl Worker {
    async fn run(mut self) {
        debug!(worker = self.id, "Worker started");

        loop {
            let task = tokio::select! {
                biased;
                _ = self.cancel.wait_for(|c| *c) => break,
                next = next_task(&self.queue, &mut self.closing) => match next {
                    Some(task) => task,
                    None => break,
                },
            };

            if self.execute(task).await {
                self.processed.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }

        debug!(worker = self.id, "Worker stopped");
    }

    /// Runs one task. Returns false if the pool was cancelled meanwhile.
    async fn execute(&mut self, task: Task) -> bool {
        let Task {
            kind,
            ctx,
            owner,
            key,
        } = task;
        debug!(worker = self.id, owner = %owner, key = %key, "Executing task");

        match kind {
            TaskKind::ReadList { reply } => {
                let outcome = tokio::select! {
                    biased;
                    _ = self.cancel.wait_for(|c| *c) => None,
                    listed = self.executor.read_list(&ctx, &owner, &key) => Some(listed),
                };

                let finished = outcome.is_some();
                let answer = outcome.unwrap_or(Err(AppError::Cancelled));
                if let Err(e) = &answer {
                    debug!(worker = self.id, owner = %owner, error = %e, "List read failed");
                }
                // The caller may have given up waiting.
                let _ = reply.send(answer);
                finished
            }
            TaskKind::WriteBehind { superuser, ack } => {
                let outcome = tokio::select! {
                    biased;
                    _ = self.cancel.wait_for(|c| *c) => None,
                    written = self.executor.write_behind(&ctx, &owner, &key, superuser) => {
                        Some(written)
                    }
                };

                let finished = outcome.is_some();
                let outcome = outcome.unwrap_or(Err(AppError::Cancelled));
                match &outcome {
                    Ok(()) => {}
                    Err(AppError::StagedValueAbandoned { .. }) => {
                        warn!(
                            owner = %owner,
                            key = %key,
                            "Staged value gone, write-behind abandoned"
                        );
                    }
                    Err(e) => {
                        error!(
                            target: "weblink::dead_letter",
                            owner = %owner,
                            key = %key,
                            error = %e,
                            "Write-behind dropped"
                        );
                    }
                }
                if let Some(ack) = ack {
                    let _ = ack.send(outcome);
                }
                finished
            }
        }
    }
}

/// Takes the next task from `queue`.
///
/// Once closing is signalled, only what is already queued is returned;
/// `None` means the worker should exit.
async fn next_task(queue: &SharedQueue, closing: &mut watch::Receiver<bool>) -> Option<Task> {
    let mut rx = queue.lock().await;

    if !*closing.borrow() {
        tokio::select! {
            task = rx.recv() => return task,
            _ = closing.wait_for(|c| *c) => {}
        }
    }

    rx.try_recv().ok()
}
