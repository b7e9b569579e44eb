//! Deferred execution for write-back mode.
//!
//! The [`TaskBroker`] turns cache misses and staged writes into [`Task`]s on a
//! bounded single-slot queue; the [`WorkerPool`] consumes them with a fixed
//! number of long-lived tokio tasks.
//!
//! A queue is a tokio `mpsc::channel(1)`, which holds one task. A send
//! therefore returns as soon as that slot is free, even if every worker is
//! busy; only the next producer waits. This is one task more than an
//! unbuffered rendezvous. Tasks still sitting in a slot at shutdown are
//! drained and counted in [`ShutdownReport::dropped`].

mod broker;
mod pool;
mod task;

pub use broker::{QueueRouting, TaskBroker};
pub use pool::{ShutdownReport, WorkerPool, WorkerSettings};
pub use task::{Task, TaskKind, WriteReceipt};
