//! Per-call request context.

use crate::error::AppError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Carries the caller's deadline through the orchestrator and into worker tasks.
///
/// Worker tasks outlive the caller's future, so dropping that future does not
/// stop them. The deadline is the only limit a queued task observes.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context without a deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Runs `fut` bounded by the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::DeadlineExceeded`] if the deadline elapses first,
    /// otherwise the future's own error converted into [`AppError`].
    pub async fn run<T, E, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<AppError>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| AppError::DeadlineExceeded)?
                .map_err(Into::into),
            None => fut.await.map_err(Into::into),
        }
    }
}
