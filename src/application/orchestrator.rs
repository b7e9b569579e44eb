//! Caller-facing storage contract with caching.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::application::invalidation::Invalidator;
use crate::application::workers::{
    QueueRouting, ShutdownReport, TaskBroker, WorkerPool, WorkerSettings, WriteReceipt,
};
use crate::domain::context::RequestContext;
use crate::domain::entities::{Link, NewUser, User};
use crate::domain::repositories::{BackingStore, StoreKind};
use crate::error::AppError;
use crate::infrastructure::cache::keys::{ALL_KEY, list_key, staged_key};
use crate::infrastructure::cache::{CacheStore, CacheStoreExt};

/// Caching strategy of a [`CacheOrchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Writes go straight to the backing store; aggregates are invalidated afterwards.
    CacheAside,
    /// Writes are staged in the cache and committed by the worker pool.
    #[default]
    WriteBack,
}

impl CacheMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cache-aside" | "cache_aside" => Some(Self::CacheAside),
            "write-back" | "write_back" => Some(Self::WriteBack),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheAside => "cache-aside",
            Self::WriteBack => "write-back",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction parameters of a [`CacheOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub mode: CacheMode,
    /// Worker count (write-back only).
    pub workers: usize,
    pub routing: QueueRouting,
    /// TTL of `list:<owner>` and `all:`.
    pub list_ttl: Duration,
    /// TTL of `staged:<owner>`.
    pub staged_ttl: Duration,
    /// Write-behind retries after the first attempt.
    pub retry_attempts: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            mode: CacheMode::default(),
            workers: 2,
            routing: QueueRouting::default(),
            list_ttl: Duration::from_secs(3600),
            staged_ttl: Duration::from_secs(3600),
            retry_attempts: 3,
        }
    }
}

/// Storage facade that places a cache in front of a [`BackingStore`].
///
/// Point lookups, deletes, redirects and account operations always go to the
/// backing store. Owner listings and the global listing are served from the
/// cache when possible. In write-back mode, writes are staged in the cache
/// under `staged:<owner>` and committed by a [`WorkerPool`]; the caller gets
/// success before the backing write is confirmed.
///
/// Only one staged value is kept per owner. Two writes by the same owner
/// before the first is drained commit only the second.
pub struct CacheOrchestrator {
    store: Arc<dyn BackingStore>,
    cache: Arc<dyn CacheStore>,
    aggregates: Arc<Invalidator>,
    mode: CacheMode,
    broker: Option<TaskBroker>,
    pool: Option<WorkerPool>,
    list_ttl: Duration,
    staged_ttl: Duration,
}

impl CacheOrchestrator {
    /// Builds the orchestrator, starting the worker pool in write-back mode.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<dyn BackingStore>,
        cache: Arc<dyn CacheStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        let aggregates = Arc::new(Invalidator::new(cache.clone()));
        let (pool, broker) = match settings.mode {
            CacheMode::CacheAside => (None, None),
            CacheMode::WriteBack => {
                let worker_settings = WorkerSettings {
                    list_ttl: settings.list_ttl,
                    retry_attempts: settings.retry_attempts,
                    ..WorkerSettings::default()
                };
                let (pool, broker) = WorkerPool::start(
                    settings.workers,
                    settings.routing,
                    store.clone(),
                    aggregates.clone(),
                    worker_settings,
                );
                (Some(pool), Some(broker))
            }
        };

        info!(mode = %settings.mode, store = %store.kind(), "Cache orchestrator ready");

        Self {
            store,
            cache,
            aggregates,
            mode: settings.mode,
            broker,
            pool,
            list_ttl: settings.list_ttl,
            staged_ttl: settings.staged_ttl,
        }
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Kind of the backing store behind this orchestrator.
    pub fn store_kind(&self) -> StoreKind {
        self.store.kind()
    }

    /// Checks if the cache backend is reachable.
    pub async fn cache_healthy(&self) -> bool {
        self.cache.health_check().await
    }

    /// Looks up one link. Never cached.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Deleted` store errors for missing or soft-deleted links.
    pub async fn get(
        &self,
        ctx: &RequestContext,
        owner: &str,
        key: &str,
        superuser: bool,
    ) -> Result<Link, AppError> {
        ctx.run(self.store.get(owner, key, superuser)).await
    }

    /// Stores `link` under `owner`/`key`.
    ///
    /// In write-back mode this returns once the value is staged and the
    /// write-behind is queued; failures of the backing write are only logged.
    pub async fn put(
        &self,
        ctx: &RequestContext,
        owner: &str,
        key: &str,
        link: Link,
        superuser: bool,
    ) -> Result<(), AppError> {
        match &self.broker {
            None => {
                ctx.run(self.store.put(owner, key, link, superuser)).await?;
            }
            Some(broker) => {
                self.stage(owner, key, link).await?;
                broker.submit_write(ctx, owner, key, superuser).await?;
            }
        }

        self.aggregates.flush_owner(owner).await;
        Ok(())
    }

    /// Like [`put`](Self::put), but returns a receipt resolving to the
    /// terminal outcome of the backing write.
    pub async fn put_acknowledged(
        &self,
        ctx: &RequestContext,
        owner: &str,
        key: &str,
        link: Link,
        superuser: bool,
    ) -> Result<WriteReceipt, AppError> {
        let receipt = match &self.broker {
            None => {
                ctx.run(self.store.put(owner, key, link, superuser)).await?;
                WriteReceipt::ready(Ok(()))
            }
            Some(broker) => {
                self.stage(owner, key, link).await?;
                broker
                    .submit_write_acknowledged(ctx, owner, key, superuser)
                    .await?
            }
        };

        self.aggregates.flush_owner(owner).await;
        Ok(receipt)
    }

    /// Soft-deletes a link and flushes the aggregates of its real owner.
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        owner: &str,
        key: &str,
        superuser: bool,
    ) -> Result<(), AppError> {
        let record_owner = ctx.run(self.store.delete(owner, key, superuser)).await?;

        if self.broker.is_some() {
            self.discard_staged(&record_owner, key).await;
        }
        self.aggregates.flush_owner(&record_owner).await;
        Ok(())
    }

    /// Returns the short keys owned by `owner`, served from `list:<owner>` when cached.
    pub async fn list(&self, ctx: &RequestContext, owner: &str) -> Result<Vec<String>, AppError> {
        let key = list_key(owner);
        if let Some(keys) = self.cached::<Vec<String>>(&key).await {
            return Ok(keys);
        }

        match &self.broker {
            Some(broker) => broker.submit_read(ctx, owner, key).await,
            None => {
                let seen = self.aggregates.epoch(&key);
                let keys = ctx.run(self.store.list_owned(owner)).await?;
                self.aggregates
                    .populate(&key, &keys, self.list_ttl, seen)
                    .await;
                Ok(keys)
            }
        }
    }

    /// Returns every active link, served from `all:` when cached.
    pub async fn get_all(&self, ctx: &RequestContext) -> Result<Vec<Link>, AppError> {
        if let Some(links) = self.cached::<Vec<Link>>(ALL_KEY).await {
            return Ok(links);
        }

        let seen = self.aggregates.epoch(ALL_KEY);
        let links = ctx.run(self.store.list_all()).await?;
        self.aggregates
            .populate(ALL_KEY, &links, self.list_ttl, seen)
            .await;
        Ok(links)
    }

    /// Resolves a short key to its target, counting the redirect.
    ///
    /// Bypasses the cache. Only the global listing is invalidated since the
    /// owner's key set is unchanged.
    pub async fn resolve(&self, ctx: &RequestContext, short_key: &str) -> Result<String, AppError> {
        let target = ctx.run(self.store.resolve_and_increment(short_key)).await?;
        self.aggregates.flush_all().await;
        Ok(target)
    }

    pub async fn put_user(&self, ctx: &RequestContext, user: NewUser) -> Result<String, AppError> {
        ctx.run(self.store.put_user(user)).await
    }

    pub async fn get_user(&self, ctx: &RequestContext, uid: &str) -> Result<User, AppError> {
        ctx.run(self.store.get_user(uid)).await
    }

    pub async fn delete_user(&self, ctx: &RequestContext, uid: &str) -> Result<(), AppError> {
        ctx.run(self.store.delete_user(uid)).await
    }

    pub async fn list_users(&self, ctx: &RequestContext) -> Result<Vec<User>, AppError> {
        ctx.run(self.store.list_users()).await
    }

    pub async fn find_superuser(&self, ctx: &RequestContext) -> Result<Option<String>, AppError> {
        ctx.run(self.store.find_superuser()).await
    }

    /// Checks credentials and returns the user's uid.
    pub async fn authenticate(
        &self,
        ctx: &RequestContext,
        name: &str,
        password: &str,
    ) -> Result<String, AppError> {
        ctx.run(self.store.authenticate(name, password)).await
    }

    /// Stops the worker pool, draining queued tasks for up to `drain_timeout`.
    ///
    /// A no-op in cache-aside mode.
    pub async fn shutdown(&self, drain_timeout: Duration) -> ShutdownReport {
        match &self.pool {
            Some(pool) => pool.shutdown(drain_timeout).await,
            None => ShutdownReport::default(),
        }
    }

    /// Writes the payload of a pending write-behind to `staged:<owner>`.
    async fn stage(&self, owner: &str, key: &str, link: Link) -> Result<(), AppError> {
        let link = Link {
            short_key: key.to_string(),
            ..link
        };
        self.cache
            .set_json(&staged_key(owner), &link, self.staged_ttl)
            .await?;
        debug!(owner, key, "Staged write");
        Ok(())
    }

    /// Drops a staged write for `key` so a queued write-behind cannot revive a deleted link.
    async fn discard_staged(&self, owner: &str, key: &str) {
        let staged = staged_key(owner);
        let raw = match self.cache.get(&staged).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!(owner, error = %e, "Failed to read staged value");
                return;
            }
        };

        let matches = serde_json::from_str::<Link>(&raw).is_ok_and(|link| link.short_key == key);
        // Compare-and-delete so a Put staged meanwhile survives.
        if matches && let Err(e) = self.cache.delete_if_eq(&staged, &raw).await {
            warn!(owner, error = %e, "Failed to discard staged value");
        }
    }

    /// Reads and decodes a cached aggregate. Errors degrade to a miss.
    async fn cached<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned + Send,
    {
        match self.cache.get_json::<T>(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, falling back to store");
                None
            }
        }
    }
}
