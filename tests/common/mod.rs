#![allow(dead_code)]

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};
use weblink::infrastructure::cache::CacheResult;
use weblink::prelude::*;

/// Flat-file store in a fresh temporary directory.
///
/// The directory lives as long as the returned guard.
pub async fn file_store() -> (Arc<FileLinkRepository>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileLinkRepository::open(dir.path().join("storage.json"))
        .await
        .unwrap();
    (Arc::new(store), dir)
}

pub fn settings(mode: CacheMode) -> OrchestratorSettings {
    OrchestratorSettings {
        mode,
        workers: 2,
        ..OrchestratorSettings::default()
    }
}

pub fn orchestrator(
    store: Arc<dyn BackingStore>,
    cache: Arc<dyn CacheStore>,
    settings: OrchestratorSettings,
) -> CacheOrchestrator {
    CacheOrchestrator::new(store, cache, settings)
}

pub fn link(owner: &str, key: &str, target: &str) -> Link {
    Link::new(owner, key, target)
}

/// Polls `check` until it returns true or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Where a [`GatedCache`] parks its callers.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Reads of `staged:` keys, before a worker picks up its payload.
    StagedRead,
    /// The conditional delete of a `staged:` key after a commit.
    StagedCleanup,
}

/// In-process cache that blocks one kind of `staged:` access until
/// [`open`](Self::open).
pub struct GatedCache {
    inner: MemoryCache,
    gate_on: Gate,
    pub entered: Notify,
    gate: Semaphore,
}

impl GatedCache {
    pub fn new() -> Self {
        Self::gated_on(Gate::StagedRead)
    }

    pub fn gated_on(gate_on: Gate) -> Self {
        Self {
            inner: MemoryCache::new(),
            gate_on,
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    async fn pass(&self, at: Gate, key: &str) {
        if at == self.gate_on && key.starts_with("staged:") {
            self.entered.notify_one();
            let _permit = self.gate.acquire().await;
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl CacheStore for GatedCache {
    async fn exists(&self, key: &str) -> bool {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.pass(Gate::StagedRead, key).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.inner.delete(key).await
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> CacheResult<bool> {
        self.pass(Gate::StagedCleanup, key).await;
        self.inner.delete_if_eq(key, expected).await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}

/// Backing store whose `list_owned` parks after reading until released.
pub struct GatedStore {
    inner: Arc<dyn BackingStore>,
    pub entered: Notify,
    gate: Semaphore,
}

impl GatedStore {
    pub fn new(inner: Arc<dyn BackingStore>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl BackingStore for GatedStore {
    async fn get(&self, owner: &str, key: &str, superuser: bool) -> Result<Link, StoreError> {
        self.inner.get(owner, key, superuser).await
    }

    async fn put(
        &self,
        owner: &str,
        key: &str,
        link: Link,
        superuser: bool,
    ) -> Result<(), StoreError> {
        self.inner.put(owner, key, link, superuser).await
    }

    async fn delete(&self, owner: &str, key: &str, superuser: bool) -> Result<String, StoreError> {
        self.inner.delete(owner, key, superuser).await
    }

    async fn list_owned(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let keys = self.inner.list_owned(owner).await;
        self.entered.notify_one();
        let _permit = self.gate.acquire().await;
        keys
    }

    async fn list_all(&self) -> Result<Vec<Link>, StoreError> {
        self.inner.list_all().await
    }

    async fn resolve_and_increment(&self, short_key: &str) -> Result<String, StoreError> {
        self.inner.resolve_and_increment(short_key).await
    }

    async fn put_user(&self, user: NewUser) -> Result<String, StoreError> {
        self.inner.put_user(user).await
    }

    async fn get_user(&self, uid: &str) -> Result<User, StoreError> {
        self.inner.get_user(uid).await
    }

    async fn delete_user(&self, uid: &str) -> Result<(), StoreError> {
        self.inner.delete_user(uid).await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.inner.list_users().await
    }

    async fn find_superuser(&self) -> Result<Option<String>, StoreError> {
        self.inner.find_superuser().await
    }

    async fn authenticate(&self, name: &str, password: &str) -> Result<String, StoreError> {
        self.inner.authenticate(name, password).await
    }

    fn kind(&self) -> StoreKind {
        self.inner.kind()
    }
}
