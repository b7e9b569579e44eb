//! JSON flat-file implementation of the backing store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::entities::{Link, NewUser, User, UserRole, hash_secret, storage_key};
use crate::domain::repositories::{BackingStore, StoreKind};
use crate::error::StoreError;

/// On-disk document layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageDocument {
    #[serde(default)]
    data: Vec<Link>,
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Default)]
struct FileState {
    /// Indexed by `owner:short_key`.
    links: HashMap<String, Link>,
    /// Indexed by uid.
    users: HashMap<String, User>,
}

impl FileState {
    fn locate(&self, owner: &str, key: &str, superuser: bool) -> Option<String> {
        if superuser {
            return self
                .links
                .iter()
                .filter(|(_, link)| link.short_key == key)
                .max_by_key(|(_, link)| link.active)
                .map(|(k, _)| k.clone());
        }
        let k = storage_key(owner, key);
        self.links.contains_key(&k).then_some(k)
    }
}

/// Flat-file repository holding the whole store in memory.
///
/// Every mutation rewrites the file while the write lock is held and is
/// undone in memory if the rewrite fails. Soft-deleted links stay in memory
/// until restart but are not written out.
pub struct FileLinkRepository {
    path: PathBuf,
    state: RwLock<FileState>,
}

impl FileLinkRepository {
    /// Opens the store at `path`, loading it if the file exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read and
    /// [`StoreError::Encoding`] if it is not a valid storage document.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = Self::load(&path).await?;

        info!(
            "File store {} loaded: {} links, {} users",
            path.display(),
            state.links.len(),
            state.users.len()
        );

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    async fn load(path: &Path) -> Result<FileState, StoreError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileState::default()),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(FileState::default());
        }

        let document: StorageDocument = serde_json::from_str(&raw)?;
        Ok(FileState {
            links: document
                .data
                .into_iter()
                .map(|link| (link.storage_key(), link))
                .collect(),
            users: document
                .users
                .into_iter()
                .map(|user| (user.uid.clone(), user))
                .collect(),
        })
    }

    /// Writes the active part of `state` to disk via a temp file and rename.
    async fn persist(&self, state: &FileState) -> Result<(), StoreError> {
        let mut data: Vec<Link> = state
            .links
            .values()
            .filter(|link| link.active)
            .cloned()
            .collect();
        data.sort_by(|a, b| a.storage_key().cmp(&b.storage_key()));

        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.uid.cmp(&b.uid));

        let body = serde_json::to_vec_pretty(&StorageDocument { data, users })?;
        let tmp = self.path.with_extension("tmp");
        let written = match tokio::fs::write(&tmp, body).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                debug!("Leftover {} not removed: {}", tmp.display(), cleanup);
            }
            warn!("File store flush to {} failed: {}", self.path.display(), e);
            return Err(e.into());
        }

        debug!("File store flushed to {}", self.path.display());
        Ok(())
    }
}

fn sorted_keys(mut links: Vec<&Link>) -> Vec<String> {
    links.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.short_key.cmp(&b.short_key))
    });
    links.into_iter().map(|l| l.short_key.clone()).collect()
}

#[async_trait]
impl BackingStore for FileLinkRepository {
    async fn get(&self, owner: &str, key: &str, superuser: bool) -> Result<Link, StoreError> {
        let state = self.state.read().await;

        let link = state
            .locate(owner, key, superuser)
            .and_then(|k| state.links.get(&k))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if link.is_deleted() {
            return Err(StoreError::Deleted(key.to_string()));
        }
        Ok(link.clone())
    }

    async fn put(
        &self,
        owner: &str,
        key: &str,
        link: Link,
        superuser: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        // A superuser overwrites the existing record whoever owns it.
        let existing = if superuser {
            state
                .locate(owner, key, true)
                .and_then(|index| state.links.get(&index).map(|l| (index, l.owner.clone())))
        } else {
            None
        };
        let (index, record_owner) =
            existing.unwrap_or_else(|| (storage_key(owner, key), owner.to_string()));

        let previous = state.links.insert(
            index.clone(),
            Link {
                owner: record_owner,
                short_key: key.to_string(),
                ..link
            },
        );

        if let Err(e) = self.persist(&state).await {
            match previous {
                Some(previous) => state.links.insert(index, previous),
                None => state.links.remove(&index),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, owner: &str, key: &str, superuser: bool) -> Result<String, StoreError> {
        let mut state = self.state.write().await;

        let index = state
            .locate(owner, key, superuser)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let (record_owner, was_active) = match state.links.get_mut(&index) {
            Some(link) => (link.owner.clone(), std::mem::replace(&mut link.active, false)),
            None => return Err(StoreError::NotFound(key.to_string())),
        };

        if let Err(e) = self.persist(&state).await {
            if let Some(link) = state.links.get_mut(&index) {
                link.active = was_active;
            }
            return Err(e);
        }
        Ok(record_owner)
    }

    async fn list_owned(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;

        Ok(sorted_keys(
            state
                .links
                .values()
                .filter(|link| link.active && link.owner == owner)
                .collect(),
        ))
    }

    async fn list_all(&self) -> Result<Vec<Link>, StoreError> {
        let state = self.state.read().await;

        let mut links: Vec<Link> = state
            .links
            .values()
            .filter(|link| link.active)
            .cloned()
            .collect();
        links.sort_by(|a, b| a.storage_key().cmp(&b.storage_key()));
        Ok(links)
    }

    async fn resolve_and_increment(&self, short_key: &str) -> Result<String, StoreError> {
        let mut state = self.state.write().await;

        let index = state
            .locate("", short_key, true)
            .ok_or_else(|| StoreError::NotFound(short_key.to_string()))?;

        let target = match state.links.get_mut(&index) {
            Some(link) if link.is_deleted() => {
                return Err(StoreError::Deleted(short_key.to_string()));
            }
            Some(link) => {
                link.redirect_count += 1;
                link.target.clone()
            }
            None => return Err(StoreError::NotFound(short_key.to_string())),
        };

        if let Err(e) = self.persist(&state).await {
            if let Some(link) = state.links.get_mut(&index) {
                link.redirect_count -= 1;
            }
            return Err(e);
        }
        Ok(target)
    }

    async fn put_user(&self, user: NewUser) -> Result<String, StoreError> {
        let mut state = self.state.write().await;

        let mut record = user.into_user();
        let uid = record.uid.clone();
        if let Some(existing) = state.users.get(&uid) {
            record.created_at = existing.created_at;
        }
        let previous = state.users.insert(uid.clone(), record);

        if let Err(e) = self.persist(&state).await {
            match previous {
                Some(previous) => state.users.insert(uid, previous),
                None => state.users.remove(&uid),
            };
            return Err(e);
        }
        Ok(uid)
    }

    async fn get_user(&self, uid: &str) -> Result<User, StoreError> {
        let state = self.state.read().await;

        state
            .users
            .get(uid)
            .cloned()
            .ok_or_else(|| StoreError::UserNotFound(uid.to_string()))
    }

    async fn delete_user(&self, uid: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        let removed = state
            .users
            .remove(uid)
            .ok_or_else(|| StoreError::UserNotFound(uid.to_string()))?;

        if let Err(e) = self.persist(&state).await {
            state.users.insert(uid.to_string(), removed);
            return Err(e);
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let state = self.state.read().await;

        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn find_superuser(&self) -> Result<Option<String>, StoreError> {
        let state = self.state.read().await;

        Ok(state
            .users
            .values()
            .find(|u| u.role == UserRole::Superuser && u.active)
            .map(|u| u.uid.clone()))
    }

    async fn authenticate(&self, name: &str, password: &str) -> Result<String, StoreError> {
        let state = self.state.read().await;
        let hash = hash_secret(password);

        state
            .users
            .values()
            .find(|u| u.name == name && u.active && u.password_hash == hash)
            .map(|u| u.uid.clone())
            .ok_or_else(|| StoreError::Unauthorized(name.to_string()))
    }

    fn kind(&self) -> StoreKind {
        StoreKind::File
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, FileLinkRepository) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLinkRepository::open(dir.path().join("storage.json"))
            .await
            .unwrap();
        (dir, store)
    }

    fn new_user(name: &str, role: UserRole) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: format!("{}@example.com", name),
            password: "pw".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_dir, store) = open_store().await;

        store
            .put("u1", "abc", Link::new("u1", "abc", "https://example.com"), false)
            .await
            .unwrap();

        let link = store.get("u1", "abc", false).await.unwrap();
        assert_eq!(link.target, "https://example.com");
        assert_eq!(store.kind(), StoreKind::File);
    }

    #[tokio::test]
    async fn test_get_missing_and_deleted() {
        let (_dir, store) = open_store().await;

        let missing = store.get("u1", "nope", false).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));

        store
            .put("u1", "abc", Link::new("u1", "abc", "https://example.com"), false)
            .await
            .unwrap();
        let owner = store.delete("u1", "abc", false).await.unwrap();
        assert_eq!(owner, "u1");

        let deleted = store.get("u1", "abc", false).await;
        assert!(matches!(deleted, Err(StoreError::Deleted(_))));
    }

    #[tokio::test]
    async fn test_get_is_owner_scoped_unless_superuser() {
        let (_dir, store) = open_store().await;
        store
            .put("u1", "abc", Link::new("u1", "abc", "https://example.com"), false)
            .await
            .unwrap();

        assert!(store.get("u2", "abc", false).await.is_err());
        assert_eq!(store.get("root", "abc", true).await.unwrap().owner, "u1");
    }

    #[tokio::test]
    async fn test_superuser_delete_reports_real_owner() {
        let (_dir, store) = open_store().await;
        store
            .put("u1", "abc", Link::new("u1", "abc", "https://example.com"), false)
            .await
            .unwrap();

        let owner = store.delete("root", "abc", true).await.unwrap();

        assert_eq!(owner, "u1");
        assert!(store.list_owned("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let (_dir, store) = open_store().await;

        let result = store.delete("u1", "abc", false).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_owned_filters_owner_and_inactive() {
        let (_dir, store) = open_store().await;
        for (owner, key) in [("u1", "a"), ("u1", "b"), ("u2", "c")] {
            store
                .put(owner, key, Link::new(owner, key, "https://example.com"), false)
                .await
                .unwrap();
        }
        store.delete("u1", "b", false).await.unwrap();

        assert_eq!(store.list_owned("u1").await.unwrap(), vec!["a".to_string()]);
        assert_eq!(store.list_owned("u2").await.unwrap(), vec!["c".to_string()]);
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_and_increment() {
        let (_dir, store) = open_store().await;
        store
            .put("u1", "abc", Link::new("u1", "abc", "https://example.com"), false)
            .await
            .unwrap();

        let target = store.resolve_and_increment("abc").await.unwrap();
        assert_eq!(target, "https://example.com");
        assert_eq!(store.get("u1", "abc", false).await.unwrap().redirect_count, 1);

        let missing = store.resolve_and_increment("zzz").await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));

        store.delete("u1", "abc", false).await.unwrap();
        let deleted = store.resolve_and_increment("abc").await;
        assert!(matches!(deleted, Err(StoreError::Deleted(_))));
    }

    #[tokio::test]
    async fn test_concurrent_resolves_do_not_lose_updates() {
        let (_dir, store) = open_store().await;
        store
            .put("u1", "abc", Link::new("u1", "abc", "https://example.com"), false)
            .await
            .unwrap();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.resolve_and_increment("abc").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get("u1", "abc", false).await.unwrap().redirect_count, 20);
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_memory_unchanged() {
        let (dir, store) = open_store().await;
        store
            .put("u1", "abc", Link::new("u1", "abc", "https://example.com"), false)
            .await
            .unwrap();

        // A non-empty directory in place of the file makes every rename fail.
        let path = dir.path().join("storage.json");
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();
        tokio::fs::write(path.join("blocker"), "x").await.unwrap();

        assert!(matches!(
            store.resolve_and_increment("abc").await,
            Err(StoreError::Io(_))
        ));
        assert!(
            store
                .put("u1", "new", Link::new("u1", "new", "https://example.org"), false)
                .await
                .is_err()
        );
        assert!(store.delete("u1", "abc", false).await.is_err());
        assert!(store.put_user(new_user("alice", UserRole::User)).await.is_err());

        let link = store.get("u1", "abc", false).await.unwrap();
        assert_eq!(link.redirect_count, 0);
        assert!(link.active);
        assert_eq!(store.list_owned("u1").await.unwrap(), vec!["abc".to_string()]);
        assert!(store.list_users().await.unwrap().is_empty());
        assert!(!dir.path().join("storage.tmp").exists());
    }

    #[tokio::test]
    async fn test_reopen_keeps_active_links_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        {
            let store = FileLinkRepository::open(&path).await.unwrap();
            store
                .put("u1", "keep", Link::new("u1", "keep", "https://a.com"), false)
                .await
                .unwrap();
            store
                .put("u1", "drop", Link::new("u1", "drop", "https://b.com"), false)
                .await
                .unwrap();
            store.delete("u1", "drop", false).await.unwrap();
        }

        let reopened = FileLinkRepository::open(&path).await.unwrap();
        assert_eq!(
            reopened.list_owned("u1").await.unwrap(),
            vec!["keep".to_string()]
        );
        assert!(matches!(
            reopened.get("u1", "drop", false).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let result = FileLinkRepository::open(&path).await;
        assert!(matches!(result, Err(StoreError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_users() {
        let (_dir, store) = open_store().await;

        let root = store
            .put_user(new_user("root", UserRole::Superuser))
            .await
            .unwrap();
        let alice = store.put_user(new_user("alice", UserRole::User)).await.unwrap();

        assert_eq!(store.find_superuser().await.unwrap(), Some(root.clone()));
        assert_eq!(store.authenticate("alice", "pw").await.unwrap(), alice);
        assert!(matches!(
            store.authenticate("alice", "wrong").await,
            Err(StoreError::Unauthorized(_))
        ));

        let names: Vec<String> = store
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["alice".to_string(), "root".to_string()]);

        store.delete_user(&alice).await.unwrap();
        assert!(matches!(
            store.get_user(&alice).await,
            Err(StoreError::UserNotFound(_))
        ));
    }
}
