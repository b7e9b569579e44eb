//! PostgreSQL implementation of the backing store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;

use crate::domain::entities::{Link, NewUser, User, UserRole, hash_secret};
use crate::domain::repositories::{BackingStore, StoreKind};
use crate::error::StoreError;

#[derive(FromRow)]
struct LinkRow {
    owner: String,
    short_key: String,
    target: String,
    created_at: DateTime<Utc>,
    is_active: bool,
    redirect_count: i64,
}

impl From<LinkRow> for Link {
    fn from(row: LinkRow) -> Self {
        Link {
            owner: row.owner,
            short_key: row.short_key,
            target: row.target,
            created_at: row.created_at,
            active: row.is_active,
            redirect_count: u64::try_from(row.redirect_count).unwrap_or(0),
        }
    }
}

#[derive(FromRow)]
struct UserRow {
    uid: String,
    name: String,
    email: String,
    password_hash: String,
    user_role: String,
    created_at: DateTime<Utc>,
    is_active: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            uid: row.uid,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: UserRole::parse(&row.user_role).unwrap_or(UserRole::User),
            created_at: row.created_at,
            active: row.is_active,
        }
    }
}

const LINK_COLUMNS: &str = "owner, short_key, target, created_at, is_active, redirect_count";
const USER_COLUMNS: &str = "uid, name, email, password_hash, user_role, created_at, is_active";

/// PostgreSQL repository for links and accounts.
///
/// Uses runtime-checked SQLx statements with bound parameters.
pub struct PgLinkRepository {
    pool: Arc<PgPool>,
}

impl PgLinkRepository {
    /// Creates a new repository with a database connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Owner of the record a superuser operation on `key` applies to.
    async fn owner_of(&self, key: &str) -> Result<Option<String>, StoreError> {
        let owner = sqlx::query_scalar::<_, String>(
            "SELECT owner FROM links WHERE short_key = $1 ORDER BY is_active DESC, id LIMIT 1",
        )
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(owner)
    }
}

#[async_trait]
impl BackingStore for PgLinkRepository {
    async fn get(&self, owner: &str, key: &str, superuser: bool) -> Result<Link, StoreError> {
        let row = if superuser {
            sqlx::query_as::<_, LinkRow>(&format!(
                "SELECT {LINK_COLUMNS} FROM links WHERE short_key = $1 \
                 ORDER BY is_active DESC, id LIMIT 1"
            ))
            .bind(key)
            .fetch_optional(self.pool.as_ref())
            .await?
        } else {
            sqlx::query_as::<_, LinkRow>(&format!(
                "SELECT {LINK_COLUMNS} FROM links WHERE owner = $1 AND short_key = $2"
            ))
            .bind(owner)
            .bind(key)
            .fetch_optional(self.pool.as_ref())
            .await?
        };

        let link: Link = row
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?
            .into();
        if link.is_deleted() {
            return Err(StoreError::Deleted(key.to_string()));
        }
        Ok(link)
    }

    async fn put(
        &self,
        owner: &str,
        key: &str,
        link: Link,
        superuser: bool,
    ) -> Result<(), StoreError> {
        let record_owner = match superuser {
            true => self.owner_of(key).await?.unwrap_or_else(|| owner.to_string()),
            false => owner.to_string(),
        };

        sqlx::query(
            r#"
        INSERT INTO links (owner, short_key, target, created_at, is_active, redirect_count)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT ON CONSTRAINT links_owner_short_key_key
        DO UPDATE SET target = excluded.target,
                      created_at = excluded.created_at,
                      is_active = excluded.is_active,
                      redirect_count = excluded.redirect_count
        "#,
        )
        .bind(&record_owner)
        .bind(key)
        .bind(&link.target)
        .bind(link.created_at)
        .bind(link.active)
        .bind(i64::try_from(link.redirect_count).unwrap_or(i64::MAX))
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn delete(&self, owner: &str, key: &str, superuser: bool) -> Result<String, StoreError> {
        let deleted = if superuser {
            sqlx::query_scalar::<_, String>(
                r#"
            UPDATE links SET is_active = FALSE
            WHERE id = (SELECT id FROM links WHERE short_key = $1
                        ORDER BY is_active DESC, id LIMIT 1)
            RETURNING owner
            "#,
            )
            .bind(key)
            .fetch_optional(self.pool.as_ref())
            .await?
        } else {
            sqlx::query_scalar::<_, String>(
                "UPDATE links SET is_active = FALSE WHERE owner = $1 AND short_key = $2 RETURNING owner",
            )
            .bind(owner)
            .bind(key)
            .fetch_optional(self.pool.as_ref())
            .await?
        };

        deleted.ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list_owned(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT short_key FROM links WHERE owner = $1 AND is_active \
             ORDER BY created_at, short_key",
        )
        .bind(owner)
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(keys)
    }

    async fn list_all(&self) -> Result<Vec<Link>, StoreError> {
        let rows = sqlx::query_as::<_, LinkRow>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE is_active ORDER BY owner, short_key"
        ))
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(rows.into_iter().map(Link::from).collect())
    }

    async fn resolve_and_increment(&self, short_key: &str) -> Result<String, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The row lock serialises concurrent increments of the same link.
        let row = sqlx::query_as::<_, (i64, String, bool)>(
            "SELECT id, target, is_active FROM links WHERE short_key = $1 \
             ORDER BY is_active DESC, id LIMIT 1 FOR UPDATE",
        )
        .bind(short_key)
        .fetch_optional(&mut *tx)
        .await?;

        let (id, target) = match row {
            None => return Err(StoreError::NotFound(short_key.to_string())),
            Some((_, _, false)) => return Err(StoreError::Deleted(short_key.to_string())),
            Some((id, target, true)) => (id, target),
        };

        sqlx::query("UPDATE links SET redirect_count = redirect_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(target)
    }

    async fn put_user(&self, user: NewUser) -> Result<String, StoreError> {
        let user = user.into_user();

        let uid = sqlx::query_scalar::<_, String>(
            r#"
        INSERT INTO users (uid, name, email, password_hash, user_role, created_at, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (uid)
        DO UPDATE SET name = excluded.name,
                      email = excluded.email,
                      password_hash = excluded.password_hash,
                      user_role = excluded.user_role
        RETURNING uid
        "#,
        )
        .bind(&user.uid)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.active)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(uid)
    }

    async fn get_user(&self, uid: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE uid = $1"))
            .bind(uid)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(User::from)
            .ok_or_else(|| StoreError::UserNotFound(uid.to_string()))
    }

    async fn delete_user(&self, uid: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE uid = $1")
            .bind(uid)
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UserNotFound(uid.to_string()));
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows =
            sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY name"))
                .fetch_all(self.pool.as_ref())
                .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn find_superuser(&self) -> Result<Option<String>, StoreError> {
        let uid = sqlx::query_scalar::<_, String>(
            "SELECT uid FROM users WHERE user_role = $1 AND is_active ORDER BY created_at LIMIT 1",
        )
        .bind(UserRole::Superuser.as_str())
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(uid)
    }

    async fn authenticate(&self, name: &str, password: &str) -> Result<String, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT uid FROM users WHERE name = $1 AND password_hash = $2 AND is_active",
        )
        .bind(name)
        .bind(hash_secret(password))
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or_else(|| StoreError::Unauthorized(name.to_string()))
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Postgres
    }
}
