mod common;

use std::sync::Arc;
use weblink::infrastructure::cache::keys::{ALL_KEY, list_key};
use weblink::prelude::*;

async fn setup() -> (
    CacheOrchestrator,
    Arc<FileLinkRepository>,
    Arc<MemoryCache>,
    tempfile::TempDir,
) {
    let (store, dir) = common::file_store().await;
    let cache = Arc::new(MemoryCache::new());
    let orchestrator = common::orchestrator(
        store.clone(),
        cache.clone(),
        common::settings(CacheMode::CacheAside),
    );
    (orchestrator, store, cache, dir)
}

#[tokio::test]
async fn test_put_then_list_contains_key() {
    let (orchestrator, _store, _cache, _dir) = setup().await;
    let ctx = RequestContext::background();

    orchestrator
        .put(&ctx, "u1", "abc", common::link("u1", "abc", "https://example.com"), false)
        .await
        .unwrap();

    let keys = orchestrator.list(&ctx, "u1").await.unwrap();
    assert_eq!(keys, vec!["abc"]);
}

#[tokio::test]
async fn test_cold_list_matches_store() {
    let (orchestrator, store, cache, _dir) = setup().await;
    let ctx = RequestContext::background();

    for key in ["a1", "b2", "c3"] {
        store
            .put("u1", key, common::link("u1", key, "https://example.com"), false)
            .await
            .unwrap();
    }
    store
        .put("u2", "zz", common::link("u2", "zz", "https://example.org"), false)
        .await
        .unwrap();

    let listed = orchestrator.list(&ctx, "u1").await.unwrap();

    assert_eq!(listed, store.list_owned("u1").await.unwrap());
    assert!(cache.exists(&list_key("u1")).await);
    assert!(!cache.exists(&list_key("u2")).await);
}

#[tokio::test]
async fn test_stale_list_is_flushed_by_put() {
    let (orchestrator, _store, cache, _dir) = setup().await;
    let ctx = RequestContext::background();

    assert!(orchestrator.list(&ctx, "u1").await.unwrap().is_empty());
    assert!(cache.exists(&list_key("u1")).await);

    orchestrator
        .put(&ctx, "u1", "abc", common::link("u1", "abc", "https://example.com"), false)
        .await
        .unwrap();

    assert!(!cache.exists(&list_key("u1")).await);
    assert_eq!(orchestrator.list(&ctx, "u1").await.unwrap(), vec!["abc"]);
}

#[tokio::test]
async fn test_delete_removes_key_from_list() {
    let (orchestrator, _store, _cache, _dir) = setup().await;
    let ctx = RequestContext::background();

    for key in ["abc", "def"] {
        orchestrator
            .put(&ctx, "u1", key, common::link("u1", key, "https://example.com"), false)
            .await
            .unwrap();
    }
    let mut before = orchestrator.list(&ctx, "u1").await.unwrap();
    before.sort();
    assert_eq!(before, vec!["abc", "def"]);

    orchestrator.delete(&ctx, "u1", "abc", false).await.unwrap();

    assert_eq!(orchestrator.list(&ctx, "u1").await.unwrap(), vec!["def"]);
    let err = orchestrator.get(&ctx, "u1", "abc", false).await.unwrap_err();
    assert!(err.is_deleted());
}

#[tokio::test]
async fn test_delete_of_missing_key_is_not_found() {
    let (orchestrator, _store, _cache, _dir) = setup().await;
    let ctx = RequestContext::background();

    let err = orchestrator.delete(&ctx, "u1", "nope", false).await.unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_resolve_counts_one_redirect() {
    let (orchestrator, _store, _cache, _dir) = setup().await;
    let ctx = RequestContext::background();

    orchestrator
        .put(&ctx, "u1", "abc", common::link("u1", "abc", "https://example.com"), false)
        .await
        .unwrap();

    let target = orchestrator.resolve(&ctx, "abc").await.unwrap();

    assert_eq!(target, "https://example.com");
    let link = orchestrator.get(&ctx, "u1", "abc", false).await.unwrap();
    assert_eq!(link.redirect_count, 1);
}

#[tokio::test]
async fn test_resolve_missing_and_deleted() {
    let (orchestrator, _store, _cache, _dir) = setup().await;
    let ctx = RequestContext::background();

    let missing = orchestrator.resolve(&ctx, "ghost").await.unwrap_err();
    assert!(missing.is_not_found());

    orchestrator
        .put(&ctx, "u1", "abc", common::link("u1", "abc", "https://example.com"), false)
        .await
        .unwrap();
    orchestrator.delete(&ctx, "u1", "abc", false).await.unwrap();

    let deleted = orchestrator.resolve(&ctx, "abc").await.unwrap_err();
    assert!(deleted.is_deleted());
}

#[tokio::test]
async fn test_get_all_reflects_writes_and_redirects() {
    let (orchestrator, _store, cache, _dir) = setup().await;
    let ctx = RequestContext::background();

    orchestrator
        .put(&ctx, "u1", "abc", common::link("u1", "abc", "https://example.com"), false)
        .await
        .unwrap();
    assert_eq!(orchestrator.get_all(&ctx).await.unwrap().len(), 1);
    assert!(cache.exists(ALL_KEY).await);

    orchestrator
        .put(&ctx, "u2", "xyz", common::link("u2", "xyz", "https://example.org"), false)
        .await
        .unwrap();
    orchestrator.resolve(&ctx, "xyz").await.unwrap();

    let all = orchestrator.get_all(&ctx).await.unwrap();
    assert_eq!(all.len(), 2);
    let xyz = all.iter().find(|l| l.short_key == "xyz").unwrap();
    assert_eq!(xyz.redirect_count, 1);
}

#[tokio::test]
async fn test_superuser_update_keeps_record_owner() {
    let (orchestrator, _store, _cache, _dir) = setup().await;
    let ctx = RequestContext::background();

    orchestrator
        .put(&ctx, "u1", "abc", common::link("u1", "abc", "https://example.com"), false)
        .await
        .unwrap();
    orchestrator
        .put(&ctx, "root", "abc", common::link("root", "abc", "https://example.net"), true)
        .await
        .unwrap();

    let link = orchestrator.get(&ctx, "u1", "abc", false).await.unwrap();
    assert_eq!(link.owner, "u1");
    assert_eq!(link.target, "https://example.net");
    assert!(orchestrator.list(&ctx, "root").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_accounts_pass_through() {
    let (orchestrator, _store, _cache, _dir) = setup().await;
    let ctx = RequestContext::background();

    let uid = orchestrator
        .put_user(
            &ctx,
            NewUser {
                name: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password: "s3cret".to_string(),
                role: UserRole::Superuser,
            },
        )
        .await
        .unwrap();

    assert_eq!(orchestrator.find_superuser(&ctx).await.unwrap(), Some(uid.clone()));
    assert_eq!(orchestrator.authenticate(&ctx, "alice", "s3cret").await.unwrap(), uid);
    assert!(orchestrator.authenticate(&ctx, "alice", "wrong").await.is_err());
    assert_eq!(orchestrator.list_users(&ctx).await.unwrap().len(), 1);

    orchestrator.delete_user(&ctx, &uid).await.unwrap();
    assert!(orchestrator.get_user(&ctx, &uid).await.is_err());
}
