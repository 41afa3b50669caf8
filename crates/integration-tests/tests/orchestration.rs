//! Request coalescing and invalidate-after-mutation, observed through the
//! mock gateway's call counters.

use listly_client::cache::{CacheKey, CacheValue};
use listly_client::gateway::Table;
use listly_client::ops;
use listly_integration_tests::TestApp;

#[tokio::test]
async fn test_concurrent_readers_share_one_fetch() {
    let app = TestApp::new();
    let session = app.sign_up("ada@example.com").await;
    app.gateway
        .seed_list(session.user_id, &session.email, "Groceries");

    // Stall the backend, pile readers onto the same key, then release.
    let gate = app.gateway.pause_reads().await;
    let mut readers = Vec::new();
    for _ in 0..5 {
        let ctx = app.ctx.clone();
        readers.push(tokio::spawn(
            async move { ops::lists::fetch(&ctx).await },
        ));
    }
    // Let every reader reach its await point before the backend unblocks.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    drop(gate);

    for reader in readers {
        let state = reader.await.expect("reader task");
        let Some(CacheValue::Lists(lists)) = state.value else {
            panic!("reader got no list data: {state:?}");
        };
        assert_eq!(lists.len(), 1);
    }
    assert_eq!(
        app.gateway.select_count(Table::Lists),
        1,
        "five concurrent readers must coalesce onto one select"
    );
}

#[tokio::test]
async fn test_fresh_cache_hit_issues_no_fetch() {
    let app = TestApp::new();
    let session = app.sign_up("ada@example.com").await;
    app.gateway
        .seed_list(session.user_id, &session.email, "Groceries");

    ops::lists::fetch(&app.ctx).await;
    ops::lists::fetch(&app.ctx).await;

    assert_eq!(
        app.gateway.select_count(Table::Lists),
        1,
        "a fresh entry must be served without a refetch"
    );
}

#[tokio::test]
async fn test_mutation_invalidates_exactly_once() {
    let app = TestApp::new();
    let session = app.sign_up("ada@example.com").await;
    let list_id = app
        .gateway
        .seed_list(session.user_id, &session.email, "Groceries");

    ops::lists::fetch(&app.ctx).await;
    assert_eq!(app.gateway.select_count(Table::Lists), 1);

    ops::lists::rename(&app.ctx, list_id, "Weekly groceries")
        .await
        .expect("rename");

    // The rename marked the entry stale; the next read refetches once.
    let state = ops::lists::fetch(&app.ctx).await;
    assert_eq!(app.gateway.select_count(Table::Lists), 2);

    let Some(CacheValue::Lists(lists)) = state.value else {
        panic!("no list data after rename");
    };
    assert_eq!(lists[0].name, "Weekly groceries");
}

#[tokio::test]
async fn test_failed_mutation_leaves_cache_untouched() {
    let app = TestApp::new();
    let session = app.sign_up("ada@example.com").await;
    let list_id = app
        .gateway
        .seed_list(session.user_id, &session.email, "Groceries");

    ops::lists::fetch(&app.ctx).await;

    let err = ops::lists::rename(&app.ctx, list_id, "   ")
        .await
        .expect_err("blank name must fail validation");
    assert!(err.is_validation());

    let entry = app
        .ctx
        .cache()
        .get(&CacheKey::Lists {
            user: session.user_id,
        })
        .await
        .expect("entry still cached");
    assert!(!entry.stale, "failed mutation must not invalidate");
    assert_eq!(app.gateway.select_count(Table::Lists), 1);
}

#[tokio::test]
async fn test_fetch_failure_keeps_previous_value() {
    let app = TestApp::new();
    let session = app.sign_up("ada@example.com").await;
    let list_id = app
        .gateway
        .seed_list(session.user_id, &session.email, "Groceries");

    ops::lists::fetch(&app.ctx).await;
    ops::lists::rename(&app.ctx, list_id, "Weekly")
        .await
        .expect("rename");

    app.gateway.fail_next_select(Table::Lists, "backend down");
    let state = ops::lists::fetch(&app.ctx).await;

    assert!(state.value.is_some(), "stale data must survive a failed refetch");
    let error = state.error.expect("error recorded");
    assert!(error.contains("backend down"), "got: {error}");

    // Recovery: the next read succeeds and clears the error.
    let state = ops::lists::fetch(&app.ctx).await;
    assert!(state.error.is_none());
}
