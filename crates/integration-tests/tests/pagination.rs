//! Page boundary behavior: a short page ends pagination, a full page keeps
//! it open, and the exact-multiple case costs one extra empty fetch.

use listly_client::gateway::Table;
use listly_client::ops;
use listly_integration_tests::TestApp;

#[tokio::test]
async fn test_short_final_page_ends_pagination() {
    let app = TestApp::with_page_size(20);
    let session = app.sign_up("ada@example.com").await;
    let list_id = app
        .gateway
        .seed_list(session.user_id, &session.email, "Groceries");
    app.gateway.seed_items(list_id, 45);

    let mut query = ops::items::paginated(&app.ctx, list_id);

    assert_eq!(query.fetch_next_page().await, 20);
    assert!(query.has_next_page());
    assert_eq!(query.fetch_next_page().await, 20);
    assert!(query.has_next_page());
    assert_eq!(query.fetch_next_page().await, 5);
    assert!(!query.has_next_page(), "a short page is the last page");

    assert_eq!(query.fetch_next_page().await, 0, "no speculative fetch past the end");
    assert_eq!(app.gateway.select_count(Table::Items), 3);
    assert_eq!(query.items().len(), 45);
}

#[tokio::test]
async fn test_exact_multiple_needs_one_empty_page() {
    let app = TestApp::with_page_size(20);
    let session = app.sign_up("ada@example.com").await;
    let list_id = app
        .gateway
        .seed_list(session.user_id, &session.email, "Groceries");
    app.gateway.seed_items(list_id, 40);

    let mut query = ops::items::paginated(&app.ctx, list_id);

    assert_eq!(query.fetch_next_page().await, 20);
    assert_eq!(query.fetch_next_page().await, 20);
    assert!(
        query.has_next_page(),
        "a full page cannot prove the collection ended"
    );
    assert_eq!(query.fetch_next_page().await, 0);
    assert!(!query.has_next_page());
    assert_eq!(query.items().len(), 40);
}

#[tokio::test]
async fn test_items_arrive_in_position_order_across_pages() {
    let app = TestApp::with_page_size(10);
    let session = app.sign_up("ada@example.com").await;
    let list_id = app
        .gateway
        .seed_list(session.user_id, &session.email, "Groceries");
    app.gateway.seed_items(list_id, 25);

    let mut query = ops::items::paginated(&app.ctx, list_id);
    while query.has_next_page() {
        query.fetch_next_page().await;
        assert!(query.last_error().is_none());
    }

    let positions: Vec<i32> = query.items().iter().map(|item| item.position).collect();
    let expected: Vec<i32> = (0..25).collect();
    assert_eq!(positions, expected);
}

#[tokio::test]
async fn test_page_fetch_failure_is_recoverable() {
    let app = TestApp::with_page_size(10);
    let session = app.sign_up("ada@example.com").await;
    let list_id = app
        .gateway
        .seed_list(session.user_id, &session.email, "Groceries");
    app.gateway.seed_items(list_id, 15);

    let mut query = ops::items::paginated(&app.ctx, list_id);
    assert_eq!(query.fetch_next_page().await, 10);

    app.gateway.fail_next_select(Table::Items, "backend down");
    assert_eq!(query.fetch_next_page().await, 0);
    assert!(query.last_error().is_some());
    assert!(query.has_next_page(), "a failed fetch does not end pagination");

    assert_eq!(query.fetch_next_page().await, 5);
    assert!(query.last_error().is_none());
    assert_eq!(query.items().len(), 15);
}
