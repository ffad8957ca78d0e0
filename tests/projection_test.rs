mod common;

use assert_matches::assert_matches;
use tokio::time::{timeout, Duration};

use chrono::Utc;
use uuid::Uuid;

use rellenitas_api::errors::ServiceError;
use rellenitas_api::events::{ChangeFeed, FeedSignal, OrderChange, SubscriptionFilter};
use rellenitas_api::models::OrderStatus;
use rellenitas_api::services::projections::LiveFeed;

use common::{admin, order_request, TestApp};

#[tokio::test]
async fn kitchen_queue_is_fifo_and_active_only() {
    let app = TestApp::new().await;
    let boss = admin();

    let first = app.orders.create_order(order_request(None)).await.unwrap();
    let second = app.orders.create_order(order_request(None)).await.unwrap();
    let third = app.orders.create_order(order_request(None)).await.unwrap();

    // Cancel one; walk another all the way to delivered.
    app.orders
        .update_status(second.order.id, OrderStatus::Cancelled, &boss, None, None)
        .await
        .unwrap();
    for step in [
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::InDelivery,
        OrderStatus::Delivered,
    ] {
        app.orders
            .update_status(third.order.id, step, &boss, None, None)
            .await
            .unwrap();
    }

    let queue = app.projections.kitchen_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].order.id, first.order.id);
    assert_eq!(queue[0].status, OrderStatus::Pending);
    // The one-tap target.
    assert_eq!(queue[0].next_status, Some(OrderStatus::Preparing));
    assert_eq!(queue[0].items.len(), 2);
}

#[tokio::test]
async fn kitchen_queue_keeps_oldest_first() {
    let app = TestApp::new().await;

    let first = app.orders.create_order(order_request(None)).await.unwrap();
    let second = app.orders.create_order(order_request(None)).await.unwrap();

    let queue = app.projections.kitchen_queue().await.unwrap();
    let ids: Vec<_> = queue.iter().map(|t| t.order.id).collect();
    assert_eq!(ids, vec![first.order.id, second.order.id]);
}

#[tokio::test]
async fn admin_table_filters_by_status_newest_first() {
    let app = TestApp::new().await;
    let boss = admin();

    let first = app.orders.create_order(order_request(None)).await.unwrap();
    let second = app.orders.create_order(order_request(None)).await.unwrap();
    app.orders
        .update_status(second.order.id, OrderStatus::Preparing, &boss, None, None)
        .await
        .unwrap();

    let page = app.projections.admin_table(None, 1, 25).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.rows[0].order.id, second.order.id);
    assert_eq!(page.rows[1].order.id, first.order.id);

    let filtered = app
        .projections
        .admin_table(Some(OrderStatus::Preparing), 1, 25)
        .await
        .unwrap();
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.rows[0].order.id, second.order.id);
    assert_eq!(filtered.rows[0].status, OrderStatus::Preparing);
}

#[tokio::test]
async fn tracking_view_reflects_progress() {
    let app = TestApp::new().await;
    let boss = admin();

    let detail = app.orders.create_order(order_request(None)).await.unwrap();
    for step in [OrderStatus::Preparing, OrderStatus::Ready] {
        app.orders
            .update_status(detail.order.id, step, &boss, None, None)
            .await
            .unwrap();
    }

    let view = app
        .projections
        .tracking(&detail.order.order_number)
        .await
        .unwrap();
    assert_eq!(view.status, OrderStatus::Ready);
    assert_eq!(view.step, Some(2));
    assert_eq!(view.total_steps, 5);
    assert!(!view.cancelled);

    let reached: Vec<bool> = view.steps.iter().map(|s| s.reached).collect();
    assert_eq!(reached, vec![true, true, true, false, false]);

    // Newest first.
    assert_eq!(view.history.len(), 3);
    assert_eq!(view.history[0].status, OrderStatus::Ready);
    assert_eq!(view.history[2].status, OrderStatus::Pending);
}

#[tokio::test]
async fn tracking_a_cancelled_order_has_no_step() {
    let app = TestApp::new().await;

    let detail = app.orders.create_order(order_request(None)).await.unwrap();
    app.orders
        .update_status(detail.order.id, OrderStatus::Cancelled, &admin(), None, None)
        .await
        .unwrap();

    let view = app
        .projections
        .tracking(&detail.order.order_number)
        .await
        .unwrap();
    assert!(view.cancelled);
    assert_eq!(view.step, None);
}

#[tokio::test]
async fn tracking_an_unknown_number_is_not_found() {
    let app = TestApp::new().await;
    let result = app.projections.tracking("REL-99999999").await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn tracking_normalizes_the_typed_number() {
    let app = TestApp::new().await;
    let detail = app.orders.create_order(order_request(None)).await.unwrap();

    let typed = format!("  {}  ", detail.order.order_number.to_lowercase());
    let view = app.projections.tracking(&typed).await.unwrap();
    assert_eq!(view.order_id, detail.order.id);
}

#[tokio::test]
async fn live_feed_drops_changes_older_than_the_last_forwarded() {
    let feed = ChangeFeed::new(16);
    let mut live = LiveFeed::new(feed.subscribe(SubscriptionFilter::All));

    let id = Uuid::new_v4();
    let now = Utc::now();
    let change = |status, at| OrderChange {
        order_id: id,
        order_number: "REL-00000001".to_string(),
        status,
        changed_at: at,
        is_new_order: false,
    };

    feed.publish(change(OrderStatus::Ready, now + chrono::Duration::seconds(10)));
    // An older write straggles in after the newer one.
    feed.publish(change(OrderStatus::Preparing, now));
    feed.publish(change(
        OrderStatus::InDelivery,
        now + chrono::Duration::seconds(20),
    ));

    match live.next().await {
        Some(FeedSignal::Changed(c)) => assert_eq!(c.status, OrderStatus::Ready),
        other => panic!("unexpected signal: {other:?}"),
    }
    // The straggler never surfaces.
    match live.next().await {
        Some(FeedSignal::Changed(c)) => assert_eq!(c.status, OrderStatus::InDelivery),
        other => panic!("unexpected signal: {other:?}"),
    }
}

#[tokio::test]
async fn status_changes_reach_a_filtered_subscription() {
    let app = TestApp::new().await;
    let boss = admin();

    let detail = app.orders.create_order(order_request(None)).await.unwrap();
    let other = app.orders.create_order(order_request(None)).await.unwrap();

    let mut sub = app
        .feed
        .subscribe(SubscriptionFilter::Order(detail.order.id));

    // Noise on another order must not surface.
    app.orders
        .update_status(other.order.id, OrderStatus::Preparing, &boss, None, None)
        .await
        .unwrap();
    app.orders
        .update_status(detail.order.id, OrderStatus::Preparing, &boss, None, None)
        .await
        .unwrap();

    let signal = timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("a change within the deadline")
        .expect("feed still open");
    match signal {
        FeedSignal::Changed(change) => {
            assert_eq!(change.order_id, detail.order.id);
            assert_eq!(change.status, OrderStatus::Preparing);
            assert!(!change.is_new_order);
        }
        FeedSignal::Refetch => panic!("unexpected refetch"),
    }
}
