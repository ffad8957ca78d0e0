//! Order change intake and realtime fan-out.
//!
//! Services publish [`Event`]s through an mpsc [`EventSender`]; the spawned
//! [`process_events`] task flattens them into [`OrderChange`] notifications on
//! a broadcast [`ChangeFeed`]. Viewers (kitchen display, admin table,
//! tracking page, SSE streams) hold a filtered [`Subscription`] handle; the
//! handle's slot is released when it is dropped, on every exit path.
//!
//! Delivery is best-effort while a subscription is live. There is no backlog:
//! a receiver that lags past the feed capacity gets a single
//! [`FeedSignal::Refetch`] and is expected to reload its snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::OrderStatus;

/// Events emitted by the order service after a durable write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        created_at: DateTime<Utc>,
    },
    OrderStatusChanged {
        order_id: Uuid,
        order_number: String,
        old_status: OrderStatus,
        new_status: OrderStatus,
        changed_at: DateTime<Utc>,
    },
}

/// What subscribers receive: enough to decide whether to refetch, no row
/// diffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderChange {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    /// Server timestamp of the write. Viewers apply last-writer-wins on this,
    /// not on arrival order.
    pub changed_at: DateTime<Utc>,
    /// True for the creation notification, so the kitchen display can play
    /// its new-order cue without diffing.
    pub is_new_order: bool,
}

impl Event {
    fn into_change(self) -> OrderChange {
        match self {
            Event::OrderCreated {
                order_id,
                order_number,
                created_at,
            } => OrderChange {
                order_id,
                order_number,
                status: OrderStatus::Pending,
                changed_at: created_at,
                is_new_order: true,
            },
            Event::OrderStatusChanged {
                order_id,
                order_number,
                new_status,
                changed_at,
                ..
            } => OrderChange {
                order_id,
                order_number,
                status: new_status,
                changed_at,
                is_new_order: false,
            },
        }
    }
}

/// Write half of the event intake channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }
}

/// Which changes a subscriber wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionFilter {
    /// One order, by id (the tracking page).
    Order(Uuid),
    /// Any order whose status is in the active set (the kitchen display).
    ActiveOrders,
    /// Everything (the admin table).
    All,
}

impl SubscriptionFilter {
    fn matches(&self, change: &OrderChange) -> bool {
        match self {
            SubscriptionFilter::Order(id) => change.order_id == *id,
            // A transition OUT of the active set still matters to the
            // kitchen: the card has to disappear.
            SubscriptionFilter::ActiveOrders => true,
            SubscriptionFilter::All => true,
        }
    }
}

/// Broadcast fan-out of order changes.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<OrderChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes a change to all live subscribers. Having no subscribers is
    /// not an error.
    pub fn publish(&self, change: OrderChange) {
        let receivers = self.tx.receiver_count();
        if self.tx.send(change).is_err() {
            debug!("change published with no subscribers");
        } else {
            debug!(receivers, "change published");
        }
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

/// What a subscriber observes on its next `recv`.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedSignal {
    Changed(OrderChange),
    /// The subscriber lagged past the feed capacity; missed deltas are gone
    /// and it must reload its snapshot.
    Refetch,
}

/// A live, filtered view of the change feed.
///
/// Dropping the subscription releases its broadcast slot; there is no
/// manual unsubscribe to forget on an early-return path.
pub struct Subscription {
    rx: broadcast::Receiver<OrderChange>,
    filter: SubscriptionFilter,
}

impl Subscription {
    /// Waits for the next matching change. Returns `None` once the feed
    /// shuts down.
    pub async fn recv(&mut self) -> Option<FeedSignal> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.filter.matches(&change) => {
                    return Some(FeedSignal::Changed(change))
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged behind the change feed");
                    return Some(FeedSignal::Refetch);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Forwards intake events onto the change feed. Spawned once at startup.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, feed: ChangeFeed) {
    info!("Event processor started");
    while let Some(event) = rx.recv().await {
        debug!(?event, "processing event");
        feed.publish(event.into_change());
    }
    info!("Event processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(order_id: Uuid, status: OrderStatus) -> OrderChange {
        OrderChange {
            order_id,
            order_number: "REL-00000001".to_string(),
            status,
            changed_at: Utc::now(),
            is_new_order: false,
        }
    }

    #[tokio::test]
    async fn order_filter_skips_other_orders() {
        let feed = ChangeFeed::new(16);
        let target = Uuid::new_v4();
        let mut sub = feed.subscribe(SubscriptionFilter::Order(target));

        feed.publish(change(Uuid::new_v4(), OrderStatus::Preparing));
        feed.publish(change(target, OrderStatus::Preparing));

        match sub.recv().await {
            Some(FeedSignal::Changed(c)) => assert_eq!(c.order_id, target),
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lagged_subscriber_gets_refetch_signal() {
        let feed = ChangeFeed::new(1);
        let mut sub = feed.subscribe(SubscriptionFilter::All);

        for _ in 0..4 {
            feed.publish(change(Uuid::new_v4(), OrderStatus::Pending));
        }

        assert_eq!(sub.recv().await, Some(FeedSignal::Refetch));
    }

    #[tokio::test]
    async fn intake_events_reach_subscribers() {
        let feed = ChangeFeed::new(16);
        let (tx, rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        tokio::spawn(process_events(rx, feed.clone()));

        let mut sub = feed.subscribe(SubscriptionFilter::All);
        let order_id = Uuid::new_v4();
        sender
            .send(Event::OrderCreated {
                order_id,
                order_number: "REL-12345678".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        match sub.recv().await {
            Some(FeedSignal::Changed(c)) => {
                assert_eq!(c.order_id, order_id);
                assert!(c.is_new_order);
                assert_eq!(c.status, OrderStatus::Pending);
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }
}
