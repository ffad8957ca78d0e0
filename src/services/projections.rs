//! The three read models over the same order data.
//!
//! Kitchen queue, admin table and customer tracking each fetch their own
//! slice and ordering; none of them redeclares the state graph, everything
//! renders from [`crate::models::OrderStatus`]. On a change signal a viewer
//! refetches its whole filtered set; there is no incremental row patching.

use std::collections::HashMap;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use uuid::Uuid;

use crate::db;
use crate::entities::order::{self, Entity as OrderEntity, Model as OrderModel};
use crate::entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel};
use crate::entities::order_status_history::{self, Entity as HistoryEntity};
use crate::errors::ServiceError;
use crate::events::{FeedSignal, OrderChange, Subscription};
use crate::models::{parse_status, OrderStatus, ACTIVE_STATUSES, FORWARD_SEQUENCE};

/// One card on the kitchen display.
#[derive(Debug, Clone, Serialize)]
pub struct KitchenTicket {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
    pub status: OrderStatus,
    /// The single tap target: the next forward step, absent for
    /// `in_delivery → delivered` handled the same way.
    pub next_status: Option<OrderStatus>,
}

/// One row of the admin table.
#[derive(Debug, Clone, Serialize)]
pub struct AdminOrderRow {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct AdminOrderPage {
    pub rows: Vec<AdminOrderRow>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingStep {
    pub status: OrderStatus,
    pub label: &'static str,
    pub reached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub label: &'static str,
    pub changed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The customer tracking page: step indicator plus full history, newest
/// first. A missing order is a `NotFound`, never an empty-but-valid view.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingView {
    pub order_id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub status: OrderStatus,
    pub cancelled: bool,
    /// Zero-based position in the forward sequence, `None` when cancelled.
    pub step: Option<usize>,
    pub total_steps: usize,
    pub steps: Vec<TrackingStep>,
    pub history: Vec<TimelineEntry>,
}

#[derive(Clone)]
pub struct ProjectionService {
    db: Arc<DatabaseConnection>,
}

impl ProjectionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Open orders for the kitchen, oldest first (FIFO).
    pub async fn kitchen_queue(&self) -> Result<Vec<KitchenTicket>, ServiceError> {
        let active: Vec<String> = ACTIVE_STATUSES.iter().map(|s| s.to_string()).collect();

        let orders = db::retry_read("kitchen_queue", || {
            let db = self.db.clone();
            let active = active.clone();
            async move {
                let orders = OrderEntity::find()
                    .filter(order::Column::OrderStatus.is_in(active))
                    .order_by_asc(order::Column::CreatedAt)
                    .all(&*db)
                    .await?;
                Ok(orders)
            }
        })
        .await?;

        let mut items_by_order = self
            .items_for_orders(orders.iter().map(|o| o.id).collect())
            .await?;

        orders
            .into_iter()
            .map(|order| {
                let status = parse_status(&order.order_status)?;
                Ok(KitchenTicket {
                    items: items_by_order.remove(&order.id).unwrap_or_default(),
                    status,
                    next_status: status.next_forward(),
                    order,
                })
            })
            .collect()
    }

    /// Admin table: any-status filter, newest first, paginated.
    pub async fn admin_table(
        &self,
        status: Option<OrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<AdminOrderPage, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::OrderStatus.eq(status.to_string()));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let mut items_by_order = self
            .items_for_orders(orders.iter().map(|o| o.id).collect())
            .await?;

        let rows = orders
            .into_iter()
            .map(|order| {
                let status = parse_status(&order.order_status)?;
                Ok(AdminOrderRow {
                    items: items_by_order.remove(&order.id).unwrap_or_default(),
                    status,
                    order,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(AdminOrderPage {
            rows,
            total,
            page,
            per_page,
        })
    }

    /// Tracking view for one customer-supplied order number.
    pub async fn tracking(&self, order_number: &str) -> Result<TrackingView, ServiceError> {
        let normalized = order_number.trim().to_uppercase();
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(normalized.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {normalized} not found")))?;

        let status = parse_status(&order.order_status)?;

        let history_rows = HistoryEntity::find()
            .filter(order_status_history::Column::OrderId.eq(order.id))
            .order_by_desc(order_status_history::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let history = history_rows
            .into_iter()
            .map(|row| {
                let entry_status = parse_status(&row.status)?;
                Ok(TimelineEntry {
                    status: entry_status,
                    label: entry_status.label(),
                    changed_by: row.changed_by,
                    notes: row.notes,
                    created_at: row.created_at,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let step = status.step_index();
        let steps = FORWARD_SEQUENCE
            .iter()
            .map(|s| TrackingStep {
                status: *s,
                label: s.label(),
                reached: matches!((step, s.step_index()), (Some(cur), Some(pos)) if pos <= cur),
            })
            .collect();

        Ok(TrackingView {
            order_id: order.id,
            order_number: order.order_number,
            customer_name: order.customer_name,
            status,
            cancelled: status == OrderStatus::Cancelled,
            step,
            total_steps: FORWARD_SEQUENCE.len(),
            steps,
            history,
        })
    }

    async fn items_for_orders(
        &self,
        order_ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, Vec<OrderItemModel>>, ServiceError> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(&*self.db)
            .await?;

        let mut grouped: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
        for item in items {
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }
}

/// What the kitchen display should do with a live change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KitchenCue {
    /// Older than what the display already applied; dropping it keeps the
    /// shown state from regressing on out-of-order delivery.
    Ignore,
    Refetch,
    /// Refetch and play the new-order chime.
    RefetchWithChime,
}

/// Per-viewer staleness guard: last-writer-wins by server timestamp, not by
/// arrival order.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last_applied: HashMap<Uuid, DateTime<Utc>>,
}

/// A [`Subscription`] with the staleness guard applied: stale changes are
/// dropped before they reach the consumer. This is what the SSE endpoints
/// stream from.
pub struct LiveFeed {
    subscription: Subscription,
    tracker: ChangeTracker,
}

impl LiveFeed {
    pub fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            tracker: ChangeTracker::new(),
        }
    }

    /// Next fresh signal. Changes older than the last forwarded write for
    /// their order are swallowed; `None` once the feed shuts down.
    pub async fn next(&mut self) -> Option<FeedSignal> {
        loop {
            match self.subscription.recv().await? {
                FeedSignal::Changed(change) => match self.tracker.apply(&change) {
                    KitchenCue::Ignore => continue,
                    KitchenCue::Refetch | KitchenCue::RefetchWithChime => {
                        return Some(FeedSignal::Changed(change))
                    }
                },
                FeedSignal::Refetch => return Some(FeedSignal::Refetch),
            }
        }
    }
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, change: &OrderChange) -> KitchenCue {
        match self.last_applied.get(&change.order_id) {
            Some(last) if *last >= change.changed_at => KitchenCue::Ignore,
            _ => {
                self.last_applied.insert(change.order_id, change.changed_at);
                if change.is_new_order {
                    KitchenCue::RefetchWithChime
                } else {
                    KitchenCue::Refetch
                }
            }
        }
    }
}
