use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::entities::order::{self, Entity as OrderEntity, Model as OrderModel};
use crate::entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel};
use crate::entities::order_status_history::{
    self, Entity as HistoryEntity, Model as HistoryModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{parse_status, OrderStatus, PaymentMethod, PaymentStatus};
use crate::services::coupons;
use crate::services::pricing::{self, CartLine, CouponOutcome};

/// How many fresh order numbers we try before giving up on a unique slot.
const ORDER_NUMBER_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewOrderItem {
    #[validate(length(min = 1, max = 100, message = "Product name is required"))]
    pub product_name: String,
    pub product_price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 100, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(email(message = "Customer email must be a valid address"))]
    pub customer_email: Option<String>,
    #[validate(length(min = 7, max = 15, message = "Phone must have at least 7 digits"))]
    pub customer_phone: String,
    #[validate(length(min = 1, max = 200, message = "Delivery address is required"))]
    pub delivery_address: String,
    #[validate(length(min = 1, max = 100, message = "Delivery city is required"))]
    pub delivery_city: String,
    #[validate(length(min = 1, max = 100, message = "Delivery department is required"))]
    pub delivery_department: String,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
}

impl CreateOrderRequest {
    fn check(&self) -> Result<Vec<CartLine>, ServiceError> {
        self.validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        if self.items.is_empty() {
            return Err(ServiceError::Validation(
                "An order needs at least one item".to_string(),
            ));
        }
        for item in &self.items {
            item.validate()
                .map_err(|e| ServiceError::Validation(e.to_string()))?;
            if item.quantity < 1 {
                return Err(ServiceError::Validation(format!(
                    "Quantity for {} must be at least 1",
                    item.product_name
                )));
            }
            if item.product_price < Decimal::ZERO {
                return Err(ServiceError::Validation(format!(
                    "Price for {} cannot be negative",
                    item.product_name
                )));
            }
        }

        Ok(self
            .items
            .iter()
            .map(|item| CartLine {
                product_name: item.product_name.clone(),
                unit_price: item.product_price,
                quantity: item.quantity,
            })
            .collect())
    }
}

/// An order together with its immutable line items.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<OrderModel>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Repository and transition authority for orders.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender) -> Self {
        Self { db, events }
    }

    /// Creates an order atomically: the order row, all item rows, the initial
    /// `pending` history entry, and the coupon redemption land in one
    /// transaction or not at all.
    #[instrument(skip(self, request), fields(customer = %request.customer_name))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderDetail, ServiceError> {
        let lines = request.check()?;

        let mut attempt = 0;
        loop {
            match self.try_create(&request, &lines).await {
                Err(ServiceError::Database(err))
                    if is_unique_violation(&err) && attempt + 1 < ORDER_NUMBER_ATTEMPTS =>
                {
                    attempt += 1;
                    warn!(attempt, "order number collided, retrying with a fresh one");
                }
                Ok(detail) => {
                    info!(
                        order_id = %detail.order.id,
                        order_number = %detail.order.order_number,
                        total = %detail.order.total_amount,
                        "Order created"
                    );
                    if let Err(e) = self
                        .events
                        .send(Event::OrderCreated {
                            order_id: detail.order.id,
                            order_number: detail.order.order_number.clone(),
                            created_at: detail.order.created_at,
                        })
                        .await
                    {
                        warn!(error = %e, order_id = %detail.order.id, "Failed to emit order created event");
                    }
                    return Ok(detail);
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn try_create(
        &self,
        request: &CreateOrderRequest,
        lines: &[CartLine],
    ) -> Result<OrderDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let coupon_row = match request.coupon_code.as_deref() {
            Some(code) => coupons::find_by_code(&txn, code).await?,
            None => None,
        };
        let quote = pricing::quote(lines, request.coupon_code.as_deref(), coupon_row.as_ref());

        // Fail closed: a coupon that does not apply blocks the checkout with
        // its reason instead of silently pricing without it.
        let applied_code = match &quote.coupon {
            CouponOutcome::Rejected { code, rejection } => {
                return Err(ServiceError::Validation(format!(
                    "Coupon {code} rejected: {}",
                    rejection.message()
                )));
            }
            CouponOutcome::Applied { code, .. } => Some(code.clone()),
            CouponOutcome::NotRequested => None,
        };

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            customer_name: Set(request.customer_name.clone()),
            customer_email: Set(request.customer_email.clone()),
            customer_phone: Set(request.customer_phone.clone()),
            delivery_address: Set(request.delivery_address.clone()),
            delivery_city: Set(request.delivery_city.clone()),
            delivery_department: Set(request.delivery_department.clone()),
            payment_method: Set(request.payment_method.to_string()),
            order_status: Set(OrderStatus::Pending.to_string()),
            payment_status: Set(PaymentStatus::Pending.to_string()),
            subtotal: Set(quote.subtotal),
            discount_amount: Set(quote.discount),
            total_amount: Set(quote.total),
            coupon_code: Set(applied_code.clone()),
            notes: Set(request.notes.clone()),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_name: Set(line.product_name.clone()),
                product_price: Set(line.unit_price),
                quantity: Set(line.quantity as i32),
                subtotal: Set(line.unit_price * Decimal::from(line.quantity)),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(OrderStatus::Pending.to_string()),
            changed_by: Set(None),
            notes: Set(None),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        // Only a completed checkout consumes a coupon use; the SQL guard
        // keeps two racing checkouts from both taking the last one.
        if let Some(code) = &applied_code {
            coupons::redeem(&txn, code).await?;
        }

        txn.commit().await?;

        Ok(OrderDetail {
            order: order_model,
            items,
        })
    }

    /// Advances (or cancels) an order through the status authority.
    ///
    /// Re-applying the current status is a success no-op with no history row.
    /// `expected_status`, when the caller supplies what it was displaying,
    /// turns a stale view into a conflict instead of a lost update; the
    /// conditional write underneath guards the same race between concurrent
    /// callers.
    #[instrument(skip(self, actor), fields(order_id = %order_id, new_status = %new_status, role = %actor.role))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &AuthUser,
        expected_status: Option<OrderStatus>,
        notes: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        if !actor.role.may_set(new_status) {
            return Err(ServiceError::Forbidden(format!(
                "Role {} may not set status {new_status}",
                actor.role
            )));
        }

        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let current = parse_status(&order.order_status)?;

        if let Some(expected) = expected_status {
            if expected != current {
                return Err(ServiceError::Conflict(order_id));
            }
        }

        if current == new_status {
            info!(status = %current, "status unchanged, skipping write");
            return Ok(order);
        }

        if !current.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot transition from '{current}' to '{new_status}'"
            )));
        }

        let changed_at = Utc::now();

        // Compare-and-swap on the current status: a concurrent transition
        // that got there first makes this a conflict, never a lost update.
        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::OrderStatus,
                Expr::value(new_status.to_string()),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::OrderStatus.eq(current.to_string()))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(order_id));
        }

        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(new_status.to_string()),
            changed_by: Set(Some(actor.user_id)),
            notes: Set(notes),
            created_at: Set(changed_at),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(from = %current, to = %new_status, "Order status updated");

        if let Err(e) = self
            .events
            .send(Event::OrderStatusChanged {
                order_id,
                order_number: order.order_number.clone(),
                old_status: current,
                new_status,
                changed_at,
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "Failed to emit status change event");
        }

        Ok(OrderModel {
            order_status: new_status.to_string(),
            ..order
        })
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderDetail>, ServiceError> {
        let order = OrderEntity::find_by_id(order_id).one(&*self.db).await?;
        match order {
            Some(order) => {
                let items = self.items_for(order.id).await?;
                Ok(Some(OrderDetail { order, items }))
            }
            None => Ok(None),
        }
    }

    /// Looks up by the human-facing number. Customer-typed tracking codes are
    /// frequently wrong, so zero rows is a plain `None`, not an error.
    pub async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number.trim().to_uppercase()))
            .one(&*self.db)
            .await?;
        Ok(order)
    }

    pub async fn items_for(&self, order_id: Uuid) -> Result<Vec<OrderItemModel>, ServiceError> {
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(items)
    }

    /// Full audit trail for one order, newest first.
    pub async fn history(&self, order_id: Uuid) -> Result<Vec<HistoryModel>, ServiceError> {
        let rows = HistoryEntity::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_desc(order_status_history::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(rows)
    }

    /// Paginated listing, newest first, optionally filtered by status.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderList, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::OrderStatus.eq(status.to_string()));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, per_page, "Failed to fetch orders page");
            ServiceError::Database(e)
        })?;

        Ok(OrderList {
            orders,
            total,
            page,
            per_page,
        })
    }
}

/// `REL-` + 8 digits: seconds of the day (5 digits) plus a random tail.
/// Collisions are possible within a second; the unique index on
/// `order_number` plus the caller's retry make them harmless.
fn generate_order_number() -> String {
    let now = Utc::now();
    let seconds_of_day = now.timestamp() % 86_400;
    let tail: u32 = rand::thread_rng().gen_range(0..1000);
    format!("REL-{seconds_of_day:05}{tail:03}")
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_have_the_storefront_shape() {
        let number = generate_order_number();
        assert!(number.starts_with("REL-"));
        assert_eq!(number.len(), 12);
        assert!(number[4..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn empty_cart_is_rejected_before_any_write() {
        let request = CreateOrderRequest {
            customer_name: "Juan Pérez".to_string(),
            customer_email: None,
            customer_phone: "3001234567".to_string(),
            delivery_address: "Calle 15 #10-20".to_string(),
            delivery_city: "Valledupar".to_string(),
            delivery_department: "Cesar".to_string(),
            payment_method: PaymentMethod::Efectivo,
            coupon_code: None,
            notes: None,
            items: vec![],
        };
        assert!(matches!(
            request.check(),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let request = CreateOrderRequest {
            customer_name: "Juan Pérez".to_string(),
            customer_email: None,
            customer_phone: "3001234567".to_string(),
            delivery_address: "Calle 15 #10-20".to_string(),
            delivery_city: "Valledupar".to_string(),
            delivery_department: "Cesar".to_string(),
            payment_method: PaymentMethod::Efectivo,
            coupon_code: None,
            notes: None,
            items: vec![NewOrderItem {
                product_name: "Rellenita Oreo".to_string(),
                product_price: Decimal::from(3500),
                quantity: 0,
            }],
        };
        assert!(matches!(
            request.check(),
            Err(ServiceError::Validation(_))
        ));
    }
}
