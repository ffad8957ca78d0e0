use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::models::{parse_status, OrderStatus};
use crate::services::notifications;
use crate::services::orders::{CreateOrderRequest, OrderDetail};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(update_status))
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_name: String,
    pub product_price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: String,
    pub delivery_address: String,
    pub delivery_city: String,
    pub delivery_department: String,
    pub payment_method: String,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub payment_status: String,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

/// Checkout response: the persisted order plus the pre-rendered WhatsApp
/// handoff the storefront opens next.
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub whatsapp_text: String,
    pub whatsapp_link: String,
}

pub(crate) fn map_detail(detail: &OrderDetail) -> Result<OrderResponse, ServiceError> {
    let order = &detail.order;
    let status = parse_status(&order.order_status)?;
    Ok(OrderResponse {
        id: order.id,
        order_number: order.order_number.clone(),
        customer_name: order.customer_name.clone(),
        customer_email: order.customer_email.clone(),
        customer_phone: order.customer_phone.clone(),
        delivery_address: order.delivery_address.clone(),
        delivery_city: order.delivery_city.clone(),
        delivery_department: order.delivery_department.clone(),
        payment_method: order.payment_method.clone(),
        status,
        status_label: status.label(),
        payment_status: order.payment_status.clone(),
        subtotal: order.subtotal,
        discount_amount: order.discount_amount,
        total_amount: order.total_amount,
        coupon_code: order.coupon_code.clone(),
        notes: order.notes.clone(),
        created_at: order.created_at,
        items: detail
            .items
            .iter()
            .map(|item| OrderItemResponse {
                product_name: item.product_name.clone(),
                product_price: item.product_price,
                quantity: item.quantity,
                subtotal: item.subtotal,
            })
            .collect(),
    })
}

/// Checkout confirmation. Public: the storefront requires no login to order.
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.orders.create_order(request).await?;
    let response = CreateOrderResponse {
        whatsapp_text: notifications::whatsapp_summary(&detail),
        whatsapp_link: notifications::whatsapp_link(&detail.order.customer_phone, &detail),
        order: map_detail(&detail)?,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let detail = state
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(map_detail(&detail)?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    /// What the caller was displaying; a mismatch is a 409, not a lost
    /// update.
    pub expected_status: Option<String>,
    pub notes: Option<String>,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: AuthUser,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let new_status = parse_status(&request.status)?;
    let expected = request
        .expected_status
        .as_deref()
        .map(parse_status)
        .transpose()?;

    let order = state
        .orders
        .update_status(id, new_status, &actor, expected, request.notes)
        .await?;
    let items = state.orders.items_for(order.id).await?;
    Ok(Json(map_detail(&OrderDetail { order, items })?))
}
