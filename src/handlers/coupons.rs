use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AuthUser, Role};
use crate::entities::coupon::Model as CouponModel;
use crate::errors::ServiceError;
use crate::services::coupons::UpsertCouponRequest;
use crate::services::pricing::{self, CartLine, Quote};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/coupons/validate", post(validate))
        .route("/coupons", post(create).get(list))
        .route("/coupons/:id", put(update).delete(remove))
        .route("/coupons/:id/active", put(set_active))
}

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub items: Vec<CartLine>,
}

/// Prices a cart against a coupon without touching anything: the checkout
/// preview. Rejections come back in the quote, not as an HTTP error.
async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<Quote>, ServiceError> {
    let row = state.coupons.get_by_code(&request.code).await?;
    let quote = pricing::quote(&request.items, Some(&request.code), row.as_ref());
    Ok(Json(quote))
}

fn require_admin(actor: &AuthUser) -> Result<(), ServiceError> {
    if actor.role != Role::Admin {
        return Err(ServiceError::Forbidden(
            "Coupon management is restricted to admins".to_string(),
        ));
    }
    Ok(())
}

async fn create(
    State(state): State<AppState>,
    actor: AuthUser,
    Json(request): Json<UpsertCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    require_admin(&actor)?;
    let coupon = state.coupons.create(request).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn list(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Json<Vec<CouponModel>>, ServiceError> {
    require_admin(&actor)?;
    Ok(Json(state.coupons.list().await?))
}

async fn update(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpsertCouponRequest>,
) -> Result<Json<CouponModel>, ServiceError> {
    require_admin(&actor)?;
    Ok(Json(state.coupons.update(id, request).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

async fn set_active(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<CouponModel>, ServiceError> {
    require_admin(&actor)?;
    Ok(Json(state.coupons.set_active(id, request.is_active).await?))
}

async fn remove(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    require_admin(&actor)?;
    state.coupons.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
