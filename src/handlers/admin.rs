use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::auth::{AuthUser, Role};
use crate::errors::ServiceError;
use crate::models::parse_status;
use crate::services::projections::AdminOrderPage;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/orders", get(list_orders))
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    /// Snake_case status, or absent for all.
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    25
}

/// The admin order table: any-status filter, newest first.
async fn list_orders(
    State(state): State<AppState>,
    actor: AuthUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<AdminOrderPage>, ServiceError> {
    if actor.role != Role::Admin {
        return Err(ServiceError::Forbidden(
            "Order management is restricted to admins".to_string(),
        ));
    }

    let status = query.status.as_deref().map(parse_status).transpose()?;
    let page = state
        .projections
        .admin_table(status, query.page, query.per_page)
        .await?;
    Ok(Json(page))
}
