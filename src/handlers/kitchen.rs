use axum::{extract::State, response::Json, routing::get, Router};

use crate::auth::{AuthUser, Role};
use crate::errors::ServiceError;
use crate::services::projections::KitchenTicket;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/kitchen/queue", get(queue))
}

/// Open orders, oldest first. Kitchen and admin staff only.
async fn queue(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Json<Vec<KitchenTicket>>, ServiceError> {
    if !matches!(actor.role, Role::Kitchen | Role::Admin) {
        return Err(ServiceError::Forbidden(
            "Kitchen queue is restricted to kitchen staff".to_string(),
        ));
    }
    let tickets = state.projections.kitchen_queue().await?;
    Ok(Json(tickets))
}
