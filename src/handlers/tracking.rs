use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::Json,
    routing::get,
    Router,
};
use futures::stream::Stream;
use uuid::Uuid;

use crate::auth::{AuthUser, Role};
use crate::errors::ServiceError;
use crate::events::{FeedSignal, SubscriptionFilter};
use crate::services::projections::{LiveFeed, TrackingView};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/track/:order_number", get(track))
        .route("/orders/:id/events", get(order_events))
        .route("/orders/events", get(all_order_events))
}

/// Customer tracking view. A wrong tracking number is a 404 with a clear
/// message, never an empty timeline.
async fn track(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<TrackingView>, ServiceError> {
    let view = state.projections.tracking(&order_number).await?;
    Ok(Json(view))
}

/// Live changes for one order, as SSE. The subscription is released when the
/// client disconnects and the stream is dropped.
async fn order_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.feed.subscribe(SubscriptionFilter::Order(id));
    sse_stream(LiveFeed::new(subscription))
}

/// Live changes across all orders, for the kitchen display and admin table.
async fn all_order_events(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ServiceError> {
    if !matches!(actor.role, Role::Kitchen | Role::Admin) {
        return Err(ServiceError::Forbidden(
            "The order event stream is restricted to staff".to_string(),
        ));
    }
    let subscription = state.feed.subscribe(SubscriptionFilter::All);
    Ok(sse_stream(LiveFeed::new(subscription)))
}

fn sse_stream(feed: LiveFeed) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = futures::stream::unfold(feed, |mut feed| async move {
        let signal = feed.next().await?;
        let event = match signal {
            FeedSignal::Changed(change) => SseEvent::default()
                .event("order_change")
                .json_data(&change)
                // Serialization of OrderChange cannot realistically fail;
                // degrade to a refetch hint rather than dropping the client.
                .unwrap_or_else(|_| SseEvent::default().event("refetch").data("refetch")),
            FeedSignal::Refetch => SseEvent::default().event("refetch").data("refetch"),
        };
        Some((Ok::<_, Infallible>(event), feed))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
