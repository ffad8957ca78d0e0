//! Rellenitas order lifecycle API.
//!
//! The storefront, kitchen display, admin dashboard and tracking page are
//! thin clients over this service: it owns pricing, order persistence, the
//! status transition authority, and the realtime change fan-out.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::events::{ChangeFeed, Event, EventSender};
use crate::services::{
    coupons::CouponService, orders::OrderService, projections::ProjectionService,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub auth: Arc<auth::AuthService>,
    pub event_sender: EventSender,
    pub feed: ChangeFeed,
    pub orders: OrderService,
    pub coupons: CouponService,
    pub projections: ProjectionService,
}

impl AppState {
    /// Wires the service graph. The returned receiver must be fed to a
    /// spawned [`events::process_events`] task.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let event_sender = EventSender::new(event_tx);
        let feed = ChangeFeed::new(config.feed_capacity);
        let auth = Arc::new(auth::AuthService::new(&config.jwt_secret));

        let state = Self {
            orders: OrderService::new(db.clone(), event_sender.clone()),
            coupons: CouponService::new(db.clone()),
            projections: ProjectionService::new(db.clone()),
            db,
            config,
            auth,
            event_sender,
            feed,
        };
        (state, event_rx)
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_status = match state.db.ping().await {
        Ok(()) => "up",
        Err(_) => "down",
    };
    Json(json!({
        "status": if db_status == "up" { "ok" } else { "degraded" },
        "database": db_status,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Assembles the full application router.
pub fn app_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    let api = Router::new()
        .merge(handlers::orders::router())
        .merge(handlers::tracking::router())
        .merge(handlers::kitchen::router())
        .merge(handlers::admin::router())
        .merge(handlers::coupons::router());

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}
