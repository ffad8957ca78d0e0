#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection};
use tokio::sync::mpsc;
use uuid::Uuid;

use rellenitas_api::auth::{AuthUser, Role};
use rellenitas_api::events::{self, ChangeFeed, EventSender};
use rellenitas_api::migrator;
use rellenitas_api::models::PaymentMethod;
use rellenitas_api::services::coupons::CouponService;
use rellenitas_api::services::orders::{CreateOrderRequest, NewOrderItem, OrderService};
use rellenitas_api::services::projections::ProjectionService;

/// Everything a test needs, wired over a fresh in-memory SQLite database.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub orders: OrderService,
    pub coupons: CouponService,
    pub projections: ProjectionService,
    pub feed: ChangeFeed,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        migrator::run_migrations(&db).await.expect("migrations");
        let db = Arc::new(db);

        let (tx, rx) = mpsc::channel(64);
        let sender = EventSender::new(tx);
        let feed = ChangeFeed::new(64);
        tokio::spawn(events::process_events(rx, feed.clone()));

        Self {
            orders: OrderService::new(db.clone(), sender),
            coupons: CouponService::new(db.clone()),
            projections: ProjectionService::new(db.clone()),
            db,
            feed,
        }
    }
}

pub fn admin() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: Role::Admin,
    }
}

pub fn kitchen() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: Role::Kitchen,
    }
}

pub fn customer() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: Role::Customer,
    }
}

/// A plain cash order for two boxes of rellenitas, 12,000 COP before
/// discounts.
pub fn order_request(coupon_code: Option<&str>) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_name: "María Fernández".to_string(),
        customer_email: Some("maria@example.com".to_string()),
        customer_phone: "3001234567".to_string(),
        delivery_address: "Calle 15 #10-20".to_string(),
        delivery_city: "Valledupar".to_string(),
        delivery_department: "Cesar".to_string(),
        payment_method: PaymentMethod::Efectivo,
        coupon_code: coupon_code.map(str::to_string),
        notes: None,
        items: vec![
            NewOrderItem {
                product_name: "Rellenita Oreo".to_string(),
                product_price: Decimal::from(3500),
                quantity: 2,
            },
            NewOrderItem {
                product_name: "Rellenita Arequipe".to_string(),
                product_price: Decimal::from(5000),
                quantity: 1,
            },
        ],
    }
}
