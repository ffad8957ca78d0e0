//! SeaORM entities for the persisted order lifecycle tables.
//!
//! Status and enum columns are stored as snake_case strings and validated
//! into the typed enums in [`crate::models`] at the service boundary.

pub mod coupon;
pub mod order;
pub mod order_item;
pub mod order_status_history;
