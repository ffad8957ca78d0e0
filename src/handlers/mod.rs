pub mod admin;
pub mod coupons;
pub mod kitchen;
pub mod orders;
pub mod tracking;
