pub mod coupons;
pub mod notifications;
pub mod orders;
pub mod pricing;
pub mod projections;
