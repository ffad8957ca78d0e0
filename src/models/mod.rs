//! Domain enums shared across entities, services and handlers.

pub mod status;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use status::{parse_status, OrderStatus, ACTIVE_STATUSES, FORWARD_SEQUENCE};

/// How the customer pays. No gateway integration; this is a recorded choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    Efectivo,
    Transferencia,
    Online,
}

/// Payment state, never transitioned by the order lifecycle core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}
