//! Canonical order state graph.
//!
//! Every surface (checkout, kitchen display, admin table, tracking timeline)
//! renders and validates against this single enum. The legacy `confirmed`
//! label is accepted on ingress as an alias of `preparing` and never emitted.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::errors::ServiceError;

/// Lifecycle status of an order.
///
/// Forward edges advance one step at a time:
/// `pending → preparing → ready → in_delivery → delivered`.
/// `cancelled` is reachable from any non-terminal state. `delivered` and
/// `cancelled` are absorbing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    InDelivery,
    Delivered,
    Cancelled,
}

/// The happy path, in order. Position in this sequence drives the tracking
/// page's step indicator.
pub const FORWARD_SEQUENCE: [OrderStatus; 5] = [
    OrderStatus::Pending,
    OrderStatus::Preparing,
    OrderStatus::Ready,
    OrderStatus::InDelivery,
    OrderStatus::Delivered,
];

/// Statuses shown on the kitchen display, oldest first.
pub const ACTIVE_STATUSES: [OrderStatus; 4] = [
    OrderStatus::Pending,
    OrderStatus::Preparing,
    OrderStatus::Ready,
    OrderStatus::InDelivery,
];

impl OrderStatus {
    /// The single legal forward step, if any.
    pub fn next_forward(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::Ready),
            OrderStatus::Ready => Some(OrderStatus::InDelivery),
            OrderStatus::InDelivery => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn is_active(self) -> bool {
        ACTIVE_STATUSES.contains(&self)
    }

    /// Whether `self → target` is an accepted transition.
    ///
    /// Re-applying the current status is accepted so that duplicate clicks and
    /// network retries stay no-ops; the repository skips the write in that
    /// case.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        if self == target {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        if target == OrderStatus::Cancelled {
            return true;
        }
        self.next_forward() == Some(target)
    }

    /// Zero-based position in [`FORWARD_SEQUENCE`], `None` for `cancelled`.
    pub fn step_index(self) -> Option<usize> {
        FORWARD_SEQUENCE.iter().position(|s| *s == self)
    }

    /// Customer-facing Spanish label, as the storefront renders it.
    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pendiente",
            OrderStatus::Preparing => "En Preparación",
            OrderStatus::Ready => "Listo para Entrega/Recogida",
            OrderStatus::InDelivery => "En Entrega",
            OrderStatus::Delivered => "Entregado",
            OrderStatus::Cancelled => "Cancelado",
        }
    }
}

/// Parses a status string from a client or a stored row.
///
/// Accepts the legacy `confirmed` label as `preparing`.
pub fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" => Ok(OrderStatus::Pending),
        "preparing" | "confirmed" => Ok(OrderStatus::Preparing),
        "ready" => Ok(OrderStatus::Ready),
        "in_delivery" => Ok(OrderStatus::InDelivery),
        "delivered" => Ok(OrderStatus::Delivered),
        "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
        other => Err(ServiceError::InvalidStatus(format!(
            "Unknown order status: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_edges_are_single_step() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Preparing));
        assert!(OrderStatus::Preparing.can_transition_to(OrderStatus::Ready));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::InDelivery));
        assert!(OrderStatus::InDelivery.can_transition_to(OrderStatus::Delivered));

        // No skipping through the authority.
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Ready));
        assert!(!OrderStatus::Preparing.can_transition_to(OrderStatus::InDelivery));
        // No going backwards either.
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Preparing));
    }

    #[test]
    fn cancel_reachable_from_any_non_terminal_state() {
        for status in ACTIVE_STATUSES {
            assert!(status.can_transition_to(OrderStatus::Cancelled));
        }
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            assert!(terminal.is_terminal());
            assert_eq!(terminal.next_forward(), None);
            for target in FORWARD_SEQUENCE {
                if target != terminal {
                    assert!(!terminal.can_transition_to(target));
                }
            }
        }
    }

    #[test]
    fn same_status_is_accepted() {
        for status in FORWARD_SEQUENCE {
            assert!(status.can_transition_to(status));
        }
        assert!(OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn snake_case_round_trip_and_aliases() {
        assert_eq!(OrderStatus::InDelivery.to_string(), "in_delivery");
        assert_eq!(parse_status("in_delivery").unwrap(), OrderStatus::InDelivery);
        assert_eq!(parse_status("confirmed").unwrap(), OrderStatus::Preparing);
        assert_eq!(parse_status("canceled").unwrap(), OrderStatus::Cancelled);
        assert!(parse_status("shipped").is_err());
    }

    #[test]
    fn step_index_tracks_forward_sequence() {
        assert_eq!(OrderStatus::Pending.step_index(), Some(0));
        assert_eq!(OrderStatus::Delivered.step_index(), Some(4));
        assert_eq!(OrderStatus::Cancelled.step_index(), None);
    }
}
