//! Cart pricing and coupon evaluation.
//!
//! Pure functions of (cart, coupon row): no lookups, no writes. The guarded
//! `times_used` increment lives in the coupon service and runs inside the
//! order-creation transaction, never here.
//!
//! Amounts are Colombian pesos with no fractional minor units; every figure
//! is rounded to whole pesos before it reaches persistence.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::entities::coupon;
use crate::models::DiscountType;

/// One cart line as the storefront sends it at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// Why a requested coupon did not apply. Surfaced to the caller verbatim,
/// never a silent zero discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    UnknownCode,
    Inactive,
    MinimumNotMet { required: Decimal },
    Exhausted,
    UnknownDiscountType,
}

impl CouponRejection {
    pub fn message(&self) -> String {
        match self {
            CouponRejection::UnknownCode => "Coupon code not found".to_string(),
            CouponRejection::Inactive => "Coupon is no longer active".to_string(),
            CouponRejection::MinimumNotMet { required } => {
                format!("Coupon requires a minimum purchase of {required}")
            }
            CouponRejection::Exhausted => "Coupon has reached its usage limit".to_string(),
            CouponRejection::UnknownDiscountType => {
                "Coupon has an unrecognized discount type".to_string()
            }
        }
    }
}

/// Outcome of the coupon half of a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CouponOutcome {
    NotRequested,
    Applied { code: String, discount: Decimal },
    Rejected { code: String, rejection: CouponRejection },
}

/// A priced cart: `total = subtotal - discount`, `0 <= discount <= subtotal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub coupon: CouponOutcome,
}

pub fn subtotal(lines: &[CartLine]) -> Decimal {
    lines
        .iter()
        .map(|line| line.unit_price * Decimal::from(line.quantity))
        .sum()
}

/// Prices a cart against an optional coupon.
///
/// `requested_code` is what the customer typed; `coupon` is the row the
/// repository found for it (or `None`). A rejected coupon yields a zero
/// discount and the explicit rejection.
pub fn quote(
    lines: &[CartLine],
    requested_code: Option<&str>,
    coupon: Option<&coupon::Model>,
) -> Quote {
    let subtotal = subtotal(lines);

    let outcome = match (requested_code, coupon) {
        (None, _) => CouponOutcome::NotRequested,
        (Some(code), None) => CouponOutcome::Rejected {
            code: code.trim().to_uppercase(),
            rejection: CouponRejection::UnknownCode,
        },
        (Some(_), Some(row)) => match coupon_discount(subtotal, row) {
            Ok(discount) => CouponOutcome::Applied {
                code: row.code.clone(),
                discount,
            },
            Err(rejection) => CouponOutcome::Rejected {
                code: row.code.clone(),
                rejection,
            },
        },
    };

    let discount = match &outcome {
        CouponOutcome::Applied { discount, .. } => *discount,
        _ => Decimal::ZERO,
    };

    Quote {
        subtotal,
        discount,
        total: subtotal - discount,
        coupon: outcome,
    }
}

/// Fails closed: any condition the coupon row does not meet is a rejection.
fn coupon_discount(subtotal: Decimal, row: &coupon::Model) -> Result<Decimal, CouponRejection> {
    if !row.is_active {
        return Err(CouponRejection::Inactive);
    }
    if let Some(min) = row.min_purchase_amount {
        if subtotal < min {
            return Err(CouponRejection::MinimumNotMet { required: min });
        }
    }
    if let Some(max_uses) = row.max_uses {
        if row.times_used >= max_uses {
            return Err(CouponRejection::Exhausted);
        }
    }

    let discount_type: DiscountType = row
        .discount_type
        .parse()
        .map_err(|_| CouponRejection::UnknownDiscountType)?;

    let discount = match discount_type {
        DiscountType::Percentage => (subtotal * row.discount_value / Decimal::from(100))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
        // A fixed discount never pushes the total below zero.
        DiscountType::Fixed => row.discount_value.min(subtotal),
    };

    Ok(discount.max(Decimal::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn line(price: Decimal, quantity: u32) -> CartLine {
        CartLine {
            product_name: "Rellenita Oreo".to_string(),
            unit_price: price,
            quantity,
        }
    }

    fn coupon_row(
        discount_type: &str,
        value: Decimal,
        min: Option<Decimal>,
        max_uses: Option<i32>,
        times_used: i32,
        is_active: bool,
    ) -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "DULCE10".to_string(),
            discount_type: discount_type.to_string(),
            discount_value: value,
            min_purchase_amount: min,
            max_uses,
            times_used,
            is_active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn subtotal_is_sum_of_price_times_quantity() {
        let lines = vec![line(dec!(3500), 2), line(dec!(4200), 1)];
        assert_eq!(subtotal(&lines), dec!(11200));
    }

    #[test]
    fn percentage_coupon_example() {
        // 12,000 COP at 10% → 1,200 off, 10,800 total.
        let lines = vec![line(dec!(4000), 3)];
        let row = coupon_row("percentage", dec!(10), None, None, 0, true);
        let q = quote(&lines, Some("DULCE10"), Some(&row));
        assert_eq!(q.subtotal, dec!(12000));
        assert_eq!(q.discount, dec!(1200));
        assert_eq!(q.total, dec!(10800));
    }

    #[test]
    fn fixed_coupon_is_capped_at_subtotal() {
        // 5,000 COP cart, 8,000 fixed coupon → total 0, never negative.
        let lines = vec![line(dec!(5000), 1)];
        let row = coupon_row("fixed", dec!(8000), None, None, 0, true);
        let q = quote(&lines, Some("DULCE10"), Some(&row));
        assert_eq!(q.discount, dec!(5000));
        assert_eq!(q.total, Decimal::ZERO);
    }

    #[test]
    fn percentage_discount_rounds_to_whole_pesos() {
        let lines = vec![line(dec!(3500), 1)];
        let row = coupon_row("percentage", dec!(15), None, None, 0, true);
        let q = quote(&lines, Some("DULCE10"), Some(&row));
        // 525 exactly; also check a rounding case.
        assert_eq!(q.discount, dec!(525));

        let lines = vec![line(dec!(3333), 1)];
        let q = quote(&lines, Some("DULCE10"), Some(&row));
        // 499.95 → 500
        assert_eq!(q.discount, dec!(500));
    }

    #[test]
    fn unknown_code_is_rejected_explicitly() {
        let lines = vec![line(dec!(3500), 1)];
        let q = quote(&lines, Some("nope"), None);
        assert_eq!(q.discount, Decimal::ZERO);
        assert_eq!(q.total, q.subtotal);
        assert_eq!(
            q.coupon,
            CouponOutcome::Rejected {
                code: "NOPE".to_string(),
                rejection: CouponRejection::UnknownCode,
            }
        );
    }

    #[test]
    fn inactive_coupon_is_rejected() {
        let lines = vec![line(dec!(10000), 1)];
        let row = coupon_row("percentage", dec!(10), None, None, 0, false);
        let q = quote(&lines, Some("DULCE10"), Some(&row));
        assert_eq!(q.discount, Decimal::ZERO);
        assert!(matches!(
            q.coupon,
            CouponOutcome::Rejected {
                rejection: CouponRejection::Inactive,
                ..
            }
        ));
    }

    #[test]
    fn minimum_purchase_is_enforced() {
        let lines = vec![line(dec!(3500), 1)];
        let row = coupon_row("percentage", dec!(10), Some(dec!(10000)), None, 0, true);
        let q = quote(&lines, Some("DULCE10"), Some(&row));
        assert!(matches!(
            q.coupon,
            CouponOutcome::Rejected {
                rejection: CouponRejection::MinimumNotMet { .. },
                ..
            }
        ));
    }

    #[test]
    fn exhausted_coupon_is_rejected() {
        let lines = vec![line(dec!(10000), 1)];
        let row = coupon_row("percentage", dec!(10), None, Some(5), 5, true);
        let q = quote(&lines, Some("DULCE10"), Some(&row));
        assert!(matches!(
            q.coupon,
            CouponOutcome::Rejected {
                rejection: CouponRejection::Exhausted,
                ..
            }
        ));
    }

    #[test]
    fn no_coupon_requested() {
        let lines = vec![line(dec!(3500), 2)];
        let q = quote(&lines, None, None);
        assert_eq!(q.coupon, CouponOutcome::NotRequested);
        assert_eq!(q.total, dec!(7000));
    }

    proptest! {
        #[test]
        fn discount_never_exceeds_subtotal_and_total_is_non_negative(
            prices in prop::collection::vec(1u32..100_000, 1..8),
            quantities in prop::collection::vec(1u32..20, 1..8),
            percentage in 0u32..=100,
            fixed in 0u32..1_000_000,
            use_fixed in any::<bool>(),
        ) {
            let lines: Vec<CartLine> = prices
                .iter()
                .zip(quantities.iter().cycle())
                .map(|(p, q)| line(Decimal::from(*p), *q))
                .collect();

            let row = if use_fixed {
                coupon_row("fixed", Decimal::from(fixed), None, None, 0, true)
            } else {
                coupon_row("percentage", Decimal::from(percentage), None, None, 0, true)
            };

            let q = quote(&lines, Some("DULCE10"), Some(&row));
            prop_assert!(q.discount >= Decimal::ZERO);
            prop_assert!(q.discount <= q.subtotal);
            prop_assert!(q.total >= Decimal::ZERO);
            prop_assert_eq!(q.total, q.subtotal - q.discount);
        }
    }
}
