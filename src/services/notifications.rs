//! Outbound messaging handoff.
//!
//! Pure formatting only: the storefront opens the WhatsApp deep link itself,
//! no message transport lives here.

use rust_decimal::Decimal;

use crate::services::orders::OrderDetail;

/// Renders an order into the Spanish summary the storefront pre-fills into
/// WhatsApp after checkout.
pub fn whatsapp_summary(detail: &OrderDetail) -> String {
    let order = &detail.order;
    let mut lines = Vec::new();

    lines.push(format!("🍪 *Pedido {}*", order.order_number));
    lines.push(format!("Cliente: {}", order.customer_name));
    lines.push(format!(
        "Entrega: {}, {} ({})",
        order.delivery_address, order.delivery_city, order.delivery_department
    ));
    lines.push(String::new());

    for item in &detail.items {
        lines.push(format!(
            "• {} x{}: {}",
            item.product_name,
            item.quantity,
            format_cop(item.subtotal)
        ));
    }

    lines.push(String::new());
    if order.discount_amount > Decimal::ZERO {
        lines.push(format!("Subtotal: {}", format_cop(order.subtotal)));
        let coupon = order.coupon_code.as_deref().unwrap_or("cupón");
        lines.push(format!(
            "Descuento ({}): -{}",
            coupon,
            format_cop(order.discount_amount)
        ));
    }
    lines.push(format!("*Total: {}*", format_cop(order.total_amount)));
    lines.push(format!("Pago: {}", order.payment_method));

    if let Some(notes) = &order.notes {
        lines.push(format!("Nota: {notes}"));
    }

    lines.join("\n")
}

/// `wa.me` deep link with the summary pre-filled.
pub fn whatsapp_link(phone: &str, detail: &OrderDetail) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let text: String =
        url::form_urlencoded::byte_serialize(whatsapp_summary(detail).as_bytes()).collect();
    format!("https://wa.me/{digits}?text={text}")
}

/// Whole Colombian pesos with dot thousands separators, e.g. `$12.000`.
fn format_cop(amount: Decimal) -> String {
    let whole = amount.round().to_string();
    let (sign, digits) = match whole.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", whole.as_str()),
    };

    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("{sign}${grouped}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{order, order_item};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn sample_detail() -> OrderDetail {
        let order_id = Uuid::new_v4();
        OrderDetail {
            order: order::Model {
                id: order_id,
                order_number: "REL-12345678".to_string(),
                customer_name: "Juan Pérez".to_string(),
                customer_email: None,
                customer_phone: "3001234567".to_string(),
                delivery_address: "Calle 15 #10-20".to_string(),
                delivery_city: "Valledupar".to_string(),
                delivery_department: "Cesar".to_string(),
                payment_method: "efectivo".to_string(),
                order_status: "pending".to_string(),
                payment_status: "pending".to_string(),
                subtotal: dec!(12000),
                discount_amount: dec!(1200),
                total_amount: dec!(10800),
                coupon_code: Some("DULCE10".to_string()),
                notes: None,
                created_at: Utc::now(),
            },
            items: vec![order_item::Model {
                id: Uuid::new_v4(),
                order_id,
                product_name: "Rellenita Oreo".to_string(),
                product_price: dec!(4000),
                quantity: 3,
                subtotal: dec!(12000),
            }],
        }
    }

    #[test]
    fn summary_carries_number_items_and_discounted_total() {
        let text = whatsapp_summary(&sample_detail());
        assert!(text.contains("REL-12345678"));
        assert!(text.contains("Rellenita Oreo x3"));
        assert!(text.contains("Descuento (DULCE10): -$1.200"));
        assert!(text.contains("*Total: $10.800*"));
    }

    #[test]
    fn cop_formatting_groups_thousands() {
        assert_eq!(format_cop(dec!(0)), "$0");
        assert_eq!(format_cop(dec!(3500)), "$3.500");
        assert_eq!(format_cop(dec!(1200000)), "$1.200.000");
    }

    #[test]
    fn link_strips_non_digits_and_encodes_text() {
        let link = whatsapp_link("+57 300 123-4567", &sample_detail());
        assert!(link.starts_with("https://wa.me/573001234567?text="));
        assert!(!link.contains(' '));
    }
}
