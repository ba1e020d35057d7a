//! Money calculation utilities using rust_decimal for precision
//!
//! All arithmetic runs on `Decimal` internally and converts to `f64`
//! (2 decimal places, half-up) for storage and serialization.

use crate::error::{EngineError, EngineResult};
use rust_decimal::prelude::*;
use shared::models::{OrderItem, OrderItemInput};

/// Rounding strategy for monetary values (2 decimal places)
const DECIMAL_PLACES: u32 = 2;

/// Maximum allowed price per item
const MAX_PRICE: f64 = 1_000_000.0;
/// Maximum allowed quantity per item
const MAX_QUANTITY: i32 = 9999;

pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp(DECIMAL_PLACES)
        .to_f64()
        .unwrap_or(0.0)
}

/// Order total: Σ(quantity × unit_price) of non-void items minus discount.
///
/// Clamped at zero - a discount larger than the item sum never produces a
/// negative total.
pub fn order_total(items: &[OrderItem], discount: f64) -> f64 {
    let mut total = Decimal::ZERO;
    for item in items.iter().filter(|i| !i.is_void) {
        total += to_decimal(item.unit_price) * Decimal::from(item.quantity);
    }
    total -= to_decimal(discount);
    if total < Decimal::ZERO {
        total = Decimal::ZERO;
    }
    to_f64(total)
}

/// Validate an order line input before prices are looked up
pub fn validate_item_input(input: &OrderItemInput) -> EngineResult<()> {
    if input.quantity <= 0 {
        return Err(EngineError::Validation(format!(
            "quantity must be positive, got {}",
            input.quantity
        )));
    }
    if input.quantity > MAX_QUANTITY {
        return Err(EngineError::Validation(format!(
            "quantity exceeds maximum allowed ({}), got {}",
            MAX_QUANTITY, input.quantity
        )));
    }
    Ok(())
}

/// Validate a catalog price before snapshotting it into an order
pub fn validate_price(price: f64) -> EngineResult<()> {
    if !price.is_finite() {
        return Err(EngineError::Validation(format!(
            "price must be a finite number, got {}",
            price
        )));
    }
    if price < 0.0 {
        return Err(EngineError::Validation(format!(
            "price must be non-negative, got {}",
            price
        )));
    }
    if price > MAX_PRICE {
        return Err(EngineError::Validation(format!(
            "price exceeds maximum allowed ({}), got {}",
            MAX_PRICE, price
        )));
    }
    Ok(())
}

pub fn validate_discount(discount: f64) -> EngineResult<()> {
    if !discount.is_finite() || discount < 0.0 {
        return Err(EngineError::Validation(format!(
            "discount must be a non-negative finite number, got {}",
            discount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::util::new_id;

    fn item(price: f64, quantity: i32, is_void: bool) -> OrderItem {
        OrderItem {
            item_id: new_id(),
            product_id: "prod-1".into(),
            name: "Café solo".into(),
            quantity,
            unit_price: price,
            is_stockable: true,
            is_void,
            void_reason: None,
            status: None,
            note: None,
        }
    }

    #[test]
    fn test_total_sums_non_void_items() {
        let items = vec![item(2.5, 2, false), item(10.0, 1, false)];
        assert_eq!(order_total(&items, 0.0), 15.0);
    }

    #[test]
    fn test_void_items_excluded_from_total() {
        let items = vec![item(2.5, 2, false), item(10.0, 1, true)];
        assert_eq!(order_total(&items, 0.0), 5.0);
    }

    #[test]
    fn test_discount_subtracted_and_clamped() {
        let items = vec![item(4.0, 1, false)];
        assert_eq!(order_total(&items, 1.5), 2.5);
        assert_eq!(order_total(&items, 10.0), 0.0);
    }

    #[test]
    fn test_decimal_precision_avoids_float_drift() {
        // 0.1 + 0.2 style drift must not leak into totals
        let items = vec![item(0.1, 1, false), item(0.2, 1, false)];
        assert_eq!(order_total(&items, 0.0), 0.3);
    }

    #[test]
    fn test_price_validation() {
        assert!(validate_price(3.5).is_ok());
        assert!(validate_price(-0.01).is_err());
        assert!(validate_price(f64::NAN).is_err());
        assert!(validate_price(2_000_000.0).is_err());
    }

    #[test]
    fn test_quantity_validation() {
        let bad = OrderItemInput {
            product_id: "p".into(),
            quantity: 0,
            note: None,
        };
        assert!(validate_item_input(&bad).is_err());
    }
}
