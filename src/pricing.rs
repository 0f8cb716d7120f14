//! Pure price/discount calculation shared by the cart and order paths.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::entities::product_variation::DiscountType;

/// Monetary amounts are carried at 2 decimal places, rounded half-up.
const MONEY_DP: u32 = 2;

/// Per-line price breakdown. Derived, never persisted standalone.
///
/// Invariants: all fields non-negative, `discount <= sub_total`, and
/// `total = sub_total - discount` exactly, post-rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub unit_price: Decimal,
    pub sub_total: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl PriceSummary {
    /// All-zero summary, used for empty carts.
    pub fn zero() -> Self {
        Self {
            unit_price: Decimal::ZERO,
            sub_total: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes the price breakdown for one line.
///
/// Total function over its domain: negative discounts and over-100%
/// percentages are policy-clamped here, not rejected. Rejection of bad
/// catalog data happens upstream, at variation validation time.
pub fn calculate_price_summary(
    unit_price: Decimal,
    discount_type: DiscountType,
    discount: Decimal,
    quantity: i32,
) -> PriceSummary {
    let quantity = Decimal::from(quantity);
    let sub_total = round_money(unit_price * quantity);

    let raw_discount = match discount_type {
        DiscountType::None => Decimal::ZERO,
        DiscountType::Percentage => sub_total * discount / Decimal::ONE_HUNDRED,
        DiscountType::Fixed => discount * quantity,
    };

    // Clamp before and after rounding so the discount can never exceed the
    // (already rounded) subtotal, keeping the total identity exact.
    let discount = round_money(raw_discount.max(Decimal::ZERO).min(sub_total)).min(sub_total);
    let total = sub_total - discount;

    PriceSummary {
        unit_price: round_money(unit_price),
        sub_total,
        discount,
        total,
    }
}
