//! Property-based tests for the pricing engine.
//!
//! These tests use proptest to verify the money invariants across a wide
//! range of inputs, helping to catch edge cases that unit tests might miss.

use proptest::prelude::*;
use rust_decimal::Decimal;

use sportline_api::entities::product_variation::DiscountType;
use sportline_api::pricing::calculate_price_summary;
use sportline_api::services::orders::{build_payment_url, should_transition};

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (0u64..1_000_000, 0u8..100)
        .prop_map(|(dollars, cents)| Decimal::new((dollars * 100 + cents as u64) as i64, 2))
}

fn quantity_strategy() -> impl Strategy<Value = i32> {
    1i32..10_000
}

fn percentage_strategy() -> impl Strategy<Value = Decimal> {
    (0u32..=10_000).prop_map(|basis_points| Decimal::new(basis_points as i64, 2))
}

fn discount_type_strategy() -> impl Strategy<Value = DiscountType> {
    prop_oneof![
        Just(DiscountType::None),
        Just(DiscountType::Fixed),
        Just(DiscountType::Percentage),
    ]
}

// Property: a line with no discount keeps its full subtotal
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn none_discount_type_charges_full_subtotal(
        unit_price in price_strategy(),
        ignored_discount in price_strategy(),
        quantity in quantity_strategy(),
    ) {
        let summary =
            calculate_price_summary(unit_price, DiscountType::None, ignored_discount, quantity);
        prop_assert_eq!(summary.discount, Decimal::ZERO);
        prop_assert_eq!(summary.total, summary.sub_total);
    }
}

// Property: percentages in [0, 100] never discount more than the subtotal
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn valid_percentage_never_exceeds_subtotal(
        unit_price in price_strategy(),
        percentage in percentage_strategy(),
        quantity in quantity_strategy(),
    ) {
        let summary =
            calculate_price_summary(unit_price, DiscountType::Percentage, percentage, quantity);
        prop_assert!(
            summary.discount <= summary.sub_total,
            "discount {} exceeds subtotal {}",
            summary.discount,
            summary.sub_total
        );
        prop_assert!(!summary.total.is_sign_negative(), "total went negative");
    }
}

// Property: the money identity holds for every discount type, including
// fixed discounts that overflow the line value
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn total_identity_holds_after_rounding(
        unit_price in price_strategy(),
        discount_type in discount_type_strategy(),
        discount in price_strategy(),
        quantity in quantity_strategy(),
    ) {
        let summary = calculate_price_summary(unit_price, discount_type, discount, quantity);
        prop_assert_eq!(summary.total, summary.sub_total - summary.discount);
        prop_assert!(summary.discount >= Decimal::ZERO);
        prop_assert!(summary.discount <= summary.sub_total);
        prop_assert!(summary.total >= Decimal::ZERO);
        prop_assert_eq!(summary.sub_total, summary.sub_total.round_dp(2));
        prop_assert_eq!(summary.discount, summary.discount.round_dp(2));
    }

    #[test]
    fn fixed_overflow_clamps_to_free(
        unit_price in price_strategy(),
        extra in price_strategy(),
        quantity in quantity_strategy(),
    ) {
        // A per-unit fixed discount at or above the unit price zeroes the line.
        let summary = calculate_price_summary(
            unit_price,
            DiscountType::Fixed,
            unit_price + extra,
            quantity,
        );
        prop_assert_eq!(summary.discount, summary.sub_total);
        prop_assert_eq!(summary.total, Decimal::ZERO);
    }
}

// Property: payment URLs always carry the client secret exactly once
proptest! {
    #[test]
    fn payment_url_contains_secret_once(secret in "pi_[a-zA-Z0-9]{8,24}") {
        let url = build_payment_url("https://shop.example.com/pay", &secret);
        prop_assert_eq!(url.matches(&secret).count(), 1);
        prop_assert!(url.contains("payment_intent_client_secret="));
    }
}

// Property: status transitions are idempotent and terminal-safe
proptest! {
    #[test]
    fn transitions_never_apply_twice_or_leave_terminal(
        current_idx in 0usize..4,
        next_idx in 0usize..4,
    ) {
        use sportline_api::entities::order::OrderStatus;
        let statuses = [
            OrderStatus::WaitingPayment,
            OrderStatus::RetryPayment,
            OrderStatus::PaymentApproved,
            OrderStatus::Completed,
        ];
        let current = statuses[current_idx];
        let next = statuses[next_idx];

        if current == next {
            prop_assert!(!should_transition(current, next));
        }
        if current == OrderStatus::Completed {
            prop_assert!(!should_transition(current, next));
        }
    }
}
