use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{cart_line, CartLine, CartLineModel, ProductVariationModel},
    errors::ServiceError,
    pricing::{calculate_price_summary, PriceSummary},
};

/// One orderable cart line with its price breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct CartItem {
    pub cart_line_id: Uuid,
    pub product_variation_id: Uuid,
    pub quantity: i32,
    #[serde(flatten)]
    pub price: PriceSummary,
}

/// The priced cart view: surviving lines plus summed totals.
#[derive(Debug, Clone, Serialize)]
pub struct CartSummary {
    pub items: Vec<CartItem>,
    pub sub_total: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl CartSummary {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            sub_total: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Read-time validity filter: a line only appears in the cart view while its
/// variation is live and the requested quantity is coverable by stock. The
/// stored line is left untouched.
pub fn line_is_orderable(line: &CartLineModel, variation: &ProductVariationModel) -> bool {
    line.quantity > 0 && variation.is_purchasable() && line.quantity <= variation.stock
}

/// Prices a set of joined cart lines. Pure; the database round-trip lives in
/// [`CartService::compute_cart`].
pub fn summarize_lines(lines: &[(CartLineModel, ProductVariationModel)]) -> CartSummary {
    let mut summary = CartSummary::empty();

    for (line, variation) in lines {
        if !line_is_orderable(line, variation) {
            continue;
        }

        let price = calculate_price_summary(
            variation.price,
            variation.discount_type,
            variation.discount,
            line.quantity,
        );

        summary.sub_total += price.sub_total;
        summary.discount += price.discount;
        summary.total += price.total;
        summary.items.push(CartItem {
            cart_line_id: line.id,
            product_variation_id: variation.id,
            quantity: line.quantity,
            price,
        });
    }

    summary
}

/// Cart aggregation service. Side-effect free; safe to call repeatedly.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Loads the user's cart lines with their variations, drops invalid
    /// lines, and prices the rest. An empty or fully filtered cart yields
    /// all-zero totals.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn compute_cart(&self, user_id: Uuid) -> Result<CartSummary, ServiceError> {
        let lines = CartLine::find()
            .filter(cart_line::Column::UserId.eq(user_id))
            .find_also_related(crate::entities::ProductVariation)
            .all(&*self.db)
            .await?;

        let joined: Vec<_> = lines
            .into_iter()
            .filter_map(|(line, variation)| variation.map(|v| (line, v)))
            .collect();

        Ok(summarize_lines(&joined))
    }
}
