use sea_orm::{
    sea_query::{Expr, ExprTrait}, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{product_variation, ProductVariation},
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{notify_low_stock_detached, LowStockNotifier},
};

/// One stock decrement to apply.
#[derive(Debug, Clone, Copy)]
pub struct ReservationLine {
    pub product_variation_id: Uuid,
    pub quantity: i32,
}

/// A variation whose stock dropped into the alert band during reservation.
/// Collected inside the transaction, published only after commit.
#[derive(Debug, Clone, Copy)]
pub struct LowStockAlert {
    pub product_variation_id: Uuid,
    pub remaining: i32,
}

/// Stock reservation service. Decrements run inside the caller's transaction,
/// each guarded by `stock >= quantity`, so an insufficient line aborts the
/// whole order with nothing committed.
#[derive(Clone)]
pub struct StockService {
    event_sender: Arc<EventSender>,
    notifier: Arc<dyn LowStockNotifier>,
    low_stock_threshold: i32,
}

impl StockService {
    pub fn new(
        event_sender: Arc<EventSender>,
        notifier: Arc<dyn LowStockNotifier>,
        low_stock_threshold: i32,
    ) -> Self {
        Self {
            event_sender,
            notifier,
            low_stock_threshold,
        }
    }

    /// Atomically reserves stock for every line, using conditional updates:
    ///
    /// `UPDATE product_variations SET stock = stock - qty
    ///  WHERE id = ? AND stock >= qty`
    ///
    /// A zero-row update means the variation vanished or stock ran out under
    /// a concurrent order; the returned error rolls back the caller's
    /// transaction. Low-stock hits (remaining 1 or 2) are returned, not
    /// published: the caller hands them to [`StockService::publish_low_stock`]
    /// after the transaction commits, so a later rollback never leaks an
    /// alert for stock that was not actually reserved.
    #[instrument(skip(self, conn))]
    pub async fn reserve_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        lines: &[ReservationLine],
    ) -> Result<Vec<LowStockAlert>, ServiceError> {
        let mut alerts = Vec::new();
        for line in lines {
            if line.quantity <= 0 {
                return Err(ServiceError::InvalidOperation(format!(
                    "non-positive quantity for variation {}",
                    line.product_variation_id
                )));
            }

            let result = ProductVariation::update_many()
                .col_expr(
                    product_variation::Column::Stock,
                    Expr::col(product_variation::Column::Stock).sub(line.quantity),
                )
                .col_expr(
                    product_variation::Column::UpdatedAt,
                    Expr::value(chrono::Utc::now()),
                )
                .filter(product_variation::Column::Id.eq(line.product_variation_id))
                .filter(product_variation::Column::Stock.gte(line.quantity))
                .exec(conn)
                .await?;

            if result.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "variation {} cannot cover quantity {}",
                    line.product_variation_id, line.quantity
                )));
            }

            let remaining = ProductVariation::find_by_id(line.product_variation_id)
                .one(conn)
                .await?
                .map(|v| v.stock)
                .unwrap_or(0);

            info!(
                product_variation_id = %line.product_variation_id,
                quantity = line.quantity,
                remaining,
                "stock reserved"
            );

            if self.is_low_stock(remaining) {
                alerts.push(LowStockAlert {
                    product_variation_id: line.product_variation_id,
                    remaining,
                });
            }
        }

        Ok(alerts)
    }

    /// Publishes the alerts collected by a committed reservation: one event
    /// per variation plus a detached notification with its own error boundary.
    pub async fn publish_low_stock(&self, alerts: &[LowStockAlert]) {
        for alert in alerts {
            self.event_sender
                .send_or_log(Event::LowStock {
                    product_variation_id: alert.product_variation_id,
                    remaining: alert.remaining,
                })
                .await;
            notify_low_stock_detached(
                self.notifier.clone(),
                alert.product_variation_id,
                alert.remaining,
            );
        }
    }

    /// Whether a post-decrement stock level should raise a low-stock alert.
    pub fn is_low_stock(&self, remaining: i32) -> bool {
        remaining > 0 && remaining < self.low_stock_threshold
    }
}
