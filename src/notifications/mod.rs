use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery error: {0}")]
    Delivery(String),
}

/// Trigger contract for low-stock alerts. Email delivery itself lives outside
/// this crate; implementations only need to hand the alert off.
#[async_trait]
pub trait LowStockNotifier: Send + Sync {
    async fn notify_low_stock(
        &self,
        product_variation_id: Uuid,
        remaining: i32,
    ) -> Result<(), NotificationError>;
}

/// Default notifier: records the alert in the structured log stream, where an
/// external email worker picks it up.
#[derive(Debug, Default, Clone)]
pub struct LoggingLowStockNotifier;

#[async_trait]
impl LowStockNotifier for LoggingLowStockNotifier {
    async fn notify_low_stock(
        &self,
        product_variation_id: Uuid,
        remaining: i32,
    ) -> Result<(), NotificationError> {
        info!(
            product_variation_id = %product_variation_id,
            remaining,
            "low stock alert"
        );
        Ok(())
    }
}

/// Fires a low-stock notification on a detached task with its own error
/// boundary. Never blocks or fails the caller.
pub fn notify_low_stock_detached(
    notifier: Arc<dyn LowStockNotifier>,
    product_variation_id: Uuid,
    remaining: i32,
) {
    tokio::spawn(async move {
        if let Err(e) = notifier
            .notify_low_stock(product_variation_id, remaining)
            .await
        {
            error!(
                product_variation_id = %product_variation_id,
                error = %e,
                "low stock notification failed"
            );
        }
    });
}
