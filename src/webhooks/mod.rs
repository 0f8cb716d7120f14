//! Webhook reconciliation: provider-pushed payment events drive order and
//! payment state, tolerating duplicate and out-of-order deliveries.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    entities::{order::OrderStatus, payment, Payment, PaymentModel},
    errors::ServiceError,
    events::{Event, EventSender},
    payments::webhook::{verify_and_parse, WebhookEvent},
    services::orders::OrderService,
};

/// Maps a provider event type onto an order-status transition. Anything not
/// listed is acknowledged and ignored.
pub fn transition_for(event_type: &str) -> Option<OrderStatus> {
    match event_type {
        "payment_intent.succeeded" => Some(OrderStatus::PaymentApproved),
        "payment_intent.payment_failed" => Some(OrderStatus::RetryPayment),
        _ => None,
    }
}

#[derive(Clone)]
pub struct WebhookReconciler {
    db: Arc<DatabaseConnection>,
    orders: OrderService,
    event_sender: Arc<EventSender>,
    webhook_secret: String,
}

impl WebhookReconciler {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: OrderService,
        event_sender: Arc<EventSender>,
        webhook_secret: String,
    ) -> Self {
        Self {
            db,
            orders,
            event_sender,
            webhook_secret,
        }
    }

    /// Consumes one raw webhook delivery.
    ///
    /// Signature verification failure is `Forbidden` with nothing mutated.
    /// After verification, persistence failures are logged and swallowed so
    /// the provider always receives success — re-delivering the event would
    /// not help, and provider-side retry storms are worse than a missed
    /// internal update. Duplicate deliveries re-apply the same status, which
    /// is a no-op.
    #[instrument(skip(self, raw_body, signature_header))]
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<(), ServiceError> {
        let header = signature_header
            .ok_or_else(|| ServiceError::Forbidden("missing signature header".into()))?;
        let event = verify_and_parse(raw_body, header, &self.webhook_secret)?;

        info!(event_id = %event.id, event_type = %event.event_type, "webhook received");

        // Best-effort payment-row sync happens first, regardless of type.
        let matched_payment = self.sync_payment_status(&event).await;

        let Some(new_status) = transition_for(&event.event_type) else {
            info!(event_type = %event.event_type, "unhandled webhook event type");
            return Ok(());
        };

        let Some(payment_row) = matched_payment else {
            warn!(
                event_id = %event.id,
                gateway_payment_id = ?event.gateway_payment_id,
                "no payment row matches webhook event"
            );
            return Ok(());
        };

        if let Err(e) = self
            .orders
            .transition_status(payment_row.order_id, new_status)
            .await
        {
            warn!(
                order_id = %payment_row.order_id,
                error = %e,
                "order status update from webhook failed"
            );
        }

        Ok(())
    }

    /// Writes the event's raw intent status onto the matching payment row.
    /// Zero or one row may match; failures are logged, never fatal.
    async fn sync_payment_status(&self, event: &WebhookEvent) -> Option<PaymentModel> {
        let gateway_payment_id = event.gateway_payment_id.as_deref()?;

        let found = Payment::find()
            .filter(payment::Column::GatewayPaymentId.eq(gateway_payment_id))
            .one(&*self.db)
            .await;

        let row = match found {
            Ok(Some(row)) => row,
            Ok(None) => {
                warn!(gateway_payment_id, "webhook references unknown payment");
                return None;
            }
            Err(e) => {
                warn!(gateway_payment_id, error = %e, "payment lookup failed");
                return None;
            }
        };

        let Some(intent_status) = event.intent_status.clone() else {
            return Some(row);
        };

        let mut active: payment::ActiveModel = row.clone().into();
        active.webhook_intent_status = Set(intent_status.clone());
        active.webhook_data = Set(Some(event.payload.clone()));
        active.updated_at = Set(Utc::now());

        match active.update(&*self.db).await {
            Ok(updated) => {
                self.event_sender
                    .send_or_log(Event::PaymentStatusSynced {
                        gateway_payment_id: gateway_payment_id.to_string(),
                        intent_status,
                    })
                    .await;
                Some(updated)
            }
            Err(e) => {
                warn!(gateway_payment_id, error = %e, "payment status sync failed");
                // The stale row still identifies the order for the transition
                Some(row)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StripeConfig;
    use crate::entities::{OrderModel, PaymentModel};
    use crate::notifications::LoggingLowStockNotifier;
    use crate::payments::webhook::sign_payload;
    use crate::payments::StripeGateway;
    use crate::services::{cart::CartService, stock::StockService};
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    const SECRET: &str = "whsec_reconciler";

    fn reconciler_with(
        db: sea_orm::DatabaseConnection,
    ) -> (WebhookReconciler, mpsc::Receiver<Event>) {
        let db = Arc::new(db);
        let (event_sender, rx) = crate::events::channel(8);
        let event_sender = Arc::new(event_sender);

        let cart = CartService::new(db.clone());
        let stock = StockService::new(event_sender.clone(), Arc::new(LoggingLowStockNotifier), 3);
        let gateway = Arc::new(
            StripeGateway::new(&StripeConfig {
                secret_key: "sk_test_abc".into(),
                webhook_secret: SECRET.into(),
                api_base_url: "http://127.0.0.1:9".into(),
                payment_page_url: "https://shop.example.com/pay".into(),
                timeout_secs: 1,
            })
            .unwrap(),
        );
        let orders = OrderService::new(
            db.clone(),
            cart,
            stock,
            gateway,
            event_sender.clone(),
            "https://shop.example.com/pay".into(),
        );

        (
            WebhookReconciler::new(db, orders, event_sender, SECRET.into()),
            rx,
        )
    }

    fn payment_row(order_id: Uuid, intent_status: &str) -> PaymentModel {
        PaymentModel {
            id: Uuid::new_v4(),
            order_id,
            amount: dec!(50),
            currency: "usd".into(),
            gateway_payment_id: "pi_dup".into(),
            client_secret: "pi_dup_secret".into(),
            webhook_intent_status: intent_status.into(),
            webhook_data: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn order_row(id: Uuid, status: OrderStatus) -> OrderModel {
        OrderModel {
            id,
            user_id: Uuid::new_v4(),
            status,
            currency: "usd".into(),
            sub_total: dec!(50),
            discount: dec!(0),
            total: dec!(50),
            is_stock_reserved: true,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_succeeded_delivery_is_idempotent() {
        let order_id = Uuid::new_v4();
        let pending = payment_row(order_id, "requires_payment_method");
        let mut synced = pending.clone();
        synced.webhook_intent_status = "succeeded".into();
        let waiting = order_row(order_id, OrderStatus::WaitingPayment);
        let approved = order_row(order_id, OrderStatus::PaymentApproved);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // first delivery: find payment, sync it, find order, transition
            .append_query_results([vec![pending]])
            .append_query_results([vec![synced.clone()]])
            .append_query_results([vec![waiting]])
            .append_query_results([vec![approved.clone()]])
            // second delivery: find payment, re-sync, find already-approved order
            .append_query_results([vec![synced.clone()]])
            .append_query_results([vec![synced]])
            .append_query_results([vec![approved]])
            .into_connection();
        let db_handle = db.clone();

        let (reconciler, mut rx) = reconciler_with(db);

        let body = serde_json::to_vec(&serde_json::json!({
            "id": "evt_dup",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_dup", "status": "succeeded" } }
        }))
        .unwrap();
        let header = sign_payload(&body, SECRET, Utc::now().timestamp());

        reconciler.handle(&body, Some(&header)).await.unwrap();
        reconciler.handle(&body, Some(&header)).await.unwrap();

        // The re-delivery re-syncs the payment row but applies no second
        // order transition: seven statements, not eight.
        assert_eq!(db_handle.into_transaction_log().len(), 7);

        assert_matches!(rx.try_recv(), Ok(Event::PaymentStatusSynced { .. }));
        assert_matches!(
            rx.try_recv(),
            Ok(Event::OrderStatusChanged {
                new_status: OrderStatus::PaymentApproved,
                ..
            })
        );
        assert_matches!(rx.try_recv(), Ok(Event::PaymentStatusSynced { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn succeeded_event_approves_payment() {
        assert_eq!(
            transition_for("payment_intent.succeeded"),
            Some(OrderStatus::PaymentApproved)
        );
    }

    #[test]
    fn failed_event_moves_to_retry() {
        assert_eq!(
            transition_for("payment_intent.payment_failed"),
            Some(OrderStatus::RetryPayment)
        );
    }

    #[test]
    fn other_event_types_are_ignored() {
        assert_eq!(transition_for("payment_intent.created"), None);
        assert_eq!(transition_for("charge.refunded"), None);
        assert_eq!(transition_for(""), None);
    }
}
