use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        cart_line, order, order_item, payment, CartLine, Order, OrderModel, OrderItemModel,
        Payment,
    },
    entities::order::OrderStatus,
    errors::ServiceError,
    events::{Event, EventSender},
    payments::StripeGateway,
    services::{
        cart::{CartService, CartSummary},
        stock::{ReservationLine, StockService},
    },
};

/// Currency is fixed; no multi-currency support.
const CURRENCY: &str = "usd";

/// Result of a successful order creation: the persisted order, its item
/// snapshots, and the frontend payment redirect.
#[derive(Debug, Serialize)]
pub struct OrderWithPayment {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
    pub client_secret: String,
    pub payment_url: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentApprovedStatus {
    pub is_approved: bool,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct RetryPaymentResponse {
    pub is_payment_needed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Decides whether a webhook-driven status change may be applied. Duplicate
/// deliveries re-apply the current status (no-op) and nothing leaves a
/// terminal status.
pub fn should_transition(current: OrderStatus, next: OrderStatus) -> bool {
    current != next && !current.is_terminal()
}

/// Builds the frontend redirect that carries the intent's client secret.
pub fn build_payment_url(payment_page_url: &str, client_secret: &str) -> String {
    let separator = if payment_page_url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}payment_intent_client_secret={}",
        payment_page_url, separator, client_secret
    )
}

/// Order orchestration: cart-to-order conversion, payment-intent creation,
/// and the status queries the storefront polls.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    cart: CartService,
    stock: StockService,
    gateway: Arc<StripeGateway>,
    event_sender: Arc<EventSender>,
    payment_page_url: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        cart: CartService,
        stock: StockService,
        gateway: Arc<StripeGateway>,
        event_sender: Arc<EventSender>,
        payment_page_url: String,
    ) -> Self {
        Self {
            db,
            cart,
            stock,
            gateway,
            event_sender,
            payment_page_url,
        }
    }

    /// Converts the user's cart into a priced, stock-reserved order and
    /// creates the payment intent.
    ///
    /// Stock reservation and order/item persistence share one transaction:
    /// an insufficient line rolls everything back and no order exists. The
    /// gateway call runs after commit; if it fails the order stays in
    /// `WaitingPayment` with stock reserved and no payment row, ready for
    /// the retry flow.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn create_order(&self, user_id: Uuid) -> Result<OrderWithPayment, ServiceError> {
        let cart = self.cart.compute_cart(user_id).await?;
        if cart.is_empty() {
            return Err(ServiceError::NotFound("no items in cart".to_string()));
        }

        let (order, items) = self.persist_order(user_id, &cart).await?;
        self.event_sender.send_or_log(Event::OrderCreated(order.id)).await;

        let intent = self
            .gateway
            .create_payment_intent(order.total, order.id)
            .await?;

        let now = Utc::now();
        let payment_id = Uuid::new_v4();
        let payment_row = payment::ActiveModel {
            id: Set(payment_id),
            order_id: Set(order.id),
            amount: Set(order.total),
            currency: Set(CURRENCY.to_string()),
            gateway_payment_id: Set(intent.gateway_payment_id.clone()),
            client_secret: Set(intent.client_secret.clone()),
            webhook_intent_status: Set(intent.status.clone()),
            webhook_data: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        payment_row.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentIntentCreated {
                order_id: order.id,
                payment_id,
            })
            .await;

        self.clear_ordered_cart_lines(user_id, &cart).await?;

        info!(order_id = %order.id, total = %order.total, "order created");

        Ok(OrderWithPayment {
            payment_url: build_payment_url(&self.payment_page_url, &intent.client_secret),
            client_secret: intent.client_secret,
            order,
            items,
        })
    }

    /// Reserves stock and persists the order with its item snapshots, all in
    /// one transaction. Low-stock alerts collected during reservation are
    /// published only once the transaction has committed.
    async fn persist_order(
        &self,
        user_id: Uuid,
        cart: &CartSummary,
    ) -> Result<(OrderModel, Vec<OrderItemModel>), ServiceError> {
        let txn = self.db.begin().await?;

        let reservations: Vec<ReservationLine> = cart
            .items
            .iter()
            .map(|item| ReservationLine {
                product_variation_id: item.product_variation_id,
                quantity: item.quantity,
            })
            .collect();
        let low_stock = self.stock.reserve_stock(&txn, &reservations).await?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_row = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            status: Set(OrderStatus::WaitingPayment),
            currency: Set(CURRENCY.to_string()),
            sub_total: Set(cart.sub_total),
            discount: Set(cart.discount),
            total: Set(cart.total),
            is_stock_reserved: Set(true),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order = order_row.insert(&txn).await?;

        let mut items = Vec::with_capacity(cart.items.len());
        for item in &cart.items {
            let row = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_variation_id: Set(item.product_variation_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.price.unit_price),
                sub_total: Set(item.price.sub_total),
                discount: Set(item.price.discount),
                total: Set(item.price.total),
                created_at: Set(now),
            };
            items.push(row.insert(&txn).await?);
        }

        txn.commit().await?;
        self.stock.publish_low_stock(&low_stock).await;
        Ok((order, items))
    }

    /// Deletes the cart lines that were just converted into order items.
    async fn clear_ordered_cart_lines(
        &self,
        user_id: Uuid,
        cart: &CartSummary,
    ) -> Result<(), ServiceError> {
        let variation_ids: Vec<Uuid> = cart
            .items
            .iter()
            .map(|item| item.product_variation_id)
            .collect();

        CartLine::delete_many()
            .filter(cart_line::Column::UserId.eq(user_id))
            .filter(cart_line::Column::ProductVariationId.is_in(variation_ids))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Whether payment has been approved for the order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn payment_approved_status(
        &self,
        order_id: Uuid,
    ) -> Result<PaymentApprovedStatus, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        Ok(PaymentApprovedStatus {
            is_approved: order.status.is_payment_approved(),
            status: order.status,
        })
    }

    /// Re-derives the payment redirect from the order's most recent payment
    /// intent. Does not call the gateway again: the existing intent is
    /// reusable until it settles.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn retry_payment(&self, order_id: Uuid) -> Result<RetryPaymentResponse, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status.is_payment_approved() {
            return Ok(RetryPaymentResponse {
                is_payment_needed: false,
                payment_url: None,
                client_secret: None,
            });
        }

        let latest = Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_desc(payment::Column::CreatedAt)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No payment attempt for order {}", order_id))
            })?;

        Ok(RetryPaymentResponse {
            is_payment_needed: true,
            payment_url: Some(build_payment_url(
                &self.payment_page_url,
                &latest.client_secret,
            )),
            client_secret: Some(latest.client_secret),
        })
    }

    /// Applies a status transition from the webhook reconciler. Idempotent:
    /// re-applying the current status is a no-op, and a `Completed` order is
    /// never transitioned.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn transition_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<(), ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        if !should_transition(old_status, new_status) {
            if old_status.is_terminal() && old_status != new_status {
                warn!(
                    order_id = %order_id,
                    ?old_status,
                    ?new_status,
                    "ignoring transition out of terminal status"
                );
            }
            return Ok(());
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        info!(order_id = %order_id, ?old_status, ?new_status, "order status changed");
        Ok(())
    }
}
