//! Sportline API Library
//!
//! Order-creation and payment-settlement core for a sports-apparel shop:
//! cart pricing, stock reservation, order orchestration, and Stripe webhook
//! reconciliation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod notifications;
pub mod payments;
pub mod pricing;
pub mod services;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{
    config::AppConfig,
    events::EventSender,
    notifications::LoggingLowStockNotifier,
    payments::StripeGateway,
    services::{cart::CartService, orders::OrderService, stock::StockService},
    webhooks::WebhookReconciler,
};

/// Shared application state for the axum router.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub orders: OrderService,
    pub cart: CartService,
    pub reconciler: WebhookReconciler,
}

impl AppState {
    /// Wires every service against the given connection and config.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: EventSender,
    ) -> Result<Self, errors::ServiceError> {
        let event_sender = Arc::new(event_sender);
        let gateway = Arc::new(StripeGateway::new(&config.stripe)?);

        let cart = CartService::new(db.clone());
        let stock = StockService::new(
            event_sender.clone(),
            Arc::new(LoggingLowStockNotifier),
            config.low_stock_threshold,
        );
        let orders = OrderService::new(
            db.clone(),
            cart.clone(),
            stock,
            gateway,
            event_sender.clone(),
            config.stripe.payment_page_url.clone(),
        );
        let reconciler = WebhookReconciler::new(
            db.clone(),
            orders.clone(),
            event_sender.clone(),
            config.stripe.webhook_secret.clone(),
        );

        Ok(Self {
            db,
            config,
            event_sender,
            orders,
            cart,
            reconciler,
        })
    }
}

/// Builds the HTTP router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/orders", post(handlers::orders::create_order))
        .route(
            "/orders/:id/payment-status",
            get(handlers::orders::payment_status),
        )
        .route(
            "/orders/:id/retry-payment",
            post(handlers::orders::retry_payment),
        )
        .route("/stripe/webhook", post(handlers::stripe_webhook::stripe_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
