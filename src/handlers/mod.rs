//! Thin axum handlers over the business services.

pub mod health;
pub mod orders;
pub mod stripe_webhook;
