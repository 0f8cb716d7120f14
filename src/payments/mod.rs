//! Payment gateway boundary: outbound intent creation and inbound webhook
//! verification. This is the only module that talks to the payment provider.

pub mod gateway;
pub mod webhook;

pub use gateway::{PaymentIntent, StripeGateway};
pub use webhook::{verify_and_parse, WebhookEvent, SIGNATURE_HEADER};
