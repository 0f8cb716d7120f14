//! Business services for the order-creation and payment-settlement workflow.

pub mod cart;
pub mod orders;
pub mod stock;
