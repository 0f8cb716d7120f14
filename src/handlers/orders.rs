use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    auth::{AuthContext, Role},
    errors::ServiceError,
    services::orders::{OrderWithPayment, PaymentApprovedStatus, RetryPaymentResponse},
    AppState,
};

/// POST /orders — converts the caller's cart into an order.
pub async fn create_order(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<(StatusCode, Json<OrderWithPayment>), ServiceError> {
    ctx.require(Role::Client)?;
    let result = state.orders.create_order(ctx.user_id).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /orders/{id}/payment-status — polled by the storefront after redirect.
pub async fn payment_status(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(order_id): Path<Uuid>,
) -> Result<Json<PaymentApprovedStatus>, ServiceError> {
    ctx.require(Role::Client)?;
    let status = state.orders.payment_approved_status(order_id).await?;
    Ok(Json(status))
}

/// POST /orders/{id}/retry-payment — re-derives the payment redirect for an
/// unsettled order.
pub async fn retry_payment(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(order_id): Path<Uuid>,
) -> Result<Json<RetryPaymentResponse>, ServiceError> {
    ctx.require(Role::Client)?;
    let response = state.orders.retry_payment(order_id).await?;
    Ok(Json(response))
}
