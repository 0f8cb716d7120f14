use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode};

use crate::{errors::ServiceError, payments::SIGNATURE_HEADER, AppState};

/// POST /stripe/webhook — raw body plus `stripe-signature` header.
/// Unverifiable payloads get 403; everything else is acknowledged with 200
/// so the provider does not retry.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    state.reconciler.handle(&body, signature).await?;
    Ok(StatusCode::OK)
}
