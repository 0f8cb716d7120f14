//! Inbound webhook verification and parsing — the sole trust boundary for
//! payment-provider events. Unverifiable payloads never reach the reconciler.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the provider's payload signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum accepted age of a signed payload, in seconds. Guards against
/// replay of captured webhook deliveries.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// A verified, parsed provider event.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    /// Gateway payment-intent id, when the event carries one.
    pub gateway_payment_id: Option<String>,
    /// Raw intent status vocabulary from the provider.
    pub intent_status: Option<String>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

/// Parses `t=<unix>,v1=<hex>[,v1=<hex>...]`. Unknown schemes are ignored.
fn parse_signature_header(header: &str) -> Result<SignatureHeader, ServiceError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or_else(|| ServiceError::Forbidden("malformed signature header".into()))?;
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    ServiceError::Forbidden("malformed signature timestamp".into())
                })?)
            }
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| ServiceError::Forbidden("missing signature timestamp".into()))?;
    if signatures.is_empty() {
        return Err(ServiceError::Forbidden("missing v1 signature".into()));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn verify_at(
    raw_body: &[u8],
    signature_header: &str,
    webhook_secret: &str,
    now_unix: i64,
) -> Result<(), ServiceError> {
    let header = parse_signature_header(signature_header)?;

    if (now_unix - header.timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(ServiceError::Forbidden(
            "signature timestamp outside tolerance".into(),
        ));
    }

    for signature in &header.signatures {
        let expected = hex::decode(signature)
            .map_err(|_| ServiceError::Forbidden("malformed signature encoding".into()))?;

        let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("hmac init: {}", e)))?;
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(raw_body);

        // Constant-time comparison via the Mac trait
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(ServiceError::Forbidden("signature mismatch".into()))
}

/// Verifies the payload signature and parses the event envelope.
/// Verification failure is `Forbidden`; a verified but structurally invalid
/// payload is a validation error (the provider sent something we can't read).
pub fn verify_and_parse(
    raw_body: &[u8],
    signature_header: &str,
    webhook_secret: &str,
) -> Result<WebhookEvent, ServiceError> {
    verify_at(
        raw_body,
        signature_header,
        webhook_secret,
        chrono::Utc::now().timestamp(),
    )?;
    parse_event(raw_body)
}

fn parse_event(raw_body: &[u8]) -> Result<WebhookEvent, ServiceError> {
    let raw: RawEvent = serde_json::from_slice(raw_body)
        .map_err(|e| ServiceError::ValidationError(format!("webhook payload: {}", e)))?;

    let gateway_payment_id = raw.data.object.get("id").and_then(|v| v.as_str()).map(str::to_string);
    let intent_status = raw
        .data
        .object
        .get("status")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(WebhookEvent {
        id: raw.id,
        event_type: raw.event_type,
        gateway_payment_id,
        intent_status,
        payload: raw.data.object,
    })
}

/// Test-only signing helper mirroring the provider's signature scheme.
#[cfg(test)]
pub(crate) fn sign_payload(raw_body: &[u8], webhook_secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "whsec_test_secret";

    fn event_body(event_type: &str, intent_id: &str, status: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": { "id": intent_id, "status": status } }
        }))
        .unwrap()
    }

    #[test]
    fn valid_signature_verifies_and_parses() {
        let body = event_body("payment_intent.succeeded", "pi_42", "succeeded");
        let now = 1_700_000_000;
        let header = sign_payload(&body, SECRET, now);

        verify_at(&body, &header, SECRET, now).unwrap();
        let event = parse_event(&body).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.gateway_payment_id.as_deref(), Some("pi_42"));
        assert_eq!(event.intent_status.as_deref(), Some("succeeded"));
    }

    #[test]
    fn wrong_secret_is_forbidden() {
        let body = event_body("payment_intent.succeeded", "pi_42", "succeeded");
        let now = 1_700_000_000;
        let header = sign_payload(&body, "whsec_other", now);

        assert_matches!(
            verify_at(&body, &header, SECRET, now),
            Err(ServiceError::Forbidden(_))
        );
    }

    #[test]
    fn tampered_body_is_forbidden() {
        let body = event_body("payment_intent.succeeded", "pi_42", "succeeded");
        let now = 1_700_000_000;
        let header = sign_payload(&body, SECRET, now);
        let tampered = event_body("payment_intent.succeeded", "pi_evil", "succeeded");

        assert_matches!(
            verify_at(&tampered, &header, SECRET, now),
            Err(ServiceError::Forbidden(_))
        );
    }

    #[test]
    fn malformed_header_is_forbidden() {
        let body = event_body("payment_intent.succeeded", "pi_42", "succeeded");
        for header in ["", "garbage", "t=abc,v1=00", "v1=00", "t=123"] {
            assert_matches!(
                verify_at(&body, header, SECRET, 123),
                Err(ServiceError::Forbidden(_)),
                "header {:?} should be rejected",
                header
            );
        }
    }

    #[test]
    fn stale_timestamp_is_forbidden() {
        let body = event_body("payment_intent.succeeded", "pi_42", "succeeded");
        let signed_at = 1_700_000_000;
        let header = sign_payload(&body, SECRET, signed_at);

        assert_matches!(
            verify_at(&body, &header, SECRET, signed_at + SIGNATURE_TOLERANCE_SECS + 1),
            Err(ServiceError::Forbidden(_))
        );
        // Within tolerance still passes
        verify_at(&body, &header, SECRET, signed_at + SIGNATURE_TOLERANCE_SECS).unwrap();
    }

    #[test]
    fn extra_signature_schemes_are_ignored() {
        let body = event_body("payment_intent.payment_failed", "pi_9", "requires_payment_method");
        let now = 1_700_000_000;
        let header = format!("{},v0=deadbeef", sign_payload(&body, SECRET, now));

        verify_at(&body, &header, SECRET, now).unwrap();
    }

    #[test]
    fn event_without_intent_fields_parses() {
        let body = serde_json::to_vec(&serde_json::json!({
            "id": "evt_2",
            "type": "charge.refunded",
            "data": { "object": { "amount": 100 } }
        }))
        .unwrap();

        let event = parse_event(&body).unwrap();
        assert_eq!(event.event_type, "charge.refunded");
        assert!(event.gateway_payment_id.is_none());
        assert!(event.intent_status.is_none());
    }
}
