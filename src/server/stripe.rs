//! Stripe webhook endpoint handler.
//!
//! Payment events are dispatched synchronously: Stripe retries on any
//! non-200, so once the signature checks out we must answer 200 no matter
//! what happens downstream. A processing failure here is logged for manual
//! follow-up; surfacing it as an error would trigger a retry storm against
//! an already-accepted event.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use crate::processor::{InboundEvent, process_event};
use crate::types::{EventId, Provider};
use crate::verify::verify_signature;

/// Header carrying the Stripe signature (`t=...,v1=...`).
const HEADER_SIGNATURE: &str = "stripe-signature";

/// Authentication failures on the Stripe endpoint.
///
/// The only error class that may produce a non-200 response; everything
/// after authentication is absorbed and logged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StripeWebhookError {
    #[error("Missing signature")]
    MissingSignature,

    #[error("Invalid signature")]
    InvalidSignature,
}

impl IntoResponse for StripeWebhookError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Stripe webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Required header: `stripe-signature` over the raw body
/// - Body: raw Stripe event envelope JSON
///
/// # Response
///
/// - 200 empty body: any outcome after successful authentication, including
///   internal processing failures
/// - 400 "Missing signature" / "Invalid signature": authentication failure,
///   nothing stored or enqueued
pub async fn stripe_webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StripeWebhookError> {
    let signature_header = headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StripeWebhookError::MissingSignature)?;

    // Verify against the raw bytes before touching the payload. The body
    // must not be re-serialized anywhere on this path or verification of
    // legitimate events would start failing.
    if !verify_signature(&body, signature_header, app_state.stripe_secret()) {
        warn!("invalid stripe webhook signature");
        return Err(StripeWebhookError::InvalidSignature);
    }

    // Authenticated from here on: every outcome is a 200.
    let envelope: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "authenticated stripe payload is not valid JSON, discarding");
            return Ok(StatusCode::OK);
        }
    };

    let Some(event_id) = envelope.get("id").and_then(|v| v.as_str()) else {
        warn!("authenticated stripe payload has no event id, discarding");
        return Ok(StatusCode::OK);
    };
    let event_type = envelope
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    debug!(event_id, event_type, "received stripe webhook");

    let event = InboundEvent {
        provider: Provider::Stripe,
        event_id: EventId::new(event_id),
        event_type: event_type.to_string(),
        payload: body.to_vec(),
        organization_id: None,
    };

    if let Err(e) = process_event(app_state.store(), app_state.registry(), &event).await {
        warn!(
            event_id,
            event_type,
            error = %e,
            "stripe event processing failed, needs manual follow-up"
        );
    }

    Ok(StatusCode::OK)
}
