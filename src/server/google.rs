//! Google Calendar push endpoint handler.
//!
//! Calendar pushes must be acknowledged within Google's SLA (3 seconds), so
//! this handler does no business work: it validates the channel headers,
//! recovers the tenant from the channel token, durably enqueues, and returns.
//! Processing happens in the queue consumer.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::queue::{QueueError, QueuedWebhookMessage};
use crate::types::{EventId, Provider};
use crate::verify::parse_channel_token;

/// Channel identity headers Google sends with every notification.
const HEADER_CHANNEL_ID: &str = "x-goog-channel-id";
const HEADER_CHANNEL_TOKEN: &str = "x-goog-channel-token";
const HEADER_RESOURCE_STATE: &str = "x-goog-resource-state";
/// Monotonic per-channel counter; absent on some notification kinds.
const HEADER_MESSAGE_NUMBER: &str = "x-goog-message-number";
/// Optional resource identification headers, forwarded when present.
const HEADER_RESOURCE_ID: &str = "x-goog-resource-id";
const HEADER_RESOURCE_URI: &str = "x-goog-resource-uri";

/// Errors that can occur when accepting a calendar push.
#[derive(Debug, Error)]
pub enum GoogleWebhookError {
    /// A required channel header is missing or not valid UTF-8.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// Channel token failed shape validation.
    #[error("malformed channel token")]
    MalformedToken,

    /// Durable enqueue failed. Surfaced as a 500 so Google redelivers
    /// rather than the event being silently dropped.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl IntoResponse for GoogleWebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            GoogleWebhookError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            GoogleWebhookError::MalformedToken => StatusCode::UNAUTHORIZED,
            GoogleWebhookError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

/// Google Calendar push handler.
///
/// # Request
///
/// - Method: POST
/// - Required headers: `X-Goog-Channel-ID`, `X-Goog-Channel-Token`
///   (`{organizationId}:{secret}`), `X-Goog-Resource-State`;
///   `X-Goog-Message-Number` defaults to `0` when absent
/// - Body: ignored (pushes carry no event data)
///
/// # Response
///
/// - 200 empty body: enqueued, or `sync` handshake no-op
/// - 400: missing channel headers
/// - 401: malformed channel token
/// - 500: enqueue failure (Google redelivers)
pub async fn google_webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    _body: Bytes,
) -> Result<StatusCode, GoogleWebhookError> {
    let channel_id = get_header(&headers, HEADER_CHANNEL_ID)?;
    let token = get_header(&headers, HEADER_CHANNEL_TOKEN)?;
    let resource_state = get_header(&headers, HEADER_RESOURCE_STATE)?;
    let message_number = headers
        .get(HEADER_MESSAGE_NUMBER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("0")
        .to_string();

    // The sync handshake announces a new channel; there is nothing to
    // process and Google only needs the acknowledgment.
    if resource_state == "sync" {
        debug!(channel_id, "calendar channel sync handshake");
        return Ok(StatusCode::OK);
    }

    let claims = parse_channel_token(&token).map_err(|_| {
        warn!(channel_id, "malformed calendar channel token");
        GoogleWebhookError::MalformedToken
    })?;

    // Channel id plus message number identifies one notification; Google
    // redeliveries reuse both, so redeliveries dedup at processing time.
    let event_id = EventId::new(format!("{channel_id}:{message_number}"));

    let mut forwarded = BTreeMap::from([
        (HEADER_CHANNEL_ID.to_string(), channel_id.clone()),
        (HEADER_RESOURCE_STATE.to_string(), resource_state.clone()),
        (HEADER_MESSAGE_NUMBER.to_string(), message_number),
    ]);
    for optional in [HEADER_RESOURCE_ID, HEADER_RESOURCE_URI] {
        if let Some(value) = headers.get(optional).and_then(|v| v.to_str().ok()) {
            forwarded.insert(optional.to_string(), value.to_string());
        }
    }

    let message = QueuedWebhookMessage {
        provider: Provider::GoogleCalendar,
        event_id: event_id.clone(),
        payload: Vec::new(),
        headers: forwarded,
        organization_id: Some(claims.organization_id.clone()),
    };

    match app_state.queue().enqueue(&message) {
        Ok(entry) => {
            info!(
                channel_id,
                event_id = %event_id,
                resource_state,
                organization_id = %claims.organization_id,
                entry_id = %entry.entry_id,
                "calendar push enqueued"
            );
            Ok(StatusCode::OK)
        }
        Err(e) => {
            warn!(channel_id, event_id = %event_id, error = %e, "failed to enqueue calendar push");
            Err(GoogleWebhookError::Queue(e))
        }
    }
}

/// Extracts a required header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, GoogleWebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(GoogleWebhookError::MissingHeader(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_header_present() {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-channel-id", "chan-1".parse().unwrap());

        assert_eq!(get_header(&headers, "x-goog-channel-id").unwrap(), "chan-1");
    }

    #[test]
    fn get_header_missing() {
        let headers = HeaderMap::new();

        let result = get_header(&headers, "x-goog-channel-id");
        assert!(matches!(result, Err(GoogleWebhookError::MissingHeader(_))));
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            GoogleWebhookError::MissingHeader("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GoogleWebhookError::MalformedToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
