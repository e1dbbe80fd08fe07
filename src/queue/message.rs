//! The envelope buffered between intake and processing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{EventId, IdempotencyKey, OrganizationId, Provider};

/// A webhook accepted at intake, awaiting processing.
///
/// Owned by the queue from enqueue to successful ack; the processor only
/// reads it. `payload` is the raw request body and must round-trip byte-exact
/// for providers whose signature covers the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedWebhookMessage {
    /// Provider that delivered the event; selects the processor.
    pub provider: Provider,

    /// Provider-scoped event identifier.
    pub event_id: EventId,

    /// Raw request body bytes, untouched.
    pub payload: Vec<u8>,

    /// Subset of provider headers needed downstream (order irrelevant).
    pub headers: BTreeMap<String, String>,

    /// Tenant scope, when the provider's channel token carries one.
    pub organization_id: Option<OrganizationId>,
}

impl QueuedWebhookMessage {
    /// The idempotency key under which this message's processing is recorded.
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey::from_parts(self.provider, &self.event_id)
    }
}
