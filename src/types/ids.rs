//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID kinds (e.g., using a
//! raw provider event id where a provider-qualified idempotency key is
//! expected) and make the code more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A webhook provider, as a closed set.
///
/// Adding a provider means adding a variant here and registering a processor
/// for it in the [`ProcessorRegistry`](crate::processor::ProcessorRegistry);
/// there is no open-ended subclassing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Stripe payment events (synchronous dispatch).
    Stripe,
    /// Google Calendar push notifications (queued dispatch).
    GoogleCalendar,
}

impl Provider {
    /// Returns the provider tag used in idempotency keys and directory names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::GoogleCalendar => "google_calendar",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A provider-scoped event identifier (e.g., Stripe's `evt_...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(s: impl Into<String>) -> Self {
        EventId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        EventId(s)
    }
}

/// A tenant identifier, recovered from a provider channel token at intake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn new(s: impl Into<String>) -> Self {
        OrganizationId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The globally unique key under which a processed event is recorded.
///
/// Format: `{provider}:{provider_event_id}`. Presence of a stored record for
/// a key means "already fully processed — must not re-run side effects".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Builds the provider-qualified key for an event.
    pub fn from_parts(provider: Provider, event_id: &EventId) -> Self {
        IdempotencyKey(format!("{}:{}", provider.as_str(), event_id.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IdempotencyKey {
    fn from(s: String) -> Self {
        IdempotencyKey(s)
    }
}

/// A durable queue entry identifier, minted at enqueue time.
///
/// Distinct from [`EventId`]: a provider redelivery of the same event produces
/// a second entry with its own `EntryId`. Deduplication happens at processing
/// time against the event store, never in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new(s: impl Into<String>) -> Self {
        EntryId(s.into())
    }

    /// Mints a fresh random entry id.
    pub fn generate() -> Self {
        EntryId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        EntryId(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod provider {
        use super::*;

        #[test]
        fn tags_are_stable() {
            assert_eq!(Provider::Stripe.as_str(), "stripe");
            assert_eq!(Provider::GoogleCalendar.as_str(), "google_calendar");
        }

        #[test]
        fn serde_roundtrip() {
            for provider in [Provider::Stripe, Provider::GoogleCalendar] {
                let json = serde_json::to_string(&provider).unwrap();
                let parsed: Provider = serde_json::from_str(&json).unwrap();
                assert_eq!(provider, parsed);
            }
        }

        #[test]
        fn serializes_as_snake_case_tag() {
            let json = serde_json::to_string(&Provider::GoogleCalendar).unwrap();
            assert_eq!(json, "\"google_calendar\"");
        }
    }

    mod idempotency_key {
        use super::*;
        use proptest::prelude::*;

        #[test]
        fn format_is_provider_qualified() {
            let key = IdempotencyKey::from_parts(Provider::Stripe, &EventId::new("evt_123"));
            assert_eq!(key.as_str(), "stripe:evt_123");
        }

        #[test]
        fn same_event_id_different_providers_differ() {
            let id = EventId::new("abc");
            let k1 = IdempotencyKey::from_parts(Provider::Stripe, &id);
            let k2 = IdempotencyKey::from_parts(Provider::GoogleCalendar, &id);
            assert_ne!(k1, k2);
        }

        proptest! {
            #[test]
            fn deterministic(id in "[a-zA-Z0-9_:-]{1,40}") {
                let event_id = EventId::new(&id);
                let k1 = IdempotencyKey::from_parts(Provider::Stripe, &event_id);
                let k2 = IdempotencyKey::from_parts(Provider::Stripe, &event_id);
                prop_assert_eq!(k1, k2);
            }

            #[test]
            fn different_event_ids_different_keys(
                a in "[a-zA-Z0-9_-]{1,40}",
                b in "[a-zA-Z0-9_-]{1,40}",
            ) {
                prop_assume!(a != b);
                let k1 = IdempotencyKey::from_parts(Provider::Stripe, &EventId::new(&a));
                let k2 = IdempotencyKey::from_parts(Provider::Stripe, &EventId::new(&b));
                prop_assert_ne!(k1, k2);
            }

            #[test]
            fn serde_roundtrip(id in "[a-zA-Z0-9_-]{1,40}") {
                let key = IdempotencyKey::from_parts(Provider::GoogleCalendar, &EventId::new(&id));
                let json = serde_json::to_string(&key).unwrap();
                let parsed: IdempotencyKey = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(key, parsed);
            }
        }
    }

    mod entry_id {
        use super::*;

        #[test]
        fn generate_produces_unique_ids() {
            let a = EntryId::generate();
            let b = EntryId::generate();
            assert_ne!(a, b);
        }

        #[test]
        fn serde_roundtrip() {
            let id = EntryId::generate();
            let json = serde_json::to_string(&id).unwrap();
            let parsed: EntryId = serde_json::from_str(&json).unwrap();
            assert_eq!(id, parsed);
        }
    }
}
