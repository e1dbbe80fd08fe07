//! HTTP intake surface for provider webhooks.
//!
//! One endpoint per provider plus a liveness probe:
//!
//! - `POST /webhooks/stripe` - payment events, verified and dispatched inline
//! - `POST /webhooks/google` - calendar pushes, validated and enqueued
//! - `GET /health` - returns 200 if the server is running
//!
//! Handlers hold no mutable state; everything they need is injected through
//! [`AppState`] at router construction.

use std::sync::Arc;

pub mod google;
pub mod health;
pub mod stripe;

pub use google::google_webhook_handler;
pub use health::health_handler;
pub use stripe::stripe_webhook_handler;

use crate::processor::ProcessorRegistry;
use crate::queue::WebhookQueue;
use crate::store::EventStore;

/// Shared application state, passed to all handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Processed-event store, consulted for dedup on the synchronous path.
    store: EventStore,

    /// Durable queue for asynchronous providers.
    queue: WebhookQueue,

    /// Provider processors for synchronous inline dispatch.
    registry: ProcessorRegistry,

    /// Stripe webhook signing secret.
    stripe_secret: Vec<u8>,
}

impl AppState {
    pub fn new(
        store: EventStore,
        queue: WebhookQueue,
        registry: ProcessorRegistry,
        stripe_secret: impl Into<Vec<u8>>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                store,
                queue,
                registry,
                stripe_secret: stripe_secret.into(),
            }),
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.inner.store
    }

    pub fn queue(&self) -> &WebhookQueue {
        &self.inner.queue
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.inner.registry
    }

    pub fn stripe_secret(&self) -> &[u8] {
        &self.inner.stripe_secret
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhooks/stripe", post(stripe_webhook_handler))
        .route("/webhooks/google", post(google_webhook_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
