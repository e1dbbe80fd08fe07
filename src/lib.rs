//! Webhook intake and idempotent delivery.
//!
//! Accepts provider webhooks (Stripe payments, Google Calendar push),
//! authenticates them at the edge, buffers them in a durable at-least-once
//! queue, and dispatches each event exactly once in effect through a
//! processed-event store keyed by idempotency key.

pub mod config;
pub mod durable;
pub mod processor;
pub mod queue;
pub mod server;
pub mod store;
pub mod sweeper;
pub mod types;
pub mod verify;
