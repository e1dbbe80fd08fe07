//! Core domain types shared across the intake pipeline.

mod ids;

pub use ids::{EntryId, EventId, IdempotencyKey, OrganizationId, Provider};
