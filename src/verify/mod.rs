//! Per-provider authenticity checks for inbound webhooks.
//!
//! Each provider authenticates differently: Stripe signs the raw body with
//! HMAC-SHA256, Google Calendar echoes back an opaque channel token. Both
//! variants answer only "is this request authentic/well-formed" — they never
//! mutate state and never perform idempotency checks.

pub mod google;
pub mod stripe;

pub use google::{ChannelClaims, TokenError, parse_channel_token};
pub use stripe::{compute_signature, format_signature_header, parse_signature_header, verify_signature};
