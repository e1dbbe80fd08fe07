//! Google Calendar push notification validation.
//!
//! Calendar push channels carry no cryptographic signature. Authenticity is
//! approximated by the channel token we supplied at subscription time, which
//! Google echoes back verbatim in `X-Goog-Channel-Token` on every
//! notification. The token has the shape `{organization_id}:{secret}`, letting
//! us re-derive tenant identity without a lookup on the hot path.

use thiserror::Error;

use crate::types::OrganizationId;

/// Delimiter between the organization id and the secret in a channel token.
const TOKEN_DELIMITER: char = ':';

/// Errors from channel token validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Token is missing the delimiter or has an empty half.
    #[error("malformed channel token")]
    MalformedToken,
}

/// Claims recovered from a channel token.
///
/// Note: only the *shape* of the token is validated here. The secret half is
/// not yet compared against the stored per-subscription secret, so these
/// claims prove the sender knows the token format, not that it is Google.
// TODO: compare `secret` against the Integration record's stored channel
// secret once the integrations store exposes a lookup by channel id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelClaims {
    /// Tenant the subscription belongs to.
    pub organization_id: OrganizationId,
    /// Shared secret half of the token.
    pub secret: String,
}

/// Parses a channel token into its claims.
///
/// The token must contain the `:` delimiter with non-empty halves on both
/// sides. The secret may itself contain `:` characters; only the first
/// delimiter splits.
pub fn parse_channel_token(token: &str) -> Result<ChannelClaims, TokenError> {
    let (organization_id, secret) = token
        .split_once(TOKEN_DELIMITER)
        .ok_or(TokenError::MalformedToken)?;

    if organization_id.is_empty() || secret.is_empty() {
        return Err(TokenError::MalformedToken);
    }

    Ok(ChannelClaims {
        organization_id: OrganizationId::new(organization_id),
        secret: secret.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_well_formed_token() {
        let claims = parse_channel_token("org_42:s3cret").unwrap();
        assert_eq!(claims.organization_id.as_str(), "org_42");
        assert_eq!(claims.secret, "s3cret");
    }

    #[test]
    fn secret_may_contain_delimiter() {
        // Only the first ':' splits; the rest belongs to the secret.
        let claims = parse_channel_token("org_42:a:b:c").unwrap();
        assert_eq!(claims.organization_id.as_str(), "org_42");
        assert_eq!(claims.secret, "a:b:c");
    }

    #[test]
    fn rejects_token_without_delimiter() {
        assert_eq!(
            parse_channel_token("org_42_nodelim"),
            Err(TokenError::MalformedToken)
        );
    }

    #[test]
    fn rejects_empty_organization_half() {
        assert_eq!(parse_channel_token(":secret"), Err(TokenError::MalformedToken));
    }

    #[test]
    fn rejects_empty_secret_half() {
        assert_eq!(parse_channel_token("org_42:"), Err(TokenError::MalformedToken));
    }

    #[test]
    fn rejects_empty_token() {
        assert_eq!(parse_channel_token(""), Err(TokenError::MalformedToken));
        assert_eq!(parse_channel_token(":"), Err(TokenError::MalformedToken));
    }

    proptest! {
        /// Any token with non-empty halves round-trips its organization id.
        #[test]
        fn prop_well_formed_tokens_parse(
            org in "[a-zA-Z0-9_-]{1,30}",
            secret in "[a-zA-Z0-9_:-]{1,60}",
        ) {
            let token = format!("{}:{}", org, secret);
            let claims = parse_channel_token(&token).unwrap();
            prop_assert_eq!(claims.organization_id.as_str(), org.as_str());
            prop_assert_eq!(claims.secret, secret);
        }

        /// Parsing never panics on arbitrary input.
        #[test]
        fn prop_no_panic(token: String) {
            let _ = parse_channel_token(&token);
        }

        /// Tokens without a delimiter are always rejected.
        #[test]
        fn prop_delimiterless_rejected(token in "[a-zA-Z0-9_-]{0,40}") {
            prop_assert_eq!(parse_channel_token(&token), Err(TokenError::MalformedToken));
        }
    }
}
