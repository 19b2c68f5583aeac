//! Verified identity claims held in an authenticated session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity claims decoded from a verified provider `id_token`.
///
/// `exp` is carried verbatim from the token and drives the lifetime of the
/// session the claims are stored in.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use outpost_auth::auth::claims::Claims;
///
/// let claims = Claims {
///     sub: "user-1".to_string(),
///     exp: Utc::now().timestamp() + 3600,
///     ..Claims::default()
/// };
/// assert!(!claims.is_expired());
/// assert_eq!(claims.username(), "user-1");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier
    pub sub: String,

    /// Expiry, seconds since the Unix epoch
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    /// Provider session identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// The `id_token` the claims were decoded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_token: Option<String>,
}

impl Claims {
    /// Returns `true` once `exp` has been reached.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Seconds between `now` and `exp`.
    ///
    /// Non-positive values mean the claims are already expired and the
    /// session holding them must expire immediately.
    pub fn max_age_seconds(&self, now: DateTime<Utc>) -> i64 {
        self.exp.saturating_sub(now.timestamp())
    }

    /// Name forwarded to upstream applications.
    pub fn username(&self) -> &str {
        self.preferred_username.as_deref().unwrap_or(&self.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims_expiring_at(exp: i64) -> Claims {
        Claims {
            sub: "subject".to_string(),
            exp,
            ..Claims::default()
        }
    }

    #[test]
    fn test_max_age_for_one_hour_expiry() {
        let now = Utc::now();
        let claims = claims_expiring_at((now + Duration::seconds(3600)).timestamp());
        assert_eq!(claims.max_age_seconds(now), 3600);
    }

    #[test]
    fn test_max_age_is_non_positive_when_expired() {
        let now = Utc::now();
        let claims = claims_expiring_at((now - Duration::seconds(30)).timestamp());
        assert!(claims.max_age_seconds(now) <= 0);
        assert!(claims.is_expired());
    }

    #[test]
    fn test_max_age_saturates_for_extreme_exp() {
        let claims = claims_expiring_at(i64::MIN);
        assert!(claims.max_age_seconds(Utc::now()) < 0);
    }

    #[test]
    fn test_username_prefers_preferred_username() {
        let mut claims = claims_expiring_at(0);
        assert_eq!(claims.username(), "subject");
        claims.preferred_username = Some("akadmin".to_string());
        assert_eq!(claims.username(), "akadmin");
    }

    #[test]
    fn test_deserialize_id_token_payload_with_unknown_fields() {
        let json = r#"{
            "iss": "https://id.example.com/",
            "aud": "client",
            "sub": "abc",
            "exp": 1800000000,
            "email": "user@example.com",
            "email_verified": true,
            "groups": ["admins"],
            "nonce": "ignored"
        }"#;
        let claims: Claims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.sub, "abc");
        assert_eq!(claims.exp, 1_800_000_000);
        assert!(claims.email_verified);
        assert_eq!(claims.groups, vec!["admins"]);
        assert!(claims.raw_token.is_none());
    }
}
