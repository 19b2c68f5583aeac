//! Signed OAuth state tokens
//!
//! The `state` parameter sent to the provider is an HS256 JWT signed with the
//! application's cookie secret. Besides a random nonce it carries the
//! validated post-login redirect target through the provider round trip. The
//! token is bound to the browser by being stored in its session and compared
//! exactly on callback.

use base64::Engine as _;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{OutpostError, Result};

/// Claims carried inside a state token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    /// `outpost-auth/<client_id>`
    pub iss: String,

    /// Random nonce, base64url without padding
    pub state: String,

    /// Validated post-login redirect target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

/// Mints and parses state tokens for one application.
#[derive(Clone)]
pub struct StateTokens {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for StateTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTokens")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl StateTokens {
    /// Creates a token manager for `client_id`, signing with `secret`.
    pub fn new(client_id: &str, secret: &str) -> Self {
        Self {
            issuer: format!("outpost-auth/{}", client_id),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mints a fresh state token.
    ///
    /// `redirect` must already be validated.
    ///
    /// # Errors
    ///
    /// Returns [`OutpostError::State`] if the token cannot be signed.
    ///
    /// # Examples
    ///
    /// ```
    /// use outpost_auth::auth::state::StateTokens;
    ///
    /// let tokens = StateTokens::new("wiki", "cookie-secret");
    /// let a = tokens.create(None).unwrap();
    /// let b = tokens.create(None).unwrap();
    /// assert_ne!(a, b);
    /// ```
    pub fn create(&self, redirect: Option<&Url>) -> Result<String> {
        let claims = OAuthState {
            iss: self.issuer.clone(),
            state: random_token(32),
            redirect: redirect.map(|u| u.to_string()),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| OutpostError::State(format!("failed to sign state: {e}")).into())
    }

    /// Verifies the signature and issuer of a state token and returns its
    /// claims.
    ///
    /// # Errors
    ///
    /// Returns [`OutpostError::State`] if the token is malformed, signed with
    /// another key, or minted for another client.
    pub fn parse(&self, token: &str) -> Result<OAuthState> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["iss"]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_exp = false;
        validation.validate_aud = false;

        let data = decode::<OAuthState>(token, &self.decoding_key, &validation)
            .map_err(|e| OutpostError::State(format!("invalid state token: {e}")))?;
        Ok(data.claims)
    }
}

/// Returns `bytes` random bytes encoded as unpadded base64url.
pub(crate) fn random_token(bytes: usize) -> String {
    use rand::RngCore as _;

    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}
