//! Authorization code redemption
//!
//! [`CodeRedeemer`] turns a provider callback into verified [`Claims`].
//! [`OidcRedeemer`] is the OpenID Connect implementation: it checks the
//! callback parameters, exchanges the code at the token endpoint, and
//! verifies the returned `id_token`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use tokio::sync::RwLock;
use url::Url;

use crate::auth::claims::Claims;
use crate::auth::discovery::{fetch_jwks, ProviderEndpoints};
use crate::config::ApplicationConfig;
use crate::error::{RedeemError, Result};

/// Exchanges a provider callback for verified identity claims.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeRedeemer: Send + Sync {
    /// Redeems the authorization code carried by `callback_url`.
    ///
    /// # Arguments
    ///
    /// * `saved_state` - State token stored in the session at flow start
    /// * `callback_url` - Full URL the provider redirected the browser to
    ///
    /// # Errors
    ///
    /// Returns a [`RedeemError`] describing why no claims were produced.
    async fn redeem(
        &self,
        saved_state: &str,
        callback_url: &Url,
    ) -> std::result::Result<Claims, RedeemError>;
}

// ---------------------------------------------------------------------------
// Token endpoint payloads
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// OidcRedeemer
// ---------------------------------------------------------------------------

/// OpenID Connect authorization code redeemer.
///
/// `id_token`s signed with RS*, PS*, or ES* algorithms are verified against
/// the provider's key set, refetched once when a token names an unknown key.
/// HS256 tokens are verified with the client secret.
pub struct OidcRedeemer {
    http: reqwest::Client,
    token_endpoint: Url,
    jwks_uri: Option<Url>,
    jwks: RwLock<JwkSet>,
    issuer: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    timeout: Duration,
}

impl OidcRedeemer {
    /// Creates a redeemer with an already loaded key set.
    pub fn new(
        http: reqwest::Client,
        app: &ApplicationConfig,
        endpoints: &ProviderEndpoints,
        jwks: JwkSet,
    ) -> Self {
        Self {
            http,
            token_endpoint: endpoints.token_endpoint.clone(),
            jwks_uri: endpoints.jwks_uri.clone(),
            jwks: RwLock::new(jwks),
            issuer: app.provider.issuer.clone(),
            client_id: app.provider.client_id.clone(),
            client_secret: app.provider.client_secret.clone(),
            redirect_uri: app.redirect_uri(),
            timeout: Duration::from_secs(app.redeem_timeout_seconds),
        }
    }

    /// Creates a redeemer, loading the provider's key set when it has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be fetched.
    pub async fn connect(
        http: reqwest::Client,
        app: &ApplicationConfig,
        endpoints: &ProviderEndpoints,
    ) -> Result<Self> {
        let jwks = match &endpoints.jwks_uri {
            Some(uri) => fetch_jwks(&http, uri).await?,
            None => JwkSet { keys: Vec::new() },
        };
        Ok(Self::new(http, app, endpoints, jwks))
    }

    async fn exchange(&self, code: &str) -> std::result::Result<String, RedeemError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let resp = self
            .http
            .post(self.token_endpoint.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| RedeemError::Transport(format!("token exchange request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<TokenErrorResponse>(&body);
            return Err(match parsed {
                Ok(err) => RedeemError::Provider {
                    error: err.error,
                    description: err.error_description,
                },
                Err(_) => RedeemError::Provider {
                    error: status.to_string(),
                    description: (!body.is_empty()).then_some(body),
                },
            });
        }

        let raw: TokenResponse = resp
            .json()
            .await
            .map_err(|e| RedeemError::Transport(format!("failed to parse token response: {e}")))?;

        tracing::debug!(
            token_type = raw.token_type.as_deref().unwrap_or(""),
            has_access_token = raw.access_token.is_some(),
            expires_in = raw.expires_in,
            "Token endpoint answered"
        );

        raw.id_token
            .filter(|token| !token.is_empty())
            .ok_or(RedeemError::MissingIdToken)
    }

    async fn verify(&self, id_token: &str) -> std::result::Result<Claims, RedeemError> {
        let header =
            decode_header(id_token).map_err(|e| RedeemError::Verification(e.to_string()))?;

        let key = match header.alg {
            Algorithm::HS256 => {
                if self.client_secret.is_empty() {
                    return Err(RedeemError::Verification(
                        "HS256 id_token but no client secret configured".to_string(),
                    ));
                }
                DecodingKey::from_secret(self.client_secret.as_bytes())
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
            | Algorithm::ES256
            | Algorithm::ES384 => self.signing_key(&header).await?,
            other => {
                return Err(RedeemError::Verification(format!(
                    "unsupported id_token algorithm {other:?}"
                )))
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.client_id.as_str()]);

        let data = decode::<serde_json::Value>(id_token, &key, &validation)
            .map_err(|e| RedeemError::Verification(e.to_string()))?;

        let mut claims: Claims = serde_json::from_value(data.claims)
            .map_err(|e| RedeemError::MalformedClaims(e.to_string()))?;
        claims.raw_token = Some(id_token.to_string());
        Ok(claims)
    }

    async fn signing_key(&self, header: &Header) -> std::result::Result<DecodingKey, RedeemError> {
        let kid = header.kid.as_deref();
        if let Some(jwk) = self.find_jwk(kid).await {
            return decoding_key(&jwk);
        }

        let Some(uri) = &self.jwks_uri else {
            return Err(RedeemError::Verification(
                "provider has no jwks_uri".to_string(),
            ));
        };

        tracing::debug!(kid = kid.unwrap_or(""), "Unknown signing key, refetching key set");
        let fresh = fetch_jwks(&self.http, uri)
            .await
            .map_err(|e| RedeemError::Verification(e.to_string()))?;
        *self.jwks.write().await = fresh;

        match self.find_jwk(kid).await {
            Some(jwk) => decoding_key(&jwk),
            None => Err(RedeemError::Verification(format!(
                "no signing key for kid {}",
                kid.unwrap_or("<none>")
            ))),
        }
    }

    /// A key named by `kid`, or the only key of the set when no kid is given.
    async fn find_jwk(&self, kid: Option<&str>) -> Option<Jwk> {
        let jwks = self.jwks.read().await;
        match kid {
            Some(kid) => jwks.find(kid).cloned(),
            None if jwks.keys.len() == 1 => jwks.keys.first().cloned(),
            None => None,
        }
    }

    async fn exchange_and_verify(&self, code: &str) -> std::result::Result<Claims, RedeemError> {
        let id_token = self.exchange(code).await?;
        self.verify(&id_token).await
    }
}

fn decoding_key(jwk: &Jwk) -> std::result::Result<DecodingKey, RedeemError> {
    DecodingKey::from_jwk(jwk).map_err(|e| RedeemError::Verification(e.to_string()))
}

#[async_trait]
impl CodeRedeemer for OidcRedeemer {
    async fn redeem(
        &self,
        saved_state: &str,
        callback_url: &Url,
    ) -> std::result::Result<Claims, RedeemError> {
        let params = callback_params(callback_url);
        let param = |name: &str| params.get(name).map(String::as_str).unwrap_or("");

        let state = param("state");
        if state.is_empty() {
            return Err(RedeemError::BlankState);
        }
        if state != saved_state {
            return Err(RedeemError::StateMismatch);
        }

        let error = param("error");
        if !error.is_empty() {
            return Err(RedeemError::Provider {
                error: error.to_string(),
                description: params.get("error_description").cloned(),
            });
        }

        let code = param("code");
        if code.is_empty() {
            return Err(RedeemError::BlankCode);
        }

        tokio::time::timeout(self.timeout, self.exchange_and_verify(code))
            .await
            .map_err(|_| RedeemError::Timeout(self.timeout.as_secs()))?
    }
}

/// Callback query parameters; the first occurrence of a name wins.
fn callback_params(url: &Url) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}
