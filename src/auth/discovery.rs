//! OpenID Connect discovery for provider endpoints and signing keys
//!
//! Applications may configure their provider endpoints explicitly. Any
//! endpoint left out is filled from the provider's discovery document,
//! fetched once at startup.
//!
//! # Discovery sequence
//!
//! 1. [`resolve_endpoints`] returns early when every endpoint is configured.
//! 2. Otherwise [`fetch_provider_metadata`] tries the well-known URIs built
//!    by [`build_discovery_urls`] in order and keeps the first document that
//!    parses.
//! 3. Configured endpoints override discovered ones.
//! 4. [`fetch_jwks`] loads the key set used to verify `id_token` signatures.

use std::collections::HashMap;

use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ProviderConfig;
use crate::error::{OutpostError, Result};

const OPENID_CONFIGURATION: &str = ".well-known/openid-configuration";

// ---------------------------------------------------------------------------
// Provider metadata
// ---------------------------------------------------------------------------

/// OpenID provider metadata document.
///
/// # References
///
/// - OpenID Connect Discovery 1.0 <https://openid.net/specs/openid-connect-discovery-1_0.html>
///
/// # Examples
///
/// ```
/// use outpost_auth::auth::discovery::ProviderMetadata;
///
/// let json = r#"{
///     "issuer": "https://id.example.com/",
///     "authorization_endpoint": "https://id.example.com/authorize",
///     "token_endpoint": "https://id.example.com/token",
///     "jwks_uri": "https://id.example.com/jwks"
/// }"#;
///
/// let meta: ProviderMetadata = serde_json::from_str(json).unwrap();
/// assert_eq!(meta.token_endpoint, "https://id.example.com/token");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderMetadata {
    /// Issuer identifier of the provider.
    pub issuer: String,

    /// Authorization endpoint the browser is sent to.
    pub authorization_endpoint: String,

    /// Token endpoint codes are redeemed at.
    pub token_endpoint: String,

    /// JSON Web Key Set document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Algorithms the provider may sign `id_token`s with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,

    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Endpoints an application talks to, after discovery and overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    /// Absent for providers that only sign with the client secret
    pub jwks_uri: Option<Url>,
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Builds the ordered list of discovery document URLs for an issuer.
///
/// 1. `<issuer>/.well-known/openid-configuration` (path appending)
/// 2. `/.well-known/openid-configuration` (root, only when the issuer has a
///    path)
fn build_discovery_urls(issuer: &Url) -> Vec<Url> {
    let mut candidates = Vec::with_capacity(2);

    let path = issuer.path().trim_end_matches('/');
    let mut appended = issuer.clone();
    appended.set_query(None);
    appended.set_fragment(None);
    appended.set_path(&format!("{}/{}", path, OPENID_CONFIGURATION));
    candidates.push(appended);

    if !path.is_empty() {
        let mut root = issuer.clone();
        root.set_query(None);
        root.set_fragment(None);
        root.set_path(&format!("/{}", OPENID_CONFIGURATION));
        candidates.push(root);
    }

    candidates
}

/// Fetches the provider metadata document for an issuer.
///
/// Candidates from [`build_discovery_urls`] are tried in order; transport
/// failures, non-success statuses, and unparseable bodies move on to the
/// next candidate.
///
/// # Errors
///
/// Returns [`OutpostError::Discovery`] if no candidate yields a document.
///
/// # Examples
///
/// ```no_run
/// use url::Url;
/// use outpost_auth::auth::discovery::fetch_provider_metadata;
///
/// # async fn example() -> outpost_auth::error::Result<()> {
/// let http = reqwest::Client::new();
/// let issuer = Url::parse("https://id.example.com/application/o/wiki/")?;
/// let meta = fetch_provider_metadata(&http, &issuer).await?;
/// println!("token endpoint: {}", meta.token_endpoint);
/// # Ok(())
/// # }
/// ```
pub async fn fetch_provider_metadata(
    http: &reqwest::Client,
    issuer: &Url,
) -> Result<ProviderMetadata> {
    for candidate in build_discovery_urls(issuer) {
        let resp = match http.get(candidate.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url = %candidate, error = %e, "Discovery request failed");
                continue;
            }
        };

        if !resp.status().is_success() {
            tracing::debug!(url = %candidate, status = %resp.status(), "Discovery candidate rejected");
            continue;
        }

        match resp.json::<ProviderMetadata>().await {
            Ok(meta) => return Ok(meta),
            Err(e) => {
                tracing::debug!(url = %candidate, error = %e, "Discovery document did not parse");
            }
        }
    }

    Err(OutpostError::Discovery(format!(
        "provider metadata not found for issuer {}",
        issuer
    ))
    .into())
}

/// Resolves the endpoints of a provider, discovering whatever is not
/// configured.
///
/// # Errors
///
/// Returns [`OutpostError::Discovery`] if discovery is needed and fails, or
/// if any resulting endpoint is not a valid URL.
pub async fn resolve_endpoints(
    http: &reqwest::Client,
    provider: &ProviderConfig,
) -> Result<ProviderEndpoints> {
    let discovered = if provider.is_fully_configured() {
        None
    } else {
        let issuer = parse_endpoint("issuer", &provider.issuer)?;
        let meta = fetch_provider_metadata(http, &issuer).await?;
        tracing::info!(issuer = %provider.issuer, "Discovered provider endpoints");
        Some(meta)
    };

    let pick = |configured: &Option<String>, found: Option<&str>| -> Option<String> {
        configured.clone().or_else(|| found.map(str::to_string))
    };

    let authorization_endpoint = pick(
        &provider.authorization_endpoint,
        discovered.as_ref().map(|m| m.authorization_endpoint.as_str()),
    )
    .ok_or_else(|| OutpostError::Discovery("no authorization_endpoint".to_string()))?;
    let token_endpoint = pick(
        &provider.token_endpoint,
        discovered.as_ref().map(|m| m.token_endpoint.as_str()),
    )
    .ok_or_else(|| OutpostError::Discovery("no token_endpoint".to_string()))?;
    let jwks_uri = pick(
        &provider.jwks_uri,
        discovered.as_ref().and_then(|m| m.jwks_uri.as_deref()),
    );

    Ok(ProviderEndpoints {
        authorization_endpoint: parse_endpoint("authorization_endpoint", &authorization_endpoint)?,
        token_endpoint: parse_endpoint("token_endpoint", &token_endpoint)?,
        jwks_uri: jwks_uri
            .map(|uri| parse_endpoint("jwks_uri", &uri))
            .transpose()?,
    })
}

fn parse_endpoint(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| {
        OutpostError::Discovery(format!("invalid {} {}: {}", field, value, e)).into()
    })
}

/// Fetches the provider's JSON Web Key Set.
///
/// # Errors
///
/// Returns [`OutpostError::Discovery`] if the request fails, the endpoint
/// answers with a non-success status, or the body is not a key set.
pub async fn fetch_jwks(http: &reqwest::Client, jwks_uri: &Url) -> Result<JwkSet> {
    let resp = http
        .get(jwks_uri.clone())
        .send()
        .await
        .map_err(|e| OutpostError::Discovery(format!("jwks fetch failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(OutpostError::Discovery(format!(
            "jwks endpoint returned {}: {}",
            resp.status(),
            jwks_uri
        ))
        .into());
    }

    let jwks: JwkSet = resp
        .json()
        .await
        .map_err(|e| OutpostError::Discovery(format!("failed to parse jwks: {e}")))?;

    tracing::debug!(keys = jwks.keys.len(), url = %jwks_uri, "Loaded provider signing keys");
    Ok(jwks)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
