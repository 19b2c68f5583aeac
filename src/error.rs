//! Error types for the outpost
//!
//! This module defines the error types used throughout the crate, using
//! `thiserror` for ergonomic error handling. Code redemption has its own
//! [`RedeemError`] so the flow controller can log the precise cause while
//! mapping every variant to the same client-facing response.

use thiserror::Error;

/// Main error type for outpost operations
///
/// This enum covers configuration loading, provider discovery, state token
/// handling, session persistence, and the transport and serialization
/// failures underneath them.
#[derive(Error, Debug)]
pub enum OutpostError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// OpenID provider discovery or key retrieval errors
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// State token creation or parsing errors
    #[error("State error: {0}")]
    State(String),

    /// Session store errors
    #[error("Session error: {0}")]
    Session(String),

    /// Authorization code redemption errors
    #[error("Redemption error: {0}")]
    Redemption(#[from] RedeemError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JWT encoding/decoding errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Reasons an authorization code could not be redeemed for claims.
///
/// The flow controller treats all of them as "redemption failed" and answers
/// `400 Bad Request`.
#[derive(Error, Debug)]
pub enum RedeemError {
    /// The callback carried no `state` parameter
    #[error("blank state")]
    BlankState,

    /// The callback `state` does not match the state held in the session
    #[error("invalid state")]
    StateMismatch,

    /// The provider answered with an error, either on the callback or from
    /// the token endpoint
    #[error("provider error: {error}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Provider {
        /// OAuth error code or HTTP status
        error: String,
        /// Optional human-readable description from the provider
        description: Option<String>,
    },

    /// The callback carried no `code` parameter
    #[error("blank code")]
    BlankCode,

    /// The token endpoint could not be reached
    #[error("token exchange transport failed: {0}")]
    Transport(String),

    /// The exchange did not finish within the configured timeout
    #[error("token exchange timed out after {0}s")]
    Timeout(u64),

    /// The token response did not include an `id_token`
    #[error("missing id_token in token response")]
    MissingIdToken,

    /// The `id_token` signature, issuer, audience, or expiry did not verify
    #[error("id_token verification failed: {0}")]
    Verification(String),

    /// The verified token could not be decoded into claims
    #[error("malformed claims: {0}")]
    MalformedClaims(String),
}

/// Result type alias for outpost operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
