//! Authentication core of the outpost
//!
//! This module implements the OAuth 2.0 / OpenID Connect authorization code
//! flow used to authenticate browsers in front of protected applications.
//!
//! # Sub-modules
//!
//! - [`redirect`] - Validation of post-login redirect targets
//! - [`state`] - Signed per-flow state tokens
//! - [`session`] - Session store trait, in-memory store, and cookie handling
//! - [`claims`] - Identity claims kept in authenticated sessions
//! - [`discovery`] - Provider metadata and key set retrieval
//! - [`redeem`] - Authorization code redemption and `id_token` verification
//! - [`application`] - The start, callback, and check handlers

pub mod application;
pub mod claims;
pub mod discovery;
pub mod redeem;
pub mod redirect;
pub mod session;
pub mod state;

pub use application::Application;
pub use claims::Claims;
pub use redeem::{CodeRedeemer, OidcRedeemer};
pub use session::{MaxAge, MemoryStore, Session, SessionData, SessionStore, Sessions};

/// Marks a request as the provider's callback, whatever its path
pub const CALLBACK_SIGNATURE: &str = "X-Outpost-Auth-Callback";

/// Marks a request as a logout request
pub const LOGOUT_SIGNATURE: &str = "X-Outpost-Logout";

/// Query parameter carrying the post-login redirect target
pub const REDIRECT_PARAM: &str = "rd";

/// Forwarded username of an authenticated request
pub const HEADER_USER: &str = "x-outpost-user";

/// Forwarded email of an authenticated request
pub const HEADER_EMAIL: &str = "x-outpost-email";

/// Forwarded groups of an authenticated request, `|` separated
pub const HEADER_GROUPS: &str = "x-outpost-groups";
