//! outpost-auth - forward-auth outpost library
//!
//! This library provides the authentication core of a forward-auth outpost:
//! it sends browsers through an OAuth 2.0 / OpenID Connect authorization code
//! flow with an external identity provider and authorizes later requests
//! from a locally issued session.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Redirect validation, state tokens, sessions, code redemption,
//!   and the per-application flow handlers
//! - `server`: Host-based routing and the HTTP listener
//! - `debug`: Optional diagnostics listener
//! - `config`: Configuration management and validation
//! - `logging`: Tracing subscriber setup
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use outpost_auth::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/outpost.yaml", &Default::default())?;
//!     config.validate()?;
//!     outpost_auth::server::run(config).await
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod config;
pub mod debug;
pub mod error;
pub mod logging;
pub mod server;

// Re-export commonly used types
pub use auth::{Application, Claims, CodeRedeemer, MemoryStore, SessionStore};
pub use config::Config;
pub use error::{OutpostError, RedeemError, Result};
