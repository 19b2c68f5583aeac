//! Diagnostics server
//!
//! A separate listener exposing the outpost's routes, application settings,
//! and live session count. Only started when `debug.enabled` is set.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::config::{Config, ProxyMode, AUTH_CALLBACK_PATH, AUTH_CHECK_PATH, AUTH_START_PATH};
use crate::server::{Registry, PING_PATH};

/// Routes served by the diagnostics server, in index order
pub const DEBUG_ROUTES: &[&str] = &["/debug/routes", "/debug/config", "/debug/sessions", "/"];

/// Application settings as shown by `/debug/config`; secrets are left out.
#[derive(Debug, Serialize)]
pub struct ApplicationSummary {
    pub name: String,
    pub mode: ProxyMode,
    pub external_host: String,
    pub cookie_domain: Option<String>,
    pub session_name: String,
    pub issuer: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Starts the diagnostics server in the background when enabled.
///
/// Bind and serve failures are logged; the outpost keeps running.
pub fn spawn(config: &Config, registry: Arc<Registry>) {
    if !config.debug.enabled {
        tracing::info!("not enabling diagnostics server, set `OUTPOST_DEBUG` to `true` to enable it");
        return;
    }

    let listen = config.debug.listen.clone();
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&listen).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::warn!(listen = %listen, error = %e, "failed to start diagnostics server");
                return;
            }
        };
        tracing::info!(listen = %listen, "Starting diagnostics server");
        if let Err(e) = axum::serve(listener, create_debug_router(registry)).await {
            tracing::warn!(error = %e, "diagnostics server stopped");
        }
    });
}

/// Creates the diagnostics router.
pub fn create_debug_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/debug/routes", get(routes))
        .route("/debug/config", get(applications))
        .route("/debug/sessions", get(sessions))
        .route("/", get(index))
        .with_state(registry)
}

async fn index() -> Response {
    let body: String = DEBUG_ROUTES
        .iter()
        .map(|route| format!("<a href='{route}'>{route}</a><br>"))
        .collect();
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
}

/// Plain listing of the main router's paths per application host.
async fn routes(State(registry): State<Arc<Registry>>) -> String {
    let mut lines = vec![format!("* {PING_PATH}")];
    for app in registry.applications() {
        let host = &app.config().external_host;
        for path in [AUTH_START_PATH, AUTH_CALLBACK_PATH, AUTH_CHECK_PATH] {
            lines.push(format!("{} {}{}", app.name(), host.trim_end_matches('/'), path));
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

async fn applications(State(registry): State<Arc<Registry>>) -> Json<Vec<ApplicationSummary>> {
    let summaries = registry
        .applications()
        .iter()
        .map(|app| {
            let config = app.config();
            ApplicationSummary {
                name: config.name.clone(),
                mode: config.mode,
                external_host: config.external_host.clone(),
                cookie_domain: config.cookie_domain.clone(),
                session_name: config.session_name(),
                issuer: config.provider.issuer.clone(),
                client_id: config.provider.client_id.clone(),
                redirect_uri: config.redirect_uri(),
                scopes: config.provider.scopes.clone(),
            }
        })
        .collect();
    Json(summaries)
}

async fn sessions(State(registry): State<Arc<Registry>>) -> Json<serde_json::Value> {
    let count = registry.store().count().await;
    Json(serde_json::json!({ "sessions": count }))
}
