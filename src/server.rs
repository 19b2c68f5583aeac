//! HTTP server and request routing
//!
//! Requests are matched to an [`Application`] by the host they were sent
//! to. The auth start, callback, and check paths are routed to the matching
//! application's handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use url::Url;

use crate::auth::session::{spawn_expired_deletion, MemoryStore, SessionStore};
use crate::auth::{Application, CALLBACK_SIGNATURE};
use crate::config::{Config, ProxyMode, AUTH_CALLBACK_PATH, AUTH_CHECK_PATH, AUTH_START_PATH};
use crate::error::{OutpostError, Result};

/// Liveness check path
pub const PING_PATH: &str = "/outpost/ping";

const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_URI: &str = "x-forwarded-uri";

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Applications served by this outpost, indexed by host.
pub struct Registry {
    applications: Vec<Arc<Application>>,
    by_host: HashMap<String, Arc<Application>>,
    store: MemoryStore,
}

impl Registry {
    /// Indexes `applications` by the authority of their external host.
    pub fn new(applications: Vec<Application>, store: MemoryStore) -> Self {
        let applications: Vec<Arc<Application>> = applications.into_iter().map(Arc::new).collect();
        let mut by_host = HashMap::new();
        for app in &applications {
            match external_authority(&app.config().external_host) {
                Some(authority) => {
                    by_host.insert(authority, app.clone());
                }
                None => tracing::warn!(
                    application = app.name(),
                    external_host = %app.config().external_host,
                    "external host has no authority, application is unreachable by host"
                ),
            }
        }
        Self {
            applications,
            by_host,
            store,
        }
    }

    pub fn applications(&self) -> &[Arc<Application>] {
        &self.applications
    }

    /// Store shared by every application's sessions.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Finds the application serving `host`.
    ///
    /// Exact external host matches win; otherwise the first
    /// `forward_domain` application whose cookie domain covers the host.
    pub fn resolve(&self, host: &str) -> Option<&Arc<Application>> {
        let host = host.trim().to_ascii_lowercase();
        let bare = strip_port(&host);

        if let Some(app) = self.by_host.get(&host).or_else(|| self.by_host.get(bare)) {
            return Some(app);
        }

        self.applications.iter().find(|app| {
            let config = app.config();
            config.mode == ProxyMode::ForwardDomain
                && config.cookie_domain.as_deref().is_some_and(|domain| {
                    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                    !domain.is_empty()
                        && (bare == domain || bare.ends_with(&format!(".{domain}")))
                })
        })
    }
}

/// `host[:port]` of an external host URL, the port only when non-default.
fn external_authority(external_host: &str) -> Option<String> {
    let url = Url::parse(external_host).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split_once(']').map_or(host, |(h, _)| &host[..h.len() + 1]);
    }
    host.rsplit_once(':').map_or(host, |(h, _)| h)
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Creates the outpost router.
pub fn create_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route(PING_PATH, get(ping))
        .route(AUTH_START_PATH, get(auth_start))
        .route(AUTH_CALLBACK_PATH, get(auth_callback))
        .route(AUTH_CHECK_PATH, get(auth_check))
        .fallback(fallback)
        .with_state(registry)
}

async fn ping() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn auth_start(
    State(registry): State<Arc<Registry>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match route(&registry, &headers, &uri) {
        Ok((app, url)) => app.handle_auth_start(&headers, &url).await,
        Err(status) => status.into_response(),
    }
}

async fn auth_callback(
    State(registry): State<Arc<Registry>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match route(&registry, &headers, &uri) {
        Ok((app, url)) => app.handle_auth_callback(&headers, &url).await,
        Err(status) => status.into_response(),
    }
}

async fn auth_check(
    State(registry): State<Arc<Registry>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match route(&registry, &headers, &uri) {
        Ok((app, url)) => {
            let original = match app.config().mode {
                ProxyMode::Proxy => url,
                ProxyMode::ForwardSingle | ProxyMode::ForwardDomain => {
                    forwarded_url(&headers, &url)
                }
            };
            app.handle_auth_check(&headers, &original).await
        }
        Err(status) => status.into_response(),
    }
}

/// Requests on other paths are callbacks when they carry the callback
/// marker header.
async fn fallback(
    State(registry): State<Arc<Registry>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if headers.contains_key(CALLBACK_SIGNATURE) {
        return auth_callback(State(registry), uri, headers).await;
    }
    StatusCode::NOT_FOUND.into_response()
}

/// Resolves the application for a request and rebuilds its absolute URL.
fn route(
    registry: &Registry,
    headers: &HeaderMap,
    uri: &Uri,
) -> std::result::Result<(Arc<Application>, Url), StatusCode> {
    let Some(host) = request_host(headers) else {
        tracing::warn!(path = %uri.path(), "request without host");
        return Err(StatusCode::BAD_REQUEST);
    };

    let Some(app) = registry.resolve(host) else {
        tracing::warn!(host = %host, path = %uri.path(), "no application for host");
        return Err(StatusCode::NOT_FOUND);
    };

    let scheme = header_str(headers, X_FORWARDED_PROTO)
        .map(str::to_string)
        .unwrap_or_else(|| default_scheme(app));
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());

    match Url::parse(&format!("{scheme}://{host}{path_and_query}")) {
        Ok(url) => Ok((app.clone(), url)),
        Err(e) => {
            tracing::warn!(host = %host, error = %e, "could not rebuild request URL");
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

/// The URL the edge proxy is asking about, from `X-Forwarded-*` headers.
fn forwarded_url(headers: &HeaderMap, fallback: &Url) -> Url {
    let Some(host) = header_str(headers, X_FORWARDED_HOST) else {
        return fallback.clone();
    };
    let scheme = header_str(headers, X_FORWARDED_PROTO).unwrap_or(fallback.scheme());
    let uri = header_str(headers, X_FORWARDED_URI).unwrap_or("/");
    Url::parse(&format!("{scheme}://{host}{uri}")).unwrap_or_else(|_| fallback.clone())
}

fn request_host(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, X_FORWARDED_HOST).or_else(|| header_str(headers, "host"))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn default_scheme(app: &Application) -> String {
    if app.config().is_secure() {
        "https".to_string()
    } else {
        "http".to_string()
    }
}

// ---------------------------------------------------------------------------
// Serve
// ---------------------------------------------------------------------------

/// Builds every configured application and serves until shutdown.
///
/// # Errors
///
/// Returns an error if an application cannot be built or the listener
/// cannot be bound.
pub async fn run(config: Config) -> Result<()> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("outpost-auth/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| OutpostError::Config(format!("failed to build HTTP client: {e}")))?;
    let store = MemoryStore::new();
    let shared: Arc<dyn SessionStore> = Arc::new(store.clone());

    let mut applications = Vec::with_capacity(config.applications.len());
    for app_config in &config.applications {
        let app = Application::connect(
            app_config.clone(),
            shared.clone(),
            &config.session,
            http.clone(),
        )
        .await?;
        tracing::info!(application = app.name(), mode = %app_config.mode, "Application ready");
        applications.push(app);
    }

    let sweeper = spawn_expired_deletion(
        store.clone(),
        Duration::from_secs(config.session.cleanup_interval_seconds),
    );
    let registry = Arc::new(Registry::new(applications, store));
    crate::debug::spawn(&config, registry.clone());

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .map_err(|e| OutpostError::Config(format!("failed to bind {}: {e}", config.listen)))?;
    tracing::info!(listen = %config.listen, "Outpost listening");

    axum::serve(listener, create_router(registry))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    sweeper.abort();

    tracing::info!("Outpost stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::redeem::MockCodeRedeemer;
    use crate::config::{ApplicationConfig, ProviderConfig};

    fn app(name: &str, mode: ProxyMode, external_host: &str, cookie_domain: Option<&str>) -> Application {
        let config = ApplicationConfig {
            name: name.to_string(),
            mode,
            external_host: external_host.to_string(),
            cookie_domain: cookie_domain.map(str::to_string),
            cookie_secret: "secret".to_string(),
            session_name: None,
            provider: ProviderConfig {
                issuer: "https://id.example.com/".to_string(),
                client_id: name.to_string(),
                client_secret: "client-secret".to_string(),
                redirect_uri: None,
                scopes: vec!["openid".to_string()],
                authorization_endpoint: None,
                token_endpoint: None,
                jwks_uri: None,
            },
            redeem_timeout_seconds: 5,
        };
        Application::new(
            config,
            Url::parse("https://id.example.com/authorize").unwrap(),
            Arc::new(MemoryStore::new()),
            86_400,
            Arc::new(MockCodeRedeemer::new()),
        )
    }

    fn registry() -> Registry {
        Registry::new(
            vec![
                app("wiki", ProxyMode::Proxy, "https://wiki.example.com", None),
                app("dev", ProxyMode::ForwardSingle, "http://dev.test:8080/", None),
                app(
                    "sso",
                    ProxyMode::ForwardDomain,
                    "https://auth.corp.example",
                    Some(".corp.example"),
                ),
            ],
            MemoryStore::new(),
        )
    }

    #[test]
    fn test_resolve_exact_host() {
        let registry = registry();
        assert_eq!(registry.resolve("wiki.example.com").unwrap().name(), "wiki");
        assert_eq!(registry.resolve("WIKI.example.com:443").unwrap().name(), "wiki");
        assert_eq!(registry.resolve("dev.test:8080").unwrap().name(), "dev");
    }

    #[test]
    fn test_resolve_cookie_domain_host() {
        let registry = registry();
        assert_eq!(registry.resolve("auth.corp.example").unwrap().name(), "sso");
        assert_eq!(registry.resolve("grafana.corp.example").unwrap().name(), "sso");
        assert!(registry.resolve("evilcorp.example").is_none());
        assert!(registry.resolve("unknown.test").is_none());
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("a.test:80"), "a.test");
        assert_eq!(strip_port("a.test"), "a.test");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }

    #[test]
    fn test_forwarded_url() {
        let mut headers = HeaderMap::new();
        let fallback = Url::parse("https://auth.corp.example/outpost/auth/check").unwrap();
        assert_eq!(forwarded_url(&headers, &fallback), fallback);

        headers.insert(X_FORWARDED_HOST, "grafana.corp.example".parse().unwrap());
        headers.insert(X_FORWARDED_PROTO, "https".parse().unwrap());
        headers.insert(X_FORWARDED_URI, "/d/home?x=1".parse().unwrap());
        assert_eq!(
            forwarded_url(&headers, &fallback).as_str(),
            "https://grafana.corp.example/d/home?x=1"
        );
    }
}
