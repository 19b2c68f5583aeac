//! Per-application authentication flow
//!
//! An [`Application`] ties together the redirect validator, state tokens,
//! sessions, and code redemption of one protected backend and answers the
//! start, callback, and check requests routed to it.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::Instrument;
use url::Url;

use crate::auth::claims::Claims;
use crate::auth::discovery::resolve_endpoints;
use crate::auth::redeem::{CodeRedeemer, OidcRedeemer};
use crate::auth::redirect::check_redirect;
use crate::auth::session::{CookieSettings, MaxAge, Session, SessionStore, Sessions};
use crate::auth::state::StateTokens;
use crate::auth::{HEADER_EMAIL, HEADER_GROUPS, HEADER_USER, REDIRECT_PARAM};
use crate::config::{ApplicationConfig, SessionConfig, AUTH_START_PATH};
use crate::error::Result;

/// One protected backend and its authentication flow.
pub struct Application {
    config: ApplicationConfig,
    sessions: Sessions,
    redeemer: Arc<dyn CodeRedeemer>,
    states: StateTokens,
    authorization_endpoint: Url,
    span: tracing::Span,
}

impl Application {
    /// Creates an application from already resolved collaborators.
    pub fn new(
        config: ApplicationConfig,
        authorization_endpoint: Url,
        store: Arc<dyn SessionStore>,
        default_max_age: i64,
        redeemer: Arc<dyn CodeRedeemer>,
    ) -> Self {
        let sessions = Sessions::new(
            store,
            CookieSettings {
                name: config.session_name(),
                domain: config.cookie_domain.clone(),
                secure: config.is_secure(),
            },
            default_max_age,
        );
        let states = StateTokens::new(&config.provider.client_id, &config.cookie_secret);
        let span = tracing::info_span!("application", app = %config.name, mode = %config.mode);

        Self {
            config,
            sessions,
            redeemer,
            states,
            authorization_endpoint,
            span,
        }
    }

    /// Creates an application, discovering provider endpoints and loading
    /// signing keys as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery or the key set fetch fails.
    pub async fn connect(
        config: ApplicationConfig,
        store: Arc<dyn SessionStore>,
        session: &SessionConfig,
        http: reqwest::Client,
    ) -> Result<Self> {
        let endpoints = resolve_endpoints(&http, &config.provider).await?;
        let redeemer = OidcRedeemer::connect(http, &config, &endpoints).await?;
        Ok(Self::new(
            config,
            endpoints.authorization_endpoint,
            store,
            session.default_max_age_seconds,
            Arc::new(redeemer),
        ))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// Provider authorization URL carrying `state`.
    pub fn auth_code_url(&self, state: &str) -> Url {
        let mut url = self.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.config.provider.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri());
            if !self.config.provider.scopes.is_empty() {
                query.append_pair("scope", &self.config.provider.scopes.join(" "));
            }
            query.append_pair("state", state);
        }
        url
    }

    /// Claims of an authenticated session: present and not expired.
    pub fn check_auth<'a>(&self, session: &'a Session) -> Option<&'a Claims> {
        session.claims().filter(|claims| !claims.is_expired())
    }

    // -----------------------------------------------------------------------
    // Start
    // -----------------------------------------------------------------------

    /// Starts the authorization code flow.
    ///
    /// An authenticated session is sent straight to its target. A session
    /// with a flow in flight is sent to the provider again with the same
    /// state. Otherwise a new state is minted, stored, and sent.
    pub async fn handle_auth_start(&self, headers: &HeaderMap, request_url: &Url) -> Response {
        async {
            let mut session = self.load_session(headers).await;

            if self.check_auth(&session).is_some() {
                tracing::trace!("auth start request with existing authenticated session");
                return self.redirect(&session, request_url);
            }

            if let Some(state) = session.oauth_state() {
                tracing::trace!("session already has state, sending redirect to current state");
                return found(&self.auth_code_url(state), HeaderMap::new());
            }

            let target = self.redirect_param(request_url);
            let state = match self.states.create(target.as_ref()) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to create state");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            };
            session.set_oauth_state(state.clone());

            let mut response_headers = HeaderMap::new();
            if let Err(e) = self
                .sessions
                .save(&mut session, &mut response_headers, MaxAge::Default)
                .await
            {
                tracing::warn!(error = %e, "failed to save session");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }

            found(&self.auth_code_url(&state), response_headers)
        }
        .instrument(self.span.clone())
        .await
    }

    // -----------------------------------------------------------------------
    // Callback
    // -----------------------------------------------------------------------

    /// Completes the flow from the provider's callback.
    ///
    /// Every attempt clears the in-flight state. Success moves the session to
    /// a new id, stores the claims for as long as the `id_token` is valid,
    /// and redirects to the target; failure answers `400`.
    pub async fn handle_auth_callback(&self, headers: &HeaderMap, request_url: &Url) -> Response {
        async {
            let mut session = self.load_session(headers).await;

            let Some(saved_state) = session.oauth_state().map(str::to_string) else {
                tracing::warn!("No state saved in session");
                return self.redirect(&session, request_url);
            };

            let mut response_headers = HeaderMap::new();
            let claims = match self.redeemer.redeem(&saved_state, request_url).await {
                Ok(claims) => claims,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to redeem code");
                    session.remove_oauth_state();
                    if let Err(e) = self
                        .sessions
                        .save(&mut session, &mut response_headers, MaxAge::Default)
                        .await
                    {
                        tracing::warn!(error = %e, "failed to save session");
                    }
                    return (StatusCode::BAD_REQUEST, response_headers).into_response();
                }
            };

            let max_age = claims.max_age_seconds(Utc::now());
            tracing::debug!(sub = %claims.sub, max_age, "code redeemed");

            let target = self.resolve_target(Some(&saved_state), request_url);
            if let Err(e) = session.cycle_id().await {
                tracing::warn!(error = %e, "failed to cycle session id");
                return StatusCode::BAD_REQUEST.into_response();
            }
            session.remove_oauth_state();
            session.set_claims(claims);

            if let Err(e) = self
                .sessions
                .save(&mut session, &mut response_headers, MaxAge::Seconds(max_age))
                .await
            {
                tracing::warn!(error = %e, "failed to save session");
                return StatusCode::BAD_REQUEST.into_response();
            }

            found(&target, response_headers)
        }
        .instrument(self.span.clone())
        .await
    }

    // -----------------------------------------------------------------------
    // Forward-auth check
    // -----------------------------------------------------------------------

    /// Answers a forward-auth check for `original_url`.
    ///
    /// Authenticated sessions get `204` with identity headers; anything else
    /// is sent to the start path with `original_url` as the redirect target.
    pub async fn handle_auth_check(&self, headers: &HeaderMap, original_url: &Url) -> Response {
        async {
            let session = self.load_session(headers).await;

            if let Some(claims) = self.check_auth(&session) {
                let mut response_headers = HeaderMap::new();
                identity_headers(claims, &mut response_headers);
                return (StatusCode::NO_CONTENT, response_headers).into_response();
            }

            match self.start_url(original_url) {
                Ok(start) => found(&start, HeaderMap::new()),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to build start URL");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn load_session(&self, headers: &HeaderMap) -> Session {
        match self.sessions.load(headers).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load session");
                self.sessions.new_session()
            }
        }
    }

    /// Generic post-login redirect.
    fn redirect(&self, session: &Session, request_url: &Url) -> Response {
        let target = self.resolve_target(session.oauth_state(), request_url);
        found(&target, HeaderMap::new())
    }

    /// Target embedded in the state token, then the validated `rd` of the
    /// current request, then the external host.
    fn resolve_target(&self, state_token: Option<&str>, request_url: &Url) -> Url {
        let from_state = state_token
            .and_then(|token| match self.states.parse(token) {
                Ok(state) => state.redirect,
                Err(e) => {
                    tracing::debug!(error = %e, "could not read redirect from state");
                    None
                }
            })
            .and_then(|target| check_redirect(&target, &self.config));

        from_state
            .or_else(|| self.redirect_param(request_url))
            .or_else(|| Url::parse(&self.config.external_host).ok())
            .unwrap_or_else(|| request_url.clone())
    }

    fn redirect_param(&self, request_url: &Url) -> Option<Url> {
        request_url
            .query_pairs()
            .find(|(name, _)| name == REDIRECT_PARAM)
            .and_then(|(_, value)| check_redirect(&value, &self.config))
    }

    fn start_url(&self, original_url: &Url) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}{}",
            self.config.external_host.trim_end_matches('/'),
            AUTH_START_PATH
        ))?;
        url.query_pairs_mut()
            .append_pair(REDIRECT_PARAM, original_url.as_str());
        Ok(url)
    }
}

fn found(location: &Url, mut headers: HeaderMap) -> Response {
    match HeaderValue::from_str(location.as_str()) {
        Ok(value) => {
            headers.insert(header::LOCATION, value);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "redirect target is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn identity_headers(claims: &Claims, headers: &mut HeaderMap) {
    let values = [
        (HEADER_USER, Some(claims.username().to_string())),
        (HEADER_EMAIL, claims.email.clone()),
        (
            HEADER_GROUPS,
            (!claims.groups.is_empty()).then(|| claims.groups.join("|")),
        ),
    ];
    for (name, value) in values {
        let Some(value) = value else { continue };
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(name), value);
            }
            Err(_) => tracing::warn!(header = name, "claim is not a valid header value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::redeem::MockCodeRedeemer;
    use crate::auth::session::MemoryStore;
    use crate::config::{ProviderConfig, ProxyMode};
    use crate::error::RedeemError;
    use async_trait::async_trait;
    use tower_sessions::session::{Id, Record};
    use tower_sessions::session_store;

    fn app_config() -> ApplicationConfig {
        ApplicationConfig {
            name: "wiki".to_string(),
            mode: ProxyMode::ForwardSingle,
            external_host: "https://wiki.example.com".to_string(),
            cookie_domain: None,
            cookie_secret: "cookie-secret".to_string(),
            session_name: None,
            provider: ProviderConfig {
                issuer: "https://id.example.com/".to_string(),
                client_id: "wiki".to_string(),
                client_secret: "client-secret".to_string(),
                redirect_uri: None,
                scopes: vec!["openid".to_string(), "email".to_string()],
                authorization_endpoint: None,
                token_endpoint: None,
                jwks_uri: None,
            },
            redeem_timeout_seconds: 5,
        }
    }

    fn application(store: Arc<dyn SessionStore>, redeemer: MockCodeRedeemer) -> Application {
        Application::new(
            app_config(),
            Url::parse("https://id.example.com/authorize").unwrap(),
            store,
            86_400,
            Arc::new(redeemer),
        )
    }

    fn redeemer_returning(claims: Claims) -> MockCodeRedeemer {
        let mut redeemer = MockCodeRedeemer::new();
        redeemer
            .expect_redeem()
            .times(1)
            .returning(move |_, _| Ok(claims.clone()));
        redeemer
    }

    fn user_claims(exp: i64) -> Claims {
        Claims {
            sub: "user-1".to_string(),
            exp,
            preferred_username: Some("user".to_string()),
            ..Claims::default()
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn location(response: &Response) -> Url {
        let value = response
            .headers()
            .get(header::LOCATION)
            .expect("Location header")
            .to_str()
            .unwrap();
        Url::parse(value).unwrap()
    }

    fn query_param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Turns a response's `Set-Cookie` into the request `Cookie` header.
    fn cookie_from(response: &Response) -> HeaderMap {
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("Set-Cookie header")
            .to_str()
            .unwrap();
        let pair = set_cookie.split(';').next().unwrap().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&pair).unwrap());
        headers
    }

    fn callback_url(state: &str) -> Url {
        let mut callback = url("https://wiki.example.com/outpost/auth/callback");
        callback
            .query_pairs_mut()
            .append_pair("state", state)
            .append_pair("code", "c");
        callback
    }

    /// Runs start and callback, returning the start cookie and the callback
    /// response.
    async fn login(app: &Application, start: &Url) -> (HeaderMap, Response) {
        let started = app.handle_auth_start(&HeaderMap::new(), start).await;
        let cookie = cookie_from(&started);
        let state = query_param(&location(&started), "state").unwrap();
        let done = app.handle_auth_callback(&cookie, &callback_url(&state)).await;
        (cookie, done)
    }

    #[derive(Debug)]
    struct FailingStore;

    fn down() -> session_store::Error {
        session_store::Error::Backend("down".to_string())
    }

    #[async_trait]
    impl SessionStore for FailingStore {
        async fn create(&self, _record: &mut Record) -> session_store::Result<()> {
            Err(down())
        }
        async fn save(&self, _record: &Record) -> session_store::Result<()> {
            Err(down())
        }
        async fn load(&self, _id: &Id) -> session_store::Result<Option<Record>> {
            Err(down())
        }
        async fn delete(&self, _id: &Id) -> session_store::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_auth_code_url_parameters() {
        let app = application(Arc::new(MemoryStore::new()), MockCodeRedeemer::new());
        let url = app.auth_code_url("abc");
        assert_eq!(url.path(), "/authorize");
        assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
        assert_eq!(query_param(&url, "client_id").as_deref(), Some("wiki"));
        assert_eq!(
            query_param(&url, "redirect_uri").as_deref(),
            Some("https://wiki.example.com/outpost/auth/callback")
        );
        assert_eq!(query_param(&url, "scope").as_deref(), Some("openid email"));
        assert_eq!(query_param(&url, "state").as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_start_reuses_pending_state() {
        let app = application(Arc::new(MemoryStore::new()), MockCodeRedeemer::new());
        let start = url("https://wiki.example.com/outpost/auth/start?rd=https://wiki.example.com/page");

        let first = app.handle_auth_start(&HeaderMap::new(), &start).await;
        assert_eq!(first.status(), StatusCode::FOUND);
        let cookie = cookie_from(&first);
        let first_state = query_param(&location(&first), "state").unwrap();

        let second = app.handle_auth_start(&cookie, &start).await;
        assert_eq!(second.status(), StatusCode::FOUND);
        assert_eq!(
            query_param(&location(&second), "state").unwrap(),
            first_state
        );
        assert!(second.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_start_embeds_validated_redirect_in_state() {
        let app = application(Arc::new(MemoryStore::new()), MockCodeRedeemer::new());
        let start = url("https://wiki.example.com/outpost/auth/start?rd=https://wiki.example.com/page");
        let response = app.handle_auth_start(&HeaderMap::new(), &start).await;
        let state = query_param(&location(&response), "state").unwrap();
        let parsed = app.states.parse(&state).unwrap();
        assert_eq!(
            parsed.redirect.as_deref(),
            Some("https://wiki.example.com/page")
        );

        let evil = url("https://wiki.example.com/outpost/auth/start?rd=https://evil.com/");
        let response = app.handle_auth_start(&HeaderMap::new(), &evil).await;
        let state = query_param(&location(&response), "state").unwrap();
        assert!(app.states.parse(&state).unwrap().redirect.is_none());
    }

    #[tokio::test]
    async fn test_start_save_failure_is_internal_error() {
        let app = application(Arc::new(FailingStore), MockCodeRedeemer::new());
        let start = url("https://wiki.example.com/outpost/auth/start");
        let response = app.handle_auth_start(&HeaderMap::new(), &start).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::LOCATION).is_none());
    }

    #[tokio::test]
    async fn test_callback_without_state_redirects_without_redeeming() {
        let mut redeemer = MockCodeRedeemer::new();
        redeemer.expect_redeem().times(0);
        let app = application(Arc::new(MemoryStore::new()), redeemer);

        let callback = url("https://wiki.example.com/outpost/auth/callback?state=x&code=y");
        let response = app.handle_auth_callback(&HeaderMap::new(), &callback).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response).as_str(), "https://wiki.example.com/");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_callback_without_state_leaves_authenticated_session_unchanged() {
        let exp = Utc::now().timestamp() + 3600;
        let app = application(Arc::new(MemoryStore::new()), redeemer_returning(user_claims(exp)));
        let (_, done) = login(&app, &url("https://wiki.example.com/outpost/auth/start")).await;
        let cookie = cookie_from(&done);

        let replay = app
            .handle_auth_callback(&cookie, &callback_url("whatever"))
            .await;
        assert_eq!(replay.status(), StatusCode::FOUND);
        assert!(replay.headers().get(header::SET_COOKIE).is_none());

        let session = app.sessions().load(&cookie).await.unwrap();
        assert!(session.oauth_state().is_none());
        assert_eq!(session.claims().map(|c| c.exp), Some(exp));
    }

    #[tokio::test]
    async fn test_callback_proceeds_with_empty_session_when_store_fails() {
        let mut redeemer = MockCodeRedeemer::new();
        redeemer.expect_redeem().times(0);
        let app = application(Arc::new(FailingStore), redeemer);

        let mut cookie = HeaderMap::new();
        cookie.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("outpost_session_wiki={}", Id::default())).unwrap(),
        );
        let response = app
            .handle_auth_callback(&cookie, &callback_url("state"))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response).as_str(), "https://wiki.example.com/");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_callback_success_stores_claims_and_redirects_to_target() {
        let exp = Utc::now().timestamp() + 3600;
        let app = application(Arc::new(MemoryStore::new()), redeemer_returning(user_claims(exp)));

        let start = url("https://wiki.example.com/outpost/auth/start?rd=https://wiki.example.com/page");
        let (_, response) = login(&app, &start).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response).as_str(), "https://wiki.example.com/page");

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let max_age: i64 = set_cookie
            .split(';')
            .find_map(|part| part.trim().strip_prefix("Max-Age="))
            .unwrap()
            .parse()
            .unwrap();
        assert!((3599..=3600).contains(&max_age), "max-age was {max_age}");

        let session = app.sessions().load(&cookie_from(&response)).await.unwrap();
        assert!(session.oauth_state().is_none());
        assert_eq!(session.claims().map(|c| c.exp), Some(exp));
    }

    #[tokio::test]
    async fn test_login_moves_session_to_new_id() {
        let exp = Utc::now().timestamp() + 3600;
        let store = Arc::new(MemoryStore::new());
        let app = application(store.clone(), redeemer_returning(user_claims(exp)));
        let start = url("https://wiki.example.com/outpost/auth/start");

        // A session planted before login, then used by the browser that logs in
        let planted = app.handle_auth_start(&HeaderMap::new(), &start).await;
        let planted_cookie = cookie_from(&planted);
        let again = app.handle_auth_start(&planted_cookie, &start).await;
        let state = query_param(&location(&again), "state").unwrap();
        let done = app
            .handle_auth_callback(&planted_cookie, &callback_url(&state))
            .await;
        assert_eq!(done.status(), StatusCode::FOUND);

        let logged_in = cookie_from(&done);
        assert_ne!(
            logged_in.get(header::COOKIE),
            planted_cookie.get(header::COOKIE)
        );
        assert_eq!(store.len().await, 1);

        let planted_check = app
            .handle_auth_check(&planted_cookie, &url("https://wiki.example.com/"))
            .await;
        assert_eq!(planted_check.status(), StatusCode::FOUND);
        assert!(planted_check.headers().get(HEADER_USER).is_none());

        let check = app
            .handle_auth_check(&logged_in, &url("https://wiki.example.com/"))
            .await;
        assert_eq!(check.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_callback_failure_clears_state_and_returns_bad_request() {
        let mut redeemer = MockCodeRedeemer::new();
        redeemer
            .expect_redeem()
            .times(1)
            .returning(|_, _| Err(RedeemError::StateMismatch));
        let app = application(Arc::new(MemoryStore::new()), redeemer);

        let start = url("https://wiki.example.com/outpost/auth/start");
        let started = app.handle_auth_start(&HeaderMap::new(), &start).await;
        let cookie = cookie_from(&started);

        let callback = url("https://wiki.example.com/outpost/auth/callback?state=forged&code=c");
        let response = app.handle_auth_callback(&cookie, &callback).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let session = app.sessions().load(&cookie).await.unwrap();
        assert!(session.oauth_state().is_none());
        assert!(session.claims().is_none());
    }

    #[tokio::test]
    async fn test_callback_with_expired_claims_expires_session() {
        let exp = Utc::now().timestamp() - 10;
        let store = Arc::new(MemoryStore::new());
        let app = application(store.clone(), redeemer_returning(user_claims(exp)));

        let (_, response) = login(&app, &url("https://wiki.example.com/outpost/auth/start")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(store.is_empty().await);
        let set_cookie = response.headers().get(header::SET_COOKIE).unwrap();
        assert!(set_cookie.to_str().unwrap().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_check_sets_identity_headers_or_redirects_to_start() {
        let exp = Utc::now().timestamp() + 600;
        let app = application(
            Arc::new(MemoryStore::new()),
            redeemer_returning(Claims {
                email: Some("user@example.com".to_string()),
                groups: vec!["a".to_string(), "b".to_string()],
                ..user_claims(exp)
            }),
        );
        let original = url("https://wiki.example.com/docs?page=1");

        let anonymous = app.handle_auth_check(&HeaderMap::new(), &original).await;
        assert_eq!(anonymous.status(), StatusCode::FOUND);
        let start = location(&anonymous);
        assert_eq!(start.path(), AUTH_START_PATH);
        assert_eq!(
            query_param(&start, REDIRECT_PARAM).as_deref(),
            Some(original.as_str())
        );

        let (_, done) = login(&app, &start).await;
        assert_eq!(location(&done), original);

        let checked = app.handle_auth_check(&cookie_from(&done), &original).await;
        assert_eq!(checked.status(), StatusCode::NO_CONTENT);
        assert_eq!(checked.headers().get(HEADER_USER).unwrap(), "user");
        assert_eq!(
            checked.headers().get(HEADER_EMAIL).unwrap(),
            "user@example.com"
        );
        assert_eq!(checked.headers().get(HEADER_GROUPS).unwrap(), "a|b");
    }
}
