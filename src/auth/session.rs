//! Browser sessions backed by a keyed store
//!
//! Sessions are [`tower_sessions::Session`]s identified by a random id
//! carried in a cookie named after the application's session name. The
//! outpost's fields are kept as one typed [`SessionData`] record inside the
//! session; the cookie only carries the id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue};
use cookie::time::{Duration, OffsetDateTime};
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store::{self, ExpiredDeletion};
use tower_sessions::Expiry;

pub use tower_sessions::SessionStore;

use crate::auth::claims::Claims;
use crate::error::{OutpostError, Result};

/// Key of the [`SessionData`] record inside a session
const SESSION_DATA_KEY: &str = "outpost";

/// Fields stored per session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// State token of the flow in flight, if any
    #[serde(rename = "OAuthState", default, skip_serializing_if = "Option::is_none")]
    pub oauth_state: Option<String>,

    /// Claims of the authenticated user
    #[serde(rename = "Claims", default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Claims>,
}

/// Lifetime applied when a session is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAge {
    /// The configured default
    Default,
    /// Explicit lifetime in seconds; zero or negative expires the session
    Seconds(i64),
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-process [`SessionStore`].
///
/// Expired records are never returned by `load`; they are removed by
/// [`ExpiredDeletion::delete_expired`], which [`spawn_expired_deletion`] runs
/// periodically.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore(Arc<Mutex<HashMap<Id, Record>>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of held records, including expired ones not yet deleted.
    pub async fn len(&self) -> usize {
        self.0.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.0.lock().await.is_empty()
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        self.0
            .lock()
            .await
            .values()
            .filter(|record| record.expiry_date > now)
            .count()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let mut records = self.0.lock().await;
        while records.contains_key(&record.id) {
            record.id = Id::default();
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.0.lock().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .0
            .lock()
            .await
            .get(session_id)
            .filter(|record| record.expiry_date > now)
            .cloned())
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.0.lock().await.remove(session_id);
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for MemoryStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.0.lock().await;
        let before = records.len();
        records.retain(|_, record| record.expiry_date > now);
        let deleted = before - records.len();
        if deleted > 0 {
            tracing::debug!(deleted, remaining = records.len(), "Deleted expired sessions");
        }
        Ok(())
    }
}

/// Deletes expired sessions from `store` every `period` until the task is
/// aborted.
pub fn spawn_expired_deletion<S>(store: S, period: std::time::Duration) -> JoinHandle<()>
where
    S: ExpiredDeletion + Clone,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = store.delete_expired().await {
                tracing::warn!(error = %e, "failed to delete expired sessions");
            }
        }
    })
}

/// Sized handle over a shared store, as [`tower_sessions::Session`] expects.
#[derive(Debug, Clone)]
struct SharedStore(Arc<dyn SessionStore>);

#[async_trait]
impl SessionStore for SharedStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        self.0.create(record).await
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.0.save(record).await
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        self.0.load(session_id).await
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.0.delete(session_id).await
    }
}

// ---------------------------------------------------------------------------
// Session accessor
// ---------------------------------------------------------------------------

/// One browser session, loaded for the duration of a request.
#[derive(Debug, Clone)]
pub struct Session {
    inner: tower_sessions::Session,
    data: SessionData,
}

impl Session {
    /// Id the session is stored under; `None` until it is saved.
    pub fn id(&self) -> Option<Id> {
        self.inner.id()
    }

    pub fn oauth_state(&self) -> Option<&str> {
        self.data.oauth_state.as_deref()
    }

    pub fn set_oauth_state(&mut self, state: String) {
        self.data.oauth_state = Some(state);
    }

    pub fn remove_oauth_state(&mut self) -> Option<String> {
        self.data.oauth_state.take()
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.data.claims.as_ref()
    }

    pub fn set_claims(&mut self, claims: Claims) {
        self.data.claims = Some(claims);
    }

    /// Deletes the stored record and moves the session to a new id on its
    /// next save. The fields are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn cycle_id(&mut self) -> Result<()> {
        self.inner
            .cycle_id()
            .await
            .map_err(|e| OutpostError::Session(format!("failed to cycle session id: {e}")))?;
        Ok(())
    }
}

/// Attributes of the session cookie.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub domain: Option<String>,
    pub secure: bool,
}

/// Loads and saves sessions of one application.
#[derive(Clone)]
pub struct Sessions {
    store: Arc<SharedStore>,
    cookie: CookieSettings,
    default_max_age: i64,
}

impl Sessions {
    /// Creates an accessor over `store`.
    ///
    /// `default_max_age` is the lifetime, in seconds, used for
    /// [`MaxAge::Default`].
    pub fn new(store: Arc<dyn SessionStore>, cookie: CookieSettings, default_max_age: i64) -> Self {
        Self {
            store: Arc::new(SharedStore(store)),
            cookie,
            default_max_age,
        }
    }

    /// A fresh session with no stored record.
    pub fn new_session(&self) -> Session {
        Session {
            inner: tower_sessions::Session::new(None, self.store.clone(), None),
            data: SessionData::default(),
        }
    }

    /// Loads the session named by the request's cookie.
    ///
    /// A missing cookie or an id the store does not know yields a fresh
    /// session; a stale id is never reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn load(&self, headers: &HeaderMap) -> Result<Session> {
        let cookie_id = self.session_id(headers);
        let inner = tower_sessions::Session::new(cookie_id, self.store.clone(), None);
        let data = inner
            .get::<SessionData>(SESSION_DATA_KEY)
            .await
            .map_err(|e| OutpostError::Session(format!("failed to load session: {e}")))?
            .unwrap_or_default();

        if cookie_id.is_some() && inner.id().is_none() {
            tracing::debug!(cookie = %self.cookie.name, "Unknown session id, starting a new session");
        }
        Ok(Session { inner, data })
    }

    /// Persists `session` and appends its `Set-Cookie` header to `headers`.
    ///
    /// A non-positive lifetime deletes the session and sends a cookie with
    /// `Max-Age=0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails; no header is appended then.
    pub async fn save(
        &self,
        session: &mut Session,
        headers: &mut HeaderMap,
        max_age: MaxAge,
    ) -> Result<()> {
        let seconds = match max_age {
            MaxAge::Default => self.default_max_age,
            MaxAge::Seconds(n) => n,
        };

        let value = if seconds <= 0 {
            if session.id().is_some() {
                session
                    .inner
                    .delete()
                    .await
                    .map_err(|e| OutpostError::Session(format!("failed to delete session: {e}")))?;
            }
            String::new()
        } else {
            session
                .inner
                .insert(SESSION_DATA_KEY, &session.data)
                .await
                .map_err(|e| OutpostError::Session(format!("failed to save session: {e}")))?;
            session
                .inner
                .set_expiry(Some(Expiry::OnInactivity(Duration::seconds(seconds))));
            session
                .inner
                .save()
                .await
                .map_err(|e| OutpostError::Session(format!("failed to save session: {e}")))?;
            session
                .id()
                .map(|id| id.to_string())
                .ok_or_else(|| OutpostError::Session("saved session has no id".to_string()))?
        };

        let cookie = self.cookie(value, seconds.max(0));
        let value = HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| OutpostError::Session(format!("invalid session cookie: {e}")))?;
        headers.append(header::SET_COOKIE, value);
        Ok(())
    }

    fn cookie(&self, value: String, max_age: i64) -> Cookie<'static> {
        let mut builder = Cookie::build((self.cookie.name.clone(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie.secure)
            .max_age(Duration::seconds(max_age));
        if let Some(domain) = &self.cookie.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }

    fn session_id(&self, headers: &HeaderMap) -> Option<Id> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(|cookie| cookie.ok())
            .find(|cookie| cookie.name() == self.cookie.name && !cookie.value().is_empty())
            .and_then(|cookie| cookie.value().parse::<Id>().ok())
    }
}
