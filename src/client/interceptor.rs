//! Transparent reauthentication for outbound requests.
//!
//! Every request goes out with the client's cookies. A 401 triggers one call
//! to the refresh endpoint and one replay of the original request. Callers
//! that hit 401 while a refresh is in flight wait for it and reuse its
//! outcome instead of refreshing again.
//!
//! Refreshes are counted by a generation number. A caller records the
//! generation before sending; if the generation has moved on by the time its
//! 401 arrives, a refresh already happened after its request left and the
//! recorded outcome applies.
//!
//! State-changing requests carry the cached sync token. When the server
//! refuses it with a `csrf_*` code the token is fetched again and the request
//! replayed once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::error::ClientError;
use super::session::ClientSession;
use crate::csrf::CSRF_HEADER;
use crate::db::UserProfile;

/// Timeout shared by every call, including the refresh call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    Refreshed,
    /// Auth failure; the session is over.
    Rejected,
    /// Server or transport failure; the session is kept.
    Unavailable(Option<StatusCode>),
}

struct RefreshRecord {
    generation: u64,
    outcome: RefreshOutcome,
}

struct Inner {
    http: reqwest::Client,
    base: Url,
    session: Mutex<ClientSession>,
    generation: AtomicU64,
    refresh: Arc<tokio::sync::Mutex<RefreshRecord>>,
    sync_fetch: tokio::sync::Mutex<()>,
}

impl Inner {
    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    fn session(&self) -> MutexGuard<'_, ClientSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn call_refresh(&self) -> RefreshOutcome {
        let url = match self.url("refresh") {
            Ok(url) => url,
            Err(_) => return RefreshOutcome::Unavailable(None),
        };

        match self.http.post(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    RefreshOutcome::Refreshed
                } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    RefreshOutcome::Rejected
                } else {
                    RefreshOutcome::Unavailable(Some(status))
                }
            }
            Err(e) => {
                warn!(error = %e, "Refresh request failed");
                RefreshOutcome::Unavailable(None)
            }
        }
    }
}

/// HTTP client for the session API with transparent reauthentication.
///
/// Cheap to clone; clones share cookies, session state and the in-flight
/// refresh.
#[derive(Clone)]
pub struct ReauthClient {
    inner: Arc<Inner>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Deserialize)]
struct LoginBody {
    user: UserProfile,
    #[serde(rename = "syncToken")]
    sync_token: String,
}

#[derive(Deserialize)]
struct UserBody {
    user: UserProfile,
}

#[derive(Deserialize)]
struct SyncTokenBody {
    #[serde(rename = "syncToken")]
    sync_token: String,
}

/// A 403 either names a refused sync token or is passed on as it came.
enum Forbidden {
    StaleSyncToken,
    Other(Response),
}

/// Buffer a 403 body to read its code, rebuilding the response when the
/// sync token was not at fault.
async fn classify_forbidden(response: Response) -> Result<Forbidden, ClientError> {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.bytes().await?;

    let code = serde_json::from_slice::<ErrorBody>(&bytes)
        .ok()
        .and_then(|body| body.code);
    if code.is_some_and(|code| code.starts_with("csrf_")) {
        return Ok(Forbidden::StaleSyncToken);
    }

    let mut rebuilt = axum::http::Response::new(bytes);
    *rebuilt.status_mut() = status;
    *rebuilt.headers_mut() = headers;
    Ok(Forbidden::Other(Response::from(rebuilt)))
}

fn is_state_changing(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Turn a non-success response into [`ClientError::Status`].
async fn expect_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.json::<ErrorBody>().await.ok();
    let (message, code) = match body {
        Some(body) if !body.error.is_empty() => (body.error, body.code),
        Some(body) => (status.to_string(), body.code),
        None => (status.to_string(), None),
    };

    Err(ClientError::Status {
        status,
        code,
        message,
    })
}

impl ReauthClient {
    /// Create a client for the API rooted at `base_url`, e.g.
    /// `http://localhost:5000/api/v1/user/`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base,
                session: Mutex::new(ClientSession::default()),
                generation: AtomicU64::new(0),
                refresh: Arc::new(tokio::sync::Mutex::new(RefreshRecord {
                    generation: 0,
                    outcome: RefreshOutcome::Refreshed,
                })),
                sync_fetch: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Snapshot of the local session state.
    pub fn session(&self) -> ClientSession {
        self.inner.session().clone()
    }

    /// Number of refreshes this client has performed.
    pub fn refresh_count(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Refresh once on behalf of a caller that sent its request at
    /// generation `observed`.
    async fn refresh_once(&self, observed: u64) -> RefreshOutcome {
        let record = self.inner.refresh.clone().lock_owned().await;
        if record.generation > observed {
            return record.outcome;
        }

        // Runs detached so a dropped caller cannot abandon a rotation halfway
        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let mut record = record;
            let outcome = inner.call_refresh().await;

            record.generation += 1;
            record.outcome = outcome;
            inner.generation.store(record.generation, Ordering::SeqCst);

            if outcome == RefreshOutcome::Rejected {
                inner.session().end();
            }
            outcome
        });

        task.await.unwrap_or(RefreshOutcome::Unavailable(None))
    }

    /// Return the cached sync token, fetching one if absent.
    async fn ensure_sync_token(&self) -> Result<String, ClientError> {
        let cached = self.cached_sync_token();
        if let Some(token) = cached {
            return Ok(token);
        }

        let _fetching = self.inner.sync_fetch.lock().await;
        let cached = self.cached_sync_token();
        match cached {
            Some(token) => Ok(token),
            None => self.sync_token().await,
        }
    }

    /// Replace a sync token the server refused. Callers that refused the same
    /// token share one fetch.
    async fn renew_sync_token(&self, stale: &str) -> Result<String, ClientError> {
        let _fetching = self.inner.sync_fetch.lock().await;
        if let Some(token) = self.cached_sync_token().filter(|token| token != stale) {
            return Ok(token);
        }

        self.inner.session().clear_sync_token();
        self.sync_token().await
    }

    fn cached_sync_token(&self) -> Option<String> {
        self.inner.session().sync_token().map(str::to_string)
    }

    /// Fetch a fresh sync token and cache it.
    pub async fn sync_token(&self) -> Result<String, ClientError> {
        let response = self.inner.http.get(self.inner.url("sync-token")?).send().await?;
        let body: SyncTokenBody = expect_success(response).await?.json().await?;

        self.inner.session().set_sync_token(body.sync_token.clone());
        Ok(body.sync_token)
    }

    async fn dispatch_with(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        sync_token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let mut request = self.inner.http.request(method, url);
        if let Some(token) = sync_token {
            request = request.header(CSRF_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Send one request, attaching the sync token to state-changing methods
    /// and replacing it once if the server refuses it.
    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, ClientError> {
        if !is_state_changing(&method) {
            return self.dispatch_with(method, url, body, None).await;
        }

        let token = self.ensure_sync_token().await?;
        let response = self
            .dispatch_with(method.clone(), url.clone(), body, Some(&token))
            .await?;
        if response.status() != StatusCode::FORBIDDEN {
            return Ok(response);
        }

        match classify_forbidden(response).await? {
            Forbidden::Other(response) => Ok(response),
            Forbidden::StaleSyncToken => {
                debug!(url = %url, "Sync token refused, fetching a new one");
                let token = self.renew_sync_token(&token).await?;
                self.dispatch_with(method, url, body, Some(&token)).await
            }
        }
    }

    /// Send a request, refreshing and replaying once on 401.
    ///
    /// Returns the final response whatever its status, except when the
    /// refresh itself fails.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, ClientError> {
        let url = self.inner.url(path)?;
        let observed = self.inner.generation.load(Ordering::SeqCst);

        let response = self.dispatch(method.clone(), url.clone(), body).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let original = response.status();
        match self.refresh_once(observed).await {
            RefreshOutcome::Refreshed => {
                debug!(path = %path, "Replaying after refresh");
                self.dispatch(method, url, body).await
            }
            RefreshOutcome::Rejected => Err(ClientError::SessionEnded { status: original }),
            RefreshOutcome::Unavailable(status) => Err(ClientError::RefreshUnavailable { status }),
        }
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, ClientError> {
        let response = self
            .inner
            .http
            .post(self.inner.url("register")?)
            .json(&serde_json::json!({ "name": name, "email": email, "password": password }))
            .send()
            .await?;

        let body: UserBody = expect_success(response).await?.json().await?;
        Ok(body.user)
    }

    /// Log in and record the session. Never goes through reauthentication.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let response = self
            .inner
            .http
            .post(self.inner.url("login")?)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let body: LoginBody = expect_success(response).await?.json().await?;
        self.inner.session().begin(body.user.clone(), body.sync_token);
        Ok(body.user)
    }

    /// Log out. Local state is cleared whatever the server answers.
    /// Returns the user that was logged in, if any.
    pub async fn logout(&self) -> Result<Option<UserProfile>, ClientError> {
        let result = async {
            let url = self.inner.url("logout")?;
            let response = self.dispatch(Method::POST, url, None).await?;
            expect_success(response).await
        }
        .await;

        let previous = self.inner.session().end();
        result.map(|_| previous)
    }

    /// Fetch the profile. Success means the session is live, so the user is
    /// recorded even if this client never logged in itself.
    pub async fn profile(&self) -> Result<UserProfile, ClientError> {
        let response = self.send(Method::GET, "profile", None).await?;
        let body: UserBody = expect_success(response).await?.json().await?;

        self.inner.session().set_user(body.user.clone());
        Ok(body.user)
    }

    pub async fn update_profile(&self, name: &str) -> Result<UserProfile, ClientError> {
        let payload = serde_json::json!({ "name": name });
        let response = self.send(Method::PUT, "profile", Some(&payload)).await?;
        let body: UserBody = expect_success(response).await?.json().await?;

        self.inner.session().set_user(body.user.clone());
        Ok(body.user)
    }
}
