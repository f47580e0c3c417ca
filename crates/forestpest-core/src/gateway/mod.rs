//! Authenticated request gateway.
//!
//! Every backend call goes through [`Gateway::send`], which attaches the
//! current bearer token, unwraps the `{code, message, data}` envelope and
//! classifies failures. When the backend rejects the access token the
//! gateway runs a single-flight refresh:
//!
//! - the first rejected request starts one refresh call in a detached task
//! - every request rejected while that refresh is in flight joins a FIFO queue
//! - on success all queued requests are replayed, in arrival order, with the
//!   new token; a replay that is rejected again fails instead of refreshing
//! - on failure the session is cleared, the [`SessionListener`] is told, and
//!   every queued request fails with the same error
//!
//! The `{in_flight, queue, epoch}` state is guarded by one mutex that is
//! never held across an await point.

mod request;
mod transport;

pub use request::{ApiRequest, FilePart, HttpRequest, MultipartBody};
pub use transport::{NetworkErrorKind, RawResponse, ReqwestTransport, Transport, TransportError};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, Envelope};
use crate::auth::token::expires_within;
use crate::auth::{CredentialStore, SessionListener};
use crate::config::GatewayConfig;

const CONTENT_TYPE_JSON: &str = "application/json;charset=UTF-8";

type Reply = oneshot::Sender<Result<Value, ApiError>>;

/// A request parked behind an in-flight refresh.
///
/// `request` is `None` for callers that only wait for the refresh itself
/// (proactive refresh); they are answered with `Value::Null`.
struct Pending {
    request: Option<ApiRequest>,
    reply: Reply,
}

/// How the last session ended, so late rejections of its token fail the
/// same way without ending it a second time.
struct EndedSession {
    token: Option<String>,
    error: ApiError,
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    queue: VecDeque<Pending>,
    /// Bumped by logout so a refresh finishing afterwards is discarded.
    epoch: u64,
    ended: Option<EndedSession>,
}

impl RefreshState {
    /// The error a request sent with `used_token` gets when its session is
    /// already over.
    fn ended_for(&self, used_token: &Option<String>, current: &Option<String>) -> Option<ApiError> {
        used_token.as_ref()?;
        let ended = self.ended.as_ref()?;
        if ended.token == *used_token || current.is_none() {
            Some(ended.error.clone())
        } else {
            None
        }
    }

    fn end_session(&mut self, token: Option<String>, error: ApiError) {
        self.ended = Some(EndedSession { token, error });
    }
}

/// Outcome of a single trip through the transport.
enum Dispatch {
    Done(Result<Value, ApiError>),
    Unauthorized(ApiError),
}

/// How a rejected request is admitted into the refresh protocol.
enum Admission {
    /// Queued; `Some(epoch)` when this request started the refresh.
    Queued(oneshot::Receiver<Result<Value, ApiError>>, Option<u64>),
    /// Another refresh already replaced the token this request was sent with.
    ReplayNow,
    /// The session this request belonged to is already over.
    Ended(ApiError),
    NoRefreshToken(ApiError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshedTokens {
    #[serde(alias = "token")]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    #[serde(alias = "accessToken")]
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Value,
}

/// Handle to the request pipeline.
/// Clone is cheap and every clone shares the same refresh state.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

struct Inner {
    config: GatewayConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    listener: Arc<dyn SessionListener>,
    state: Mutex<RefreshState>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        listener: Arc<dyn SessionListener>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                credentials,
                listener,
                state: Mutex::new(RefreshState::default()),
            }),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.credentials
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.credentials.access_token().is_some()
    }

    /// Number of requests currently waiting on a token refresh.
    pub fn pending_replays(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().in_flight
    }

    /// Send a request and return the envelope's `data` payload.
    pub async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let token = self.inner.credentials.access_token();
        let outcome = self.inner.dispatch(&request, token.as_deref()).await;
        match outcome {
            Dispatch::Done(result) => result,
            Dispatch::Unauthorized(cause) => {
                debug!(method = %request.method, path = %request.path, "Access token rejected");
                Arc::clone(&self.inner).recover(request, token, cause).await
            }
        }
    }

    /// Send a request and deserialize the `data` payload into `T`.
    pub async fn send_as<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let data = self.send(request).await?;
        serde_json::from_value(data)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected payload shape: {e}")))
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send(ApiRequest::post(path).body(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send(ApiRequest::put(path).body(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(ApiRequest::delete(path)).await
    }

    /// Log in and store the returned tokens. Returns the user payload.
    ///
    /// A rejection here means bad credentials, so it never enters the
    /// refresh protocol.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        remember: bool,
    ) -> Result<Value, ApiError> {
        let request = ApiRequest::post(&self.inner.config.login_path).body(json!({
            "username": username,
            "password": password,
            "rememberMe": remember,
        }));

        let data = match self.inner.dispatch(&request, None).await {
            Dispatch::Done(result) => result?,
            Dispatch::Unauthorized(err) => return Err(err),
        };
        let login: LoginData = serde_json::from_value(data)
            .map_err(|e| ApiError::InvalidResponse(format!("Malformed login response: {e}")))?;

        let refresh = login.refresh_token.unwrap_or_default();
        let access = login.token;
        self.inner
            .with_store(move |store| store.set_tokens(&access, &refresh, remember))
            .await
            .map_err(|e| ApiError::Unknown(format!("Failed to store credentials: {e:#}")))?;

        info!(username, remember, "Logged in");
        Ok(login.user)
    }

    /// End the session.
    ///
    /// The server is told on a best-effort basis; local credentials are
    /// cleared regardless. Requests waiting on an in-flight refresh fail
    /// immediately and that refresh's result is discarded when it lands.
    pub async fn logout(&self) {
        let token = self.inner.credentials.access_token();
        if let Some(ref token) = token {
            let request = ApiRequest::post(&self.inner.config.logout_path);
            match self.inner.dispatch(&request, Some(token)).await {
                Dispatch::Done(Ok(_)) => debug!("Server session closed"),
                Dispatch::Done(Err(err)) | Dispatch::Unauthorized(err) => {
                    debug!(error = %err, "Server-side logout failed, clearing local session anyway");
                }
            }
        }

        let err = ApiError::AuthExpired("Session ended by logout".to_string());
        let drained: Vec<Pending> = {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            state.in_flight = false;
            state.end_session(token, err.clone());
            state.queue.drain(..).collect()
        };
        self.inner.clear_credentials().await;

        if !drained.is_empty() {
            debug!(rejected = drained.len(), "Rejecting requests queued behind refresh");
        }
        for pending in drained {
            let _ = pending.reply.send(Err(err.clone()));
        }
        info!("Logged out");
    }

    /// Refresh ahead of time when the access token is about to expire.
    ///
    /// Joins an in-flight refresh instead of starting a second one. Returns
    /// `Ok(true)` when a refresh ran (or was joined) and succeeded. Tokens
    /// that are not JWTs carry no expiry and are left to the reactive path.
    pub async fn refresh_if_expiring(&self) -> Result<bool, ApiError> {
        let Some(token) = self.inner.credentials.access_token() else {
            return Ok(false);
        };
        match expires_within(&token, self.inner.config.expiry_buffer_secs) {
            Some(true) => {}
            Some(false) => return Ok(false),
            None => {
                debug!("Access token carries no expiry, skipping proactive refresh");
                return Ok(false);
            }
        }
        if self.inner.credentials.refresh_token().is_none() {
            return Ok(false);
        }

        debug!("Access token expiring soon, refreshing");
        let (rx, start) = {
            let mut state = self.inner.state.lock();
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(Pending {
                request: None,
                reply: tx,
            });
            let start = if state.in_flight {
                None
            } else {
                state.in_flight = true;
                Some(state.epoch)
            };
            (rx, start)
        };
        if let Some(epoch) = start {
            tokio::spawn(Arc::clone(&self.inner).run_refresh(epoch));
        }
        Inner::await_reply(rx).await.map(|_| true)
    }

    /// Spawn a task that calls [`refresh_if_expiring`](Self::refresh_if_expiring)
    /// every `period`. Abort the returned handle to stop it.
    pub fn start_auto_refresh(&self, period: Duration) -> JoinHandle<()> {
        let gateway = self.clone();
        tokio::spawn(async move {
            info!(period_secs = period.as_secs(), "Starting token auto-refresh");
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = gateway.refresh_if_expiring().await {
                    warn!(error = %e, "Background token refresh failed");
                }
            }
        })
    }
}

impl Inner {
    fn build(&self, request: &ApiRequest, token: Option<&str>) -> HttpRequest {
        let mut headers = Vec::new();
        // Multipart bodies carry their own boundary in the content type
        if request.multipart.is_none() {
            headers.push(("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string()));
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        headers.extend(
            request
                .headers
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("authorization"))
                .cloned(),
        );

        HttpRequest {
            method: request.method.clone(),
            url: request.resolve(&self.config.base_url),
            query: request.query.clone(),
            headers,
            body: request.body.clone(),
            multipart: request.multipart.clone(),
            timeout: self.config.timeout,
        }
    }

    async fn dispatch(&self, request: &ApiRequest, token: Option<&str>) -> Dispatch {
        let http = self.build(request, token);
        match self.transport.execute(http).await {
            Ok(response) => classify(response),
            Err(err) => {
                warn!(method = %request.method, path = %request.path, kind = ?err.kind, error = %err, "Network failure");
                Dispatch::Done(Err(err.into()))
            }
        }
    }

    /// Re-send with whatever token is current. A second rejection is final.
    async fn replay(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let token = self.credentials.access_token();
        match self.dispatch(request, token.as_deref()).await {
            Dispatch::Done(result) => result,
            Dispatch::Unauthorized(err) => {
                warn!(method = %request.method, path = %request.path, "Request rejected again after token refresh");
                Err(ApiError::AuthExpired(err.user_message().to_string()))
            }
        }
    }

    async fn recover(
        self: Arc<Self>,
        request: ApiRequest,
        used_token: Option<String>,
        cause: ApiError,
    ) -> Result<Value, ApiError> {
        let admission = {
            let mut state = self.state.lock();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(Pending {
                    request: Some(request.clone()),
                    reply: tx,
                });
                debug!(queued = state.queue.len(), "Refresh in flight, queued request");
                Admission::Queued(rx, None)
            } else {
                let current = self.credentials.access_token();
                if let Some(err) = state.ended_for(&used_token, &current) {
                    Admission::Ended(err)
                } else if current.is_some() && current != used_token {
                    Admission::ReplayNow
                } else if self.credentials.refresh_token().is_none() {
                    let err = ApiError::AuthExpired(cause.user_message().to_string());
                    state.end_session(used_token.clone(), err.clone());
                    Admission::NoRefreshToken(err)
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.in_flight = true;
                    state.queue.push_back(Pending {
                        request: Some(request.clone()),
                        reply: tx,
                    });
                    Admission::Queued(rx, Some(state.epoch))
                }
            }
        };

        match admission {
            Admission::ReplayNow => {
                debug!(path = %request.path, "Token already refreshed, replaying directly");
                self.replay(&request).await
            }
            Admission::Ended(err) => {
                debug!(path = %request.path, "Session already ended, failing late rejection");
                Err(err)
            }
            Admission::NoRefreshToken(err) => {
                info!("No refresh token stored, session cannot be renewed");
                self.clear_credentials().await;
                self.listener.session_invalidated(&err);
                Err(err)
            }
            Admission::Queued(rx, start) => {
                if let Some(epoch) = start {
                    tokio::spawn(Arc::clone(&self).run_refresh(epoch));
                }
                Self::await_reply(rx).await
            }
        }
    }

    async fn await_reply(
        rx: oneshot::Receiver<Result<Value, ApiError>>,
    ) -> Result<Value, ApiError> {
        rx.await.unwrap_or_else(|_| {
            Err(ApiError::Unknown(
                "Token refresh ended without answering queued request".to_string(),
            ))
        })
    }

    /// One refresh wave: call the refresh endpoint, then settle the queue.
    ///
    /// The credential store is written outside the state lock; the epoch is
    /// checked again afterwards in case a logout landed meanwhile.
    async fn run_refresh(self: Arc<Self>, epoch: u64) {
        let rejected = self.credentials.access_token();
        let outcome = self.request_new_tokens().await;

        let current_epoch = self.state.lock().epoch;
        if current_epoch != epoch {
            debug!("Session ended during refresh, discarding result");
            return;
        }
        let stored = match outcome {
            Ok((ref access, ref refresh)) => {
                let remember = self.credentials.remember();
                let (access, refresh) = (access.clone(), refresh.clone());
                self.with_store(move |store| store.set_tokens(&access, &refresh, remember))
                    .await
            }
            Err(_) => self.with_store(|store| store.clear()).await,
        };
        if let Err(e) = stored {
            warn!(error = %e, "Failed to update stored credentials after refresh");
        }

        let drained: Option<Vec<Pending>> = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                None
            } else {
                if let Err(ref err) = outcome {
                    state.end_session(rejected, err.clone());
                }
                state.in_flight = false;
                Some(state.queue.drain(..).collect())
            }
        };
        let Some(drained) = drained else {
            debug!("Session ended while storing refreshed tokens, discarding them");
            self.clear_credentials().await;
            return;
        };

        match outcome {
            Ok(_) => {
                info!(replays = drained.len(), "Access token refreshed");
                let replays = drained.into_iter().map(|pending| {
                    let inner = &self;
                    async move {
                        let result = match pending.request {
                            Some(ref request) => inner.replay(request).await,
                            None => Ok(Value::Null),
                        };
                        let _ = pending.reply.send(result);
                    }
                });
                join_all(replays).await;
            }
            Err(err) => {
                warn!(error = %err, rejected = drained.len(), "Token refresh failed, session invalidated");
                self.listener.session_invalidated(&err);
                for pending in drained {
                    let _ = pending.reply.send(Err(err.clone()));
                }
            }
        }
    }

    /// Call the refresh endpoint. Returns `(access, refresh)`.
    async fn request_new_tokens(&self) -> Result<(String, String), ApiError> {
        let refresh_token = self
            .credentials
            .refresh_token()
            .ok_or_else(|| ApiError::RefreshFailed("No refresh token available".to_string()))?;

        let request = ApiRequest::post(&self.config.refresh_path)
            .body(json!({ "refreshToken": refresh_token }));
        let token = self.credentials.access_token();

        let data = match self.dispatch(&request, token.as_deref()).await {
            Dispatch::Done(Ok(data)) => data,
            Dispatch::Done(Err(err)) | Dispatch::Unauthorized(err) => {
                return Err(ApiError::RefreshFailed(err.user_message().to_string()));
            }
        };

        let tokens: RefreshedTokens = serde_json::from_value(data)
            .map_err(|e| ApiError::RefreshFailed(format!("Malformed refresh response: {e}")))?;
        let refresh = tokens
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or(refresh_token);
        Ok((tokens.access_token, refresh))
    }

    /// Run a credential store operation on the blocking pool; durable
    /// backends touch the filesystem or the OS keychain.
    async fn with_store<F>(&self, op: F) -> anyhow::Result<()>
    where
        F: FnOnce(&dyn CredentialStore) -> anyhow::Result<()> + Send + 'static,
    {
        let store = Arc::clone(&self.credentials);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| anyhow::anyhow!("Credential store task failed: {e}"))?
    }

    async fn clear_credentials(&self) {
        if let Err(e) = self.with_store(|store| store.clear()).await {
            warn!(error = %e, "Failed to clear stored credentials");
        }
    }
}

/// Turn a raw response into a payload, a classified error, or a token rejection.
fn classify(response: RawResponse) -> Dispatch {
    let RawResponse { status, body } = response;

    if !(200..300).contains(&status) {
        let err = ApiError::from_status(status, &body);
        return match err {
            ApiError::AuthExpired(_) => Dispatch::Unauthorized(err),
            other => Dispatch::Done(Err(other)),
        };
    }

    let envelope: Envelope = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Dispatch::Done(Err(ApiError::InvalidResponse(format!(
                "Failed to parse response envelope: {e}"
            ))));
        }
    };

    if envelope.is_success() {
        return Dispatch::Done(Ok(envelope.data));
    }
    match ApiError::from_envelope(envelope.code, envelope.message) {
        err @ ApiError::AuthExpired(_) => Dispatch::Unauthorized(err),
        err => Dispatch::Done(Err(err)),
    }
}
