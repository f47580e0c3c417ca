//! Shared fixtures for gateway integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use forestpest_core::api::ApiError;
use forestpest_core::auth::{SessionListener, TokenStore};
use forestpest_core::gateway::{HttpRequest, RawResponse, Transport, TransportError};
use forestpest_core::{CredentialStore, Gateway, GatewayConfig};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

pub const BASE_URL: &str = "http://backend.test/api";

/// How the scripted backend answers `POST /auth/refresh`.
#[derive(Debug, Clone)]
pub enum RefreshReply {
    /// Issue the pair and start accepting the new access token.
    Issue { access: String, refresh: String },
    /// Issue the pair but keep rejecting every token.
    IssueRevoked { access: String, refresh: String },
    /// Reject the refresh token.
    Reject,
}

/// In-process backend that accepts exactly one access token.
///
/// Every request is recorded synchronously when `execute` is first polled,
/// so the log order is the order in which the gateway issued requests.
pub struct ScriptedTransport {
    valid_token: Mutex<String>,
    refresh_reply: Mutex<RefreshReply>,
    /// When set, the refresh call waits until the gate is opened.
    refresh_gate: Option<Arc<Notify>>,
    /// Reject with an embedded 1004 code on HTTP 200 instead of HTTP 401.
    embedded_rejection: bool,
    /// The first request whose URL ends with this path waits for the gate
    /// before its token is checked.
    held_path: Mutex<Option<(String, Arc<Notify>)>>,
    log: Mutex<Vec<HttpRequest>>,
    refresh_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(valid_token: &str, refresh_reply: RefreshReply) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            refresh_reply: Mutex::new(refresh_reply),
            refresh_gate: None,
            embedded_rejection: false,
            held_path: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn issuing(access: &str, refresh: &str) -> Self {
        Self::new(
            "expired-everywhere",
            RefreshReply::Issue {
                access: access.to_string(),
                refresh: refresh.to_string(),
            },
        )
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.refresh_gate = Some(gate);
        self
    }

    pub fn with_held_path(self, path: &str, gate: Arc<Notify>) -> Self {
        *self.held_path.lock() = Some((path.to_string(), gate));
        self
    }

    pub fn with_embedded_rejection(mut self) -> Self {
        self.embedded_rejection = true;
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().clone()
    }

    /// Bearer tokens of every request sent to a URL ending with `path`.
    pub fn tokens_sent_to(&self, path: &str) -> Vec<Option<String>> {
        self.log
            .lock()
            .iter()
            .filter(|r| r.url.ends_with(path))
            .map(|r| r.bearer_token().map(str::to_string))
            .collect()
    }

    /// Requests (excluding auth endpoints) sent with `token`, by `X-Seq` tag.
    pub fn tags_sent_with(&self, token: &str) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|r| !r.url.contains("/auth/"))
            .filter(|r| r.bearer_token() == Some(token))
            .filter_map(|r| r.header("X-Seq").map(str::to_string))
            .collect()
    }

    fn envelope(code: i64, message: &str, data: serde_json::Value) -> RawResponse {
        RawResponse {
            status: 200,
            body: json!({"code": code, "message": message, "data": data}).to_string(),
        }
    }

    fn rejection(&self) -> RawResponse {
        if self.embedded_rejection {
            Self::envelope(1004, "token expired", serde_json::Value::Null)
        } else {
            RawResponse {
                status: 401,
                body: json!({"code": 401, "message": "unauthorized"}).to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        self.log.lock().push(request.clone());

        if request.url.ends_with("/auth/refresh") {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref gate) = self.refresh_gate {
                gate.notified().await;
            }
            let reply = self.refresh_reply.lock().clone();
            return Ok(match reply {
                RefreshReply::Issue { access, refresh } => {
                    *self.valid_token.lock() = access.clone();
                    Self::envelope(200, "ok", json!({"accessToken": access, "refreshToken": refresh}))
                }
                RefreshReply::IssueRevoked { access, refresh } => {
                    Self::envelope(200, "ok", json!({"accessToken": access, "refreshToken": refresh}))
                }
                RefreshReply::Reject => RawResponse {
                    status: 401,
                    body: json!({"code": 1005, "message": "invalid refresh token"}).to_string(),
                },
            });
        }

        if request.url.ends_with("/auth/logout") {
            return Ok(Self::envelope(200, "ok", serde_json::Value::Null));
        }

        let held = {
            let mut held = self.held_path.lock();
            match held.as_ref() {
                Some((path, _)) if request.url.ends_with(path.as_str()) => held.take(),
                _ => None,
            }
        };
        if let Some((_, gate)) = held {
            gate.notified().await;
        }

        let valid = self.valid_token.lock().clone();
        if request.bearer_token() != Some(valid.as_str()) {
            return Ok(self.rejection());
        }

        Ok(Self::envelope(
            200,
            "ok",
            json!({
                "url": request.url,
                "tag": request.header("X-Seq"),
                "files": request.multipart.as_ref().map_or(0, |m| m.files.len()),
            }),
        ))
    }
}

#[derive(Default)]
pub struct RecordingListener {
    reasons: Mutex<Vec<ApiError>>,
}

impl RecordingListener {
    pub fn count(&self) -> usize {
        self.reasons.lock().len()
    }

    pub fn reasons(&self) -> Vec<ApiError> {
        self.reasons.lock().clone()
    }
}

impl SessionListener for RecordingListener {
    fn session_invalidated(&self, reason: &ApiError) {
        self.reasons.lock().push(reason.clone());
    }
}

pub struct Harness {
    pub gateway: Gateway,
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<TokenStore>,
    pub listener: Arc<RecordingListener>,
}

impl Harness {
    pub fn new(transport: ScriptedTransport, access: &str, refresh: &str) -> Self {
        let transport = Arc::new(transport);
        let store = Arc::new(TokenStore::in_memory());
        store
            .set_tokens(access, refresh, false)
            .expect("seed credentials");
        let listener = Arc::new(RecordingListener::default());
        let gateway = Gateway::new(
            GatewayConfig::new(BASE_URL),
            transport.clone(),
            store.clone(),
            listener.clone(),
        );
        Self {
            gateway,
            transport,
            store,
            listener,
        }
    }
}

/// Poll `condition` until it holds, failing the test after ~2s.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Unsigned JWT whose payload expires at `exp`.
pub fn jwt_expiring_at(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({"sub": "1", "exp": exp}).to_string());
    format!("{header}.{payload}.sig")
}
