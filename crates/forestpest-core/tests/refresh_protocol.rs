//! Integration tests for the single-flight refresh-and-replay protocol.
//!
//! These run against a scripted in-process backend so that the interleaving
//! of rejected requests and the refresh call is fully controlled.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forestpest_core::api::{ApiError, ErrorKind};
use forestpest_core::gateway::ApiRequest;
use forestpest_core::{CredentialStore, ForestApi};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Notify;

use support::{jwt_expiring_at, wait_until, Harness, RefreshReply, ScriptedTransport};

fn tagged(path: &str, seq: usize) -> ApiRequest {
    ApiRequest::get(path).header("X-Seq", seq.to_string())
}

/// N requests rejected together produce exactly one refresh call, and every
/// one of them succeeds with the refreshed token.
#[tokio::test]
async fn test_concurrent_rejections_share_one_refresh() {
    let h = Harness::new(ScriptedTransport::issuing("new", "new2"), "old", "r1");

    let sends = (0..5).map(|i| h.gateway.send(tagged("/pest/list", i)));
    let results = join_all(sends).await;

    assert_eq!(h.transport.refresh_calls(), 1);
    for (i, result) in results.into_iter().enumerate() {
        let data = result.expect("replayed request succeeds");
        assert_eq!(data["tag"], json!(i.to_string()));
    }
    assert_eq!(h.store.access_token().as_deref(), Some("new"));
    assert_eq!(h.store.refresh_token().as_deref(), Some("new2"));
    assert_eq!(h.listener.count(), 0);
    assert!(!h.gateway.is_refreshing());
    assert_eq!(h.gateway.pending_replays(), 0);
}

/// Without a refresh token the gateway gives up at once: no refresh call,
/// credentials cleared, listener notified.
#[tokio::test]
async fn test_missing_refresh_token_invalidates_without_network_refresh() {
    let h = Harness::new(ScriptedTransport::issuing("new", "new2"), "old", "");

    let err = h
        .gateway
        .send(ApiRequest::delete("/pesticide/5"))
        .await
        .expect_err("request must fail");

    assert_eq!(err.kind(), ErrorKind::AuthExpired);
    assert_eq!(h.transport.refresh_calls(), 0);
    assert_eq!(h.transport.requests().len(), 1);
    assert_eq!(h.store.access_token(), None);
    assert_eq!(h.listener.count(), 1);
}

/// Requests queued behind an in-flight refresh are replayed in the order
/// they arrived.
#[tokio::test]
async fn test_queued_requests_replay_in_arrival_order() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(
        ScriptedTransport::issuing("new", "new2").with_gate(gate.clone()),
        "old",
        "r1",
    );

    let mut handles = Vec::new();
    for seq in 0..4 {
        let gateway = h.gateway.clone();
        handles.push(tokio::spawn(async move {
            gateway.send(tagged("/treatment/plans", seq)).await
        }));
        let gateway = h.gateway.clone();
        wait_until(move || gateway.pending_replays() == seq + 1).await;
    }
    assert!(h.gateway.is_refreshing());
    assert_eq!(h.transport.refresh_calls(), 1);

    gate.notify_one();

    for (seq, handle) in handles.into_iter().enumerate() {
        let data = handle.await.expect("task").expect("replay succeeds");
        assert_eq!(data["tag"], json!(seq.to_string()));
    }
    assert_eq!(h.transport.tags_sent_with("new"), vec!["0", "1", "2", "3"]);
    assert_eq!(h.transport.refresh_calls(), 1);
}

/// A replay rejected again after a successful refresh is final; no second
/// refresh is attempted.
#[tokio::test]
async fn test_rejected_replay_does_not_refresh_again() {
    let transport = ScriptedTransport::new(
        "nothing-is-valid",
        RefreshReply::IssueRevoked {
            access: "new".to_string(),
            refresh: "new2".to_string(),
        },
    );
    let h = Harness::new(transport, "old", "r1");

    let err = h
        .gateway
        .send(ApiRequest::get("/pest/list"))
        .await
        .expect_err("replay rejected");

    assert_eq!(err.kind(), ErrorKind::AuthExpired);
    assert_eq!(h.transport.refresh_calls(), 1);
    // The refresh itself succeeded, so the session is kept
    assert_eq!(h.store.access_token().as_deref(), Some("new"));
    assert_eq!(h.listener.count(), 0);
}

/// A rejected refresh fails every waiting request with the same error and
/// ends the session once.
#[tokio::test]
async fn test_refresh_failure_rejects_whole_queue() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(
        ScriptedTransport::new("valid", RefreshReply::Reject).with_gate(gate.clone()),
        "old",
        "r1",
    );

    let mut handles = Vec::new();
    for seq in 0..3 {
        let gateway = h.gateway.clone();
        handles.push(tokio::spawn(async move {
            gateway.send(tagged("/pesticide/list", seq)).await
        }));
        let gateway = h.gateway.clone();
        wait_until(move || gateway.pending_replays() == seq + 1).await;
    }
    gate.notify_one();

    let mut errors = Vec::new();
    for handle in handles {
        errors.push(handle.await.expect("task").expect_err("refresh failed"));
    }
    assert!(errors.iter().all(|e| e.kind() == ErrorKind::RefreshFailed));
    assert!(errors.windows(2).all(|w| w[0] == w[1]));

    assert_eq!(h.transport.refresh_calls(), 1);
    assert_eq!(h.listener.count(), 1);
    assert_eq!(h.store.access_token(), None);
    assert_eq!(h.store.refresh_token(), None);
    assert!(!h.gateway.is_refreshing());
}

/// Logout while a refresh is in flight rejects the queue immediately and the
/// late refresh result does not bring the session back.
#[tokio::test]
async fn test_logout_during_refresh_discards_late_tokens() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(
        ScriptedTransport::issuing("new", "new2").with_gate(gate.clone()),
        "old",
        "r1",
    );

    let gateway = h.gateway.clone();
    let waiting = tokio::spawn(async move { gateway.send(ApiRequest::get("/pest/list")).await });
    let gateway = h.gateway.clone();
    wait_until(move || gateway.pending_replays() == 1).await;

    h.gateway.logout().await;

    let err = waiting.await.expect("task").expect_err("rejected by logout");
    assert_eq!(err, ApiError::AuthExpired("Session ended by logout".to_string()));
    assert_eq!(h.store.access_token(), None);

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.transport.refresh_calls(), 1);
    assert_eq!(h.store.access_token(), None);
    assert_eq!(h.store.refresh_token(), None);
    // Logout is user-initiated, not an invalidation
    assert_eq!(h.listener.count(), 0);
}

/// An embedded token-expired code on an HTTP 200 response is treated like a 401.
#[tokio::test]
async fn test_embedded_expiry_code_triggers_refresh() {
    let h = Harness::new(
        ScriptedTransport::issuing("new", "new2").with_embedded_rejection(),
        "old",
        "r1",
    );

    let data = h
        .gateway
        .send(ApiRequest::get("/forest/resources"))
        .await
        .expect("replayed after refresh");

    assert_eq!(data["url"], json!("http://backend.test/api/forest/resources"));
    assert_eq!(h.transport.refresh_calls(), 1);
}

/// Two identical sends with a valid token are two independent calls.
#[tokio::test]
async fn test_identical_sends_are_independent() {
    let h = Harness::new(ScriptedTransport::new("good", RefreshReply::Reject), "good", "r1");

    let first = h.gateway.send(ApiRequest::get("/pest/list")).await;
    let second = h.gateway.send(ApiRequest::get("/pest/list")).await;

    assert_eq!(first, second);
    assert!(first.is_ok());
    assert_eq!(h.transport.requests().len(), 2);
    assert_eq!(h.transport.refresh_calls(), 0);
}

/// The refresh request carries the stored refresh token in its body.
#[tokio::test]
async fn test_refresh_request_shape() {
    let h = Harness::new(ScriptedTransport::issuing("new", "new2"), "old", "r1");

    h.gateway
        .send(ApiRequest::get("/pest/list"))
        .await
        .expect("ok");

    let refresh = h
        .transport
        .requests()
        .into_iter()
        .find(|r| r.url.ends_with("/auth/refresh"))
        .expect("refresh sent");
    assert_eq!(refresh.method, reqwest::Method::POST);
    assert_eq!(refresh.body, Some(json!({"refreshToken": "r1"})));
}

#[tokio::test]
async fn test_proactive_refresh_when_token_expiring() {
    let expiring = jwt_expiring_at(Utc::now().timestamp() + 60);
    let h = Harness::new(ScriptedTransport::issuing("new", "new2"), &expiring, "r1");

    let refreshed = h.gateway.refresh_if_expiring().await.expect("refresh ok");

    assert!(refreshed);
    assert_eq!(h.transport.refresh_calls(), 1);
    assert_eq!(h.store.access_token().as_deref(), Some("new"));
}

#[tokio::test]
async fn test_proactive_refresh_skips_fresh_and_opaque_tokens() {
    let fresh = jwt_expiring_at(Utc::now().timestamp() + 3600);
    let h = Harness::new(ScriptedTransport::issuing("new", "new2"), &fresh, "r1");
    assert_eq!(h.gateway.refresh_if_expiring().await, Ok(false));

    let h = Harness::new(ScriptedTransport::issuing("new", "new2"), "opaque", "r1");
    assert_eq!(h.gateway.refresh_if_expiring().await, Ok(false));
    assert_eq!(h.transport.refresh_calls(), 0);
}

#[tokio::test]
async fn test_auto_refresh_task_refreshes_expiring_token() {
    let expiring = jwt_expiring_at(Utc::now().timestamp() + 10);
    let h = Harness::new(ScriptedTransport::issuing("new", "new2"), &expiring, "r1");

    let handle = h.gateway.start_auto_refresh(Duration::from_millis(20));
    let store = h.store.clone();
    wait_until(move || store.access_token().as_deref() == Some("new")).await;
    handle.abort();

    assert_eq!(h.transport.refresh_calls(), 1);
}

/// A request sent with the old token whose rejection arrives after the wave
/// already failed gets the wave's error; the session ends only once.
#[tokio::test]
async fn test_late_rejection_after_failed_refresh_shares_wave_error() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(
        ScriptedTransport::new("valid", RefreshReply::Reject).with_held_path("/slow", gate.clone()),
        "old",
        "r1",
    );

    let gateway = h.gateway.clone();
    let slow = tokio::spawn(async move { gateway.get("/slow").await });
    let transport = h.transport.clone();
    wait_until(move || transport.requests().len() == 1).await;

    let fast = h.gateway.get("/fast").await.expect_err("refresh rejected");
    assert_eq!(fast.kind(), ErrorKind::RefreshFailed);
    assert_eq!(h.listener.count(), 1);

    gate.notify_one();
    let late = slow.await.expect("task").expect_err("session already over");

    assert_eq!(late, fast);
    assert_eq!(h.listener.count(), 1);
    assert_eq!(h.transport.refresh_calls(), 1);
}

/// A request rejected with a token that a finished wave already replaced is
/// replayed with the current token, without another refresh.
#[tokio::test]
async fn test_late_rejection_after_successful_refresh_replays_directly() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(
        ScriptedTransport::issuing("new", "new2").with_held_path("/slow", gate.clone()),
        "old",
        "r1",
    );

    let gateway = h.gateway.clone();
    let slow = tokio::spawn(async move { gateway.get("/slow").await });
    let transport = h.transport.clone();
    wait_until(move || transport.requests().len() == 1).await;

    let fast = h.gateway.get("/fast").await.expect("refreshed and replayed");
    assert_eq!(fast["url"], json!("http://backend.test/api/fast"));
    assert!(!h.gateway.is_refreshing());

    gate.notify_one();
    let data = slow.await.expect("task").expect("replayed with new token");

    assert_eq!(data["url"], json!("http://backend.test/api/slow"));
    assert_eq!(h.transport.refresh_calls(), 1);
    assert_eq!(
        h.transport.tokens_sent_to("/slow"),
        vec![Some("old".to_string()), Some("new".to_string())]
    );
    assert_eq!(h.listener.count(), 0);
}

/// A caller-supplied Authorization header never reaches the wire; the
/// stored token is sent exactly once.
#[tokio::test]
async fn test_caller_authorization_header_is_replaced() {
    let h = Harness::new(ScriptedTransport::new("good", RefreshReply::Reject), "good", "r1");

    h.gateway
        .send(ApiRequest::get("/pest/list").header("Authorization", "Bearer stale"))
        .await
        .expect("sent with stored token");

    let requests = h.transport.requests();
    let auth_headers = requests[0]
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("authorization"))
        .count();
    assert_eq!(auth_headers, 1);
    assert_eq!(requests[0].bearer_token(), Some("good"));
}

#[derive(Debug, Deserialize, PartialEq)]
struct Echo {
    url: String,
    tag: Option<String>,
}

#[tokio::test]
async fn test_send_as_decodes_payload() {
    let h = Harness::new(ScriptedTransport::new("good", RefreshReply::Reject), "good", "r1");

    let echo: Echo = h
        .gateway
        .send_as(ApiRequest::get("/pest/list").header("X-Seq", "7"))
        .await
        .expect("decoded");
    assert_eq!(
        echo,
        Echo {
            url: "http://backend.test/api/pest/list".to_string(),
            tag: Some("7".to_string()),
        }
    );

    let err = h
        .gateway
        .send_as::<Vec<u32>>(ApiRequest::get("/pest/list"))
        .await
        .expect_err("payload is an object");
    assert!(matches!(err, ApiError::InvalidResponse(_)));
}

/// An upload rejected for an expired token is replayed with its file intact.
#[tokio::test]
async fn test_multipart_upload_survives_replay() {
    let h = Harness::new(ScriptedTransport::issuing("new", "new2"), "old", "r1");
    let api = ForestApi::new(h.gateway.clone());

    let data = api
        .identify_pest("leaf.jpg", "image/jpeg", vec![1, 2, 3], &[("location", "North ridge")])
        .await
        .expect("identified after refresh");
    assert_eq!(data["files"], json!(1));

    let uploads: Vec<_> = h
        .transport
        .requests()
        .into_iter()
        .filter(|r| r.url.ends_with("/pest/identify"))
        .collect();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].multipart, uploads[1].multipart);
    assert_eq!(uploads[1].bearer_token(), Some("new"));
    assert_eq!(uploads[1].header("content-type"), None);
}
