//! Scriptable mock viewing-time backend.
//!
//! Serves the four endpoints the agent relies on, with per-test state:
//! a queue of balance responses (the last entry is sticky), a
//! configurable heartbeat reply, failure injection, and recordings of
//! everything the agent sent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use viewtime_agent::api::models::ViewingTimeBalance;

enum BalanceStep {
    Ok(ViewingTimeBalance),
    Fail(u16),
}

struct HeartbeatScript {
    enforcement: String,
    remaining_minutes: Option<i64>,
    is_educational: bool,
    fail_with: Option<u16>,
}

impl Default for HeartbeatScript {
    fn default() -> Self {
        Self {
            enforcement: "allowed".to_string(),
            remaining_minutes: Some(30),
            is_educational: false,
            fail_with: None,
        }
    }
}

#[derive(Default)]
struct BackendState {
    balance_script: Mutex<VecDeque<BalanceStep>>,
    balance_requests: AtomicUsize,
    heartbeat: Mutex<HeartbeatScript>,
    heartbeat_requests: Mutex<Vec<serde_json::Value>>,
    session_counter: AtomicUsize,
    end_session_calls: Mutex<Vec<String>>,
    eligible: Mutex<bool>,
    last_authorization: Mutex<Option<String>>,
}

/// Mock backend instance bound to a random local port.
///
/// The server task is aborted when the backend is dropped.
pub struct MockBackend {
    /// Base URL for the agent (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    state: Arc<BackendState>,
    server_task: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    /// Spawns a mock backend on a random port.
    pub async fn spawn() -> Self {
        let state = Arc::new(BackendState {
            eligible: Mutex::new(true),
            ..Default::default()
        });

        let app = Router::new()
            .route("/viewing-time/balance/{profile_id}", get(get_balance))
            .route("/viewing-time/heartbeat", post(post_heartbeat))
            .route("/viewing-time/session/{session_id}/end", post(post_end_session))
            .route(
                "/viewing-time/playback-eligible/{profile_id}",
                get(get_eligibility),
            )
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().expect("Failed to read local addr");

        let server_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Mock backend stopped unexpectedly");
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            server_task,
        }
    }

    /// Queue a balance response. The last queued entry is sticky: it is
    /// served for every request after the queue drains down to it.
    pub fn enqueue_balance(&self, balance: ViewingTimeBalance) {
        self.state
            .balance_script
            .lock()
            .unwrap()
            .push_back(BalanceStep::Ok(balance));
    }

    /// Queue a failing balance response with the given HTTP status.
    pub fn enqueue_balance_failure(&self, status: u16) {
        self.state
            .balance_script
            .lock()
            .unwrap()
            .push_back(BalanceStep::Fail(status));
    }

    /// Drop all queued balance responses.
    pub fn clear_balances(&self) {
        self.state.balance_script.lock().unwrap().clear();
    }

    pub fn balance_request_count(&self) -> usize {
        self.state.balance_requests.load(Ordering::SeqCst)
    }

    /// Configure the reply sent for every subsequent heartbeat.
    pub fn set_heartbeat_reply(&self, enforcement: &str, remaining_minutes: Option<i64>) {
        let mut script = self.state.heartbeat.lock().unwrap();
        script.enforcement = enforcement.to_string();
        script.remaining_minutes = remaining_minutes;
        script.fail_with = None;
    }

    pub fn set_heartbeat_educational(&self, is_educational: bool) {
        self.state.heartbeat.lock().unwrap().is_educational = is_educational;
    }

    /// Make every subsequent heartbeat fail with the given HTTP status.
    pub fn fail_heartbeats(&self, status: u16) {
        self.state.heartbeat.lock().unwrap().fail_with = Some(status);
    }

    /// Raw JSON bodies of every heartbeat received, in order.
    pub fn heartbeat_requests(&self) -> Vec<serde_json::Value> {
        self.state.heartbeat_requests.lock().unwrap().clone()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.state.heartbeat_requests.lock().unwrap().len()
    }

    /// Session ids of every end-of-session call received, in order.
    pub fn end_session_calls(&self) -> Vec<String> {
        self.state.end_session_calls.lock().unwrap().clone()
    }

    pub fn set_eligible(&self, eligible: bool) {
        *self.state.eligible.lock().unwrap() = eligible;
    }

    /// The Authorization header of the most recent request.
    pub fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}

fn record_authorization(state: &BackendState, headers: &HeaderMap) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    *state.last_authorization.lock().unwrap() = auth;
}

async fn get_balance(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(profile_id): Path<String>,
) -> Response {
    record_authorization(&state, &headers);
    state.balance_requests.fetch_add(1, Ordering::SeqCst);

    let step = {
        let mut script = state.balance_script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front()
        } else {
            // Sticky last entry: serve it without consuming.
            match script.front() {
                Some(BalanceStep::Ok(balance)) => Some(BalanceStep::Ok(balance.clone())),
                Some(BalanceStep::Fail(status)) => Some(BalanceStep::Fail(*status)),
                None => None,
            }
        }
    };

    match step {
        Some(BalanceStep::Ok(mut balance)) => {
            balance.profile_id = profile_id;
            Json(balance).into_response()
        }
        Some(BalanceStep::Fail(status)) => StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn post_heartbeat(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    record_authorization(&state, &headers);
    state.heartbeat_requests.lock().unwrap().push(body.clone());

    let script = state.heartbeat.lock().unwrap();
    if let Some(status) = script.fail_with {
        return StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response();
    }

    let session_id = match body.get("session_id").and_then(|v| v.as_str()) {
        Some(existing) => existing.to_string(),
        None => {
            let n = state.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("sess-{}", n)
        }
    };

    Json(json!({
        "session_id": session_id,
        "enforcement": script.enforcement,
        "remaining_minutes": script.remaining_minutes,
        "used_minutes": 10,
        "is_educational": script.is_educational,
    }))
    .into_response()
}

async fn post_end_session(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    record_authorization(&state, &headers);
    state
        .end_session_calls
        .lock()
        .unwrap()
        .push(session_id.clone());

    Json(json!({
        "session_id": session_id,
        "total_seconds": 90,
        "ended_at": "2026-08-06T12:00:00Z",
    }))
    .into_response()
}

async fn get_eligibility(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(_profile_id): Path<String>,
) -> Response {
    record_authorization(&state, &headers);
    let eligible = *state.eligible.lock().unwrap();

    Json(json!({
        "eligible": eligible,
        "enforcement": if eligible { "allowed" } else { "blocked" },
        "remaining_minutes": if eligible { Some(30) } else { Some(0) },
    }))
    .into_response()
}
