#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sbom_scan::config::ServerConfig;
use sbom_scan::iq::IqServerClient;
use serde_json::json;
use tokio::net::TcpListener;

/// `admin:admin123`
pub const VALID_AUTH: &str = "Basic YWRtaW46YWRtaW4xMjM=";

/// Applications whose evaluation ends with `isError: true`.
pub const BROKEN_APP: &str = "broken";
/// Applications whose first submission answers 503.
pub const FLAKY_APP: &str = "flaky";
/// Applications whose status locator answers 404 forever.
pub const STUCK_APP: &str = "stuck";
/// Applications whose report carries a policy failure.
pub const FAILING_APP: &str = "failing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmit {
    pub application_id: String,
    pub stage: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Default)]
pub struct FakeIq {
    submits: Mutex<Vec<RecordedSubmit>>,
    submit_attempts: Mutex<HashMap<String, u32>>,
    polls: Mutex<HashMap<String, u32>>,
    requests: Mutex<u32>,
}

impl FakeIq {
    pub fn submits(&self) -> Vec<RecordedSubmit> {
        self.submits.lock().expect("submit log").clone()
    }

    /// Every request the server received, authorized or not.
    pub fn requests(&self) -> u32 {
        *self.requests.lock().expect("request log")
    }

    fn seen(&self) {
        *self.requests.lock().expect("request log") += 1;
    }

    pub fn polls_for(&self, application_id: &str) -> u32 {
        self.polls
            .lock()
            .expect("poll log")
            .get(application_id)
            .copied()
            .unwrap_or_default()
    }
}

/// Serves the fake IQ Server on an ephemeral port and returns its base URL.
pub async fn spawn_fake_iq() -> (String, Arc<FakeIq>) {
    let state = Arc::new(FakeIq::default());
    let app = Router::new()
        .route(
            "/api/v2/scan/applications/:application_id/sources/cyclonedx",
            post(submit_scan),
        )
        .route(
            "/api/v2/scan/applications/:application_id/status/:scan_id",
            get(scan_status),
        )
        .route("/api/v2/applications", get(list_applications))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake IQ Server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake IQ Server");
    });

    (format!("http://{addr}"), state)
}

pub fn client_for(url: &str, password: &str) -> IqServerClient {
    let config = ServerConfig {
        url: url.to_string(),
        username: "admin".to_string(),
        password: password.to_string(),
        submit_timeout: Duration::from_secs(5),
        poll_timeout: Duration::from_secs(5),
    };
    IqServerClient::from_config(&config).expect("client builds")
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == VALID_AUTH)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "bad credentials").into_response()
}

async fn submit_scan(
    State(state): State<Arc<FakeIq>>,
    Path(application_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.seen();
    if !authorized(&headers) {
        return unauthorized();
    }

    let attempt = {
        let mut attempts = state.submit_attempts.lock().expect("attempt log");
        let counter = attempts.entry(application_id.clone()).or_default();
        *counter += 1;
        *counter
    };
    if application_id == FLAKY_APP && attempt == 1 {
        return (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response();
    }

    let scan_id = {
        let mut submits = state.submits.lock().expect("submit log");
        submits.push(RecordedSubmit {
            application_id: application_id.clone(),
            stage: query.get("stageId").cloned(),
            content_type: headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            body,
        });
        submits.len()
    };

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "statusUrl": format!("api/v2/scan/applications/{application_id}/status/{scan_id}")
        })),
    )
        .into_response()
}

async fn scan_status(
    State(state): State<Arc<FakeIq>>,
    Path((application_id, scan_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    state.seen();
    if !authorized(&headers) {
        return unauthorized();
    }

    let seen = {
        let mut polls = state.polls.lock().expect("poll log");
        let counter = polls.entry(application_id.clone()).or_default();
        *counter += 1;
        *counter
    };

    // The report only exists from the second status request on.
    if seen == 1 || application_id == STUCK_APP {
        return (StatusCode::NOT_FOUND, "scan report not ready").into_response();
    }

    let body = match application_id.as_str() {
        BROKEN_APP => json!({
            "isError": true,
            "errorMessage": "unable to parse CycloneDX document"
        }),
        FAILING_APP => json!({
            "policyAction": "Failure",
            "reportHtmlUrl": format!("ui/links/application/{application_id}/report/{scan_id}"),
            "reportDataUrl": format!("api/v2/applications/{application_id}/reports/{scan_id}"),
            "isError": false
        }),
        _ => json!({
            "policyAction": "None",
            "reportHtmlUrl": format!("ui/links/application/{application_id}/report/{scan_id}"),
            "reportDataUrl": format!("api/v2/applications/{application_id}/reports/{scan_id}"),
            "isError": false
        }),
    };

    Json(body).into_response()
}

async fn list_applications(State(state): State<Arc<FakeIq>>, headers: HeaderMap) -> Response {
    state.seen();
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "applications": [] })).into_response()
}
