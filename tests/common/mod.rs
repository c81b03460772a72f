//! In-process fake Prometheus used by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use prometheus_mcp::{
    backend::BackendRegistry, config::Config, router::QueryRouter, tools::ToolsManager,
};

/// One request as the fake saw it
#[derive(Debug, Clone)]
pub struct Seen {
    pub path: String,
    pub params: HashMap<String, String>,
    pub tenant: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Clone)]
struct FakeState {
    seen: Arc<Mutex<Vec<Seen>>>,
    metrics: Arc<Vec<String>>,
    base_url: Arc<Mutex<String>>,
    abandoned: Arc<AtomicUsize>,
}

/// Handle to a running fake
pub struct FakePrometheus {
    pub url: String,
    seen: Arc<Mutex<Vec<Seen>>>,
    abandoned: Arc<AtomicUsize>,
}

impl FakePrometheus {
    /// Start a fake that reports `metrics` as its metric names
    pub async fn start(metrics: &[&str]) -> Self {
        let state = FakeState {
            seen: Arc::default(),
            metrics: Arc::new(metrics.iter().map(ToString::to_string).collect()),
            base_url: Arc::default(),
            abandoned: Arc::default(),
        };

        let app = Router::new()
            .route("/api/v1/query", get(query))
            .route("/api/v1/query_range", get(query_range))
            .route("/api/v1/label/{name}/values", get(label_values))
            .route("/.well-known/openid-configuration", get(openid))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        *state.base_url.lock().unwrap() = url.clone();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url,
            seen: state.seen,
            abandoned: state.abandoned,
        }
    }

    /// Every request seen so far
    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    /// Slow requests whose handler was dropped before answering
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Requests seen on one path
    pub fn seen_on(&self, path: &str) -> Vec<Seen> {
        self.seen().into_iter().filter(|s| s.path == path).collect()
    }
}

fn record(state: &FakeState, path: String, headers: &HeaderMap, params: HashMap<String, String>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };
    state.seen.lock().unwrap().push(Seen {
        path,
        params,
        tenant: header("x-scope-orgid"),
        authorization: header("authorization"),
    });
}

/// Counts a handler as abandoned if dropped while still armed
struct AbandonGuard(Option<Arc<AtomicUsize>>);

impl AbandonGuard {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if let Some(counter) = self.0.take() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn tenant_label(headers: &HeaderMap) -> String {
    headers
        .get("x-scope-orgid")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

async fn query(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let expr = params.get("query").cloned().unwrap_or_default();
    record(&state, "/api/v1/query".to_string(), &headers, params);

    match expr.as_str() {
        "slow" => {
            let guard = AbandonGuard(Some(Arc::clone(&state.abandoned)));
            tokio::time::sleep(Duration::from_secs(5)).await;
            guard.disarm();
            Json(json!({"status": "success", "data": {"resultType": "vector", "result": []}}))
                .into_response()
        }
        "bad(" => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "errorType": "bad_data",
                "error": "parse error at char 5: unclosed left parenthesis"
            })),
        )
            .into_response(),
        "broken" => (StatusCode::BAD_GATEWAY, "upstream gone").into_response(),
        _ => Json(json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [{
                    "metric": {"__name__": expr, "tenant": tenant_label(&headers)},
                    "value": [1_700_000_000, "1"]
                }]
            }
        }))
        .into_response(),
    }
}

async fn query_range(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let expr = params.get("query").cloned().unwrap_or_default();
    record(&state, "/api/v1/query_range".to_string(), &headers, params);

    Json(json!({
        "status": "success",
        "data": {
            "resultType": "matrix",
            "result": [{
                "metric": {"__name__": expr, "tenant": tenant_label(&headers)},
                "values": [[1_700_000_000, "1"], [1_700_000_060, "2"]]
            }]
        }
    }))
}

async fn label_values(
    State(state): State<FakeState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    record(&state, format!("/api/v1/label/{name}/values"), &headers, params);
    Json(json!({"status": "success", "data": state.metrics.as_slice()}))
}

async fn openid(State(state): State<FakeState>) -> Json<Value> {
    let issuer = state.base_url.lock().unwrap().clone();
    Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token")
    }))
}

/// Parse YAML with `${FAKE_URL}` bound to the fake
pub fn config(yaml: &str, fake_url: &str) -> Config {
    let url = fake_url.to_string();
    Config::from_yaml(yaml, move |name| (name == "FAKE_URL").then(|| url.clone())).unwrap()
}

/// Full tool stack over a config
pub fn tools(config: &Config) -> ToolsManager {
    let registry = Arc::new(BackendRegistry::init(&config.backends));
    ToolsManager::new(QueryRouter::new(registry))
}

/// Router over a config
pub fn router(config: &Config) -> QueryRouter {
    QueryRouter::new(Arc::new(BackendRegistry::init(&config.backends)))
}
