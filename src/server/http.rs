//! HTTP transport: `POST /mcp` plus OAuth discovery endpoints

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::McpServer;
use super::oauth::{openid_configuration_url, protected_resource_document};
use crate::config::{
    AccessLogsConfig, Config, OAuthAuthorizationServerConfig, OAuthProtectedResourceConfig,
};
use crate::transport::describe_error;
use crate::{Error, Result};

/// MCP endpoint
pub const MCP_PATH: &str = "/mcp";
/// Authorization server metadata endpoint
pub const AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";
/// Protected resource metadata endpoint
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

const REDACTED: &str = "***";

/// Shared application state
pub struct AppState {
    /// Protocol handler
    pub server: Arc<McpServer>,
    /// Authorization server relay settings
    pub authorization_server: OAuthAuthorizationServerConfig,
    /// Protected resource document settings
    pub protected_resource: OAuthProtectedResourceConfig,
    /// Client used to reach the OAuth issuer
    pub http: reqwest::Client,
}

impl AppState {
    /// Build state from configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the outbound HTTP client cannot be built.
    pub fn new(config: &Config, server: Arc<McpServer>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            server,
            authorization_server: config.oauth_authorization_server.clone(),
            protected_resource: config.oauth_protected_resource.clone(),
            http,
        })
    }
}

/// Which request headers appear in access logs, and how
#[derive(Debug, Clone, Default)]
pub struct AccessLogPolicy {
    excluded: HashSet<String>,
    redacted: HashSet<String>,
}

impl AccessLogPolicy {
    /// Build from config; header names compare case-insensitively
    #[must_use]
    pub fn new(config: &AccessLogsConfig) -> Self {
        let lower = |names: &[String]| -> HashSet<String> {
            names.iter().map(|n| n.to_ascii_lowercase()).collect()
        };
        Self {
            excluded: lower(&config.excluded_headers),
            redacted: lower(&config.redacted_headers),
        }
    }

    /// Headers as they should be logged: excluded ones dropped, redacted ones masked
    #[must_use]
    pub fn render(&self, headers: &HeaderMap) -> BTreeMap<String, String> {
        let mut rendered = BTreeMap::new();
        for (name, value) in headers {
            let name = name.as_str();
            if self.excluded.contains(name) {
                continue;
            }
            let value = if self.redacted.contains(name) {
                REDACTED.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            rendered
                .entry(name.to_string())
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        rendered
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>, access_logs: Arc<AccessLogPolicy>) -> Router {
    let mut router: Router<Arc<AppState>> =
        Router::new().route(MCP_PATH, post(mcp_handler).get(mcp_get_handler));

    if state.authorization_server.enabled {
        router = router.route(AUTHORIZATION_SERVER_PATH, get(authorization_server_handler));
    }
    if state.protected_resource.enabled {
        router = router.route(PROTECTED_RESOURCE_PATH, get(protected_resource_handler));
    }

    router
        .layer(middleware::from_fn_with_state(access_logs, access_log_middleware))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `server.transport.http.host` and serve until Ctrl+C / SIGTERM
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(config: &Config, server: Arc<McpServer>) -> Result<()> {
    let host = &config.server.transport.http.host;
    let state = Arc::new(AppState::new(config, server)?);
    let access_logs = Arc::new(AccessLogPolicy::new(&config.middleware.access_logs));
    let app = create_router(state, access_logs);

    let listener = TcpListener::bind(host.as_str()).await?;
    info!(host = %host, path = MCP_PATH, "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

async fn access_log_middleware(
    State(policy): State<Arc<AccessLogPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let headers = policy.render(request.headers());
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        headers = ?headers,
        "Access log"
    );
    response
}

/// POST /mcp: one JSON-RPC message per request
async fn mcp_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let text = String::from_utf8_lossy(&body);
    match state.server.handle_text(&text).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// GET /mcp: no server-initiated stream is offered
async fn mcp_get_handler() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "jsonrpc": "2.0",
            "error": {
                "code": -32600,
                "message": "Streaming not supported. Use POST to send JSON-RPC requests to /mcp"
            },
            "id": null
        })),
    )
        .into_response()
}

/// GET /.well-known/oauth-authorization-server: relay the issuer's discovery document
async fn authorization_server_handler(State(state): State<Arc<AppState>>) -> Response {
    let url = openid_configuration_url(&state.authorization_server.issuer_uri);
    debug!(url = %url, "Fetching issuer metadata");

    let response = match state.http.get(&url).send().await {
        Ok(response) => response,
        Err(e) => return bad_gateway(&format!("failed to reach issuer: {}", describe_error(&e))),
    };
    if !response.status().is_success() {
        return bad_gateway(&format!("issuer returned {}", response.status()));
    }

    match response.json::<Value>().await {
        Ok(document) => Json(document).into_response(),
        Err(e) => bad_gateway(&format!("invalid issuer metadata: {e}")),
    }
}

/// GET /.well-known/oauth-protected-resource
async fn protected_resource_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(protected_resource_document(&state.protected_resource)).into_response()
}

fn bad_gateway(message: &str) -> Response {
    warn!(error = %message, "OAuth metadata relay failed");
    (StatusCode::BAD_GATEWAY, Json(json!({ "error": message }))).into_response()
}
