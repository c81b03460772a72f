//! Prometheus MCP Library
//!
//! Model Context Protocol server exposing PromQL queries and metric discovery
//! over any number of Prometheus-compatible backends (Prometheus, Mimir,
//! Cortex, Thanos, VictoriaMetrics, PMM).
//!
//! # Features
//!
//! - **Multi-Backend**: named backends, each with its own URL, credentials and timeout
//! - **Multi-Tenant**: per-call `org_id` sent as `X-Scope-OrgId`, falling back to the backend default
//! - **Backend Auth**: basic or bearer credentials injected per backend
//! - **Metric Discovery**: glob-filtered, paginated metric name listing
//! - **Transports**: stdio and HTTP (`POST /mcp`), with OAuth discovery endpoints
//!
//! # Startup
//!
//! Backends without a URL, or whose client cannot be built, are skipped
//! with a warning; the server starts with whatever remains.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod prometheus;
pub mod protocol;
pub mod router;
pub mod server;
pub mod tools;
pub mod transport;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging.
///
/// `RUST_LOG` takes precedence over `level`. Output always goes to stderr so
/// the stdio transport keeps stdout for protocol messages.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let result = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize logging: {e}")))
}
