//! MCP tools backed by the query router
//!
//! Three tools are exposed:
//!
//! - `prometheus_query`: instant PromQL query
//! - `prometheus_range_query`: PromQL over a time range
//! - `prometheus_list_metrics`: metric names, with glob filter and pagination
//!
//! Tool failures are reported in-band (`isError: true`); only an unknown
//! tool name is a protocol error.

mod args;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use self::args::{ListMetricsArgs, QueryArgs, RangeQueryArgs, parse_args};
use crate::config::humantime_serde::{format_duration, parse_duration};
use crate::error::rpc_codes;
use crate::protocol::{Tool, ToolAnnotations, ToolsCallResult};
use crate::router::QueryRouter;
use crate::{Error, Result};

/// Instant query tool name
pub const QUERY_TOOL: &str = "prometheus_query";
/// Range query tool name
pub const RANGE_QUERY_TOOL: &str = "prometheus_range_query";
/// Metric listing tool name
pub const LIST_METRICS_TOOL: &str = "prometheus_list_metrics";

/// Step used when a range query gives none
pub const DEFAULT_STEP: Duration = Duration::from_secs(60);

/// Tool registry and dispatcher
pub struct ToolsManager {
    router: QueryRouter,
    tools: Vec<Tool>,
}

impl ToolsManager {
    /// Build the tool set; argument descriptions list the configured backends
    #[must_use]
    pub fn new(router: QueryRouter) -> Self {
        let tools = build_tools(&router.backend_description(), &router.org_id_description());
        Self { router, tools }
    }

    /// Tool definitions for `tools/list`
    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// The router tools execute against
    #[must_use]
    pub fn router(&self) -> &QueryRouter {
        &self.router
    }

    /// Run a tool.
    ///
    /// # Errors
    ///
    /// Only for an unknown tool name; every other failure is an error result.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<ToolsCallResult> {
        debug!(tool = %name, "Tool call");
        let outcome = match name {
            QUERY_TOOL => self.query(arguments).await,
            RANGE_QUERY_TOOL => self.range_query(arguments).await,
            LIST_METRICS_TOOL => self.list_metrics(arguments).await,
            _ => {
                return Err(Error::json_rpc(
                    rpc_codes::INVALID_PARAMS,
                    format!("Unknown tool: {name}"),
                ));
            }
        };

        Ok(match outcome {
            Ok(text) => ToolsCallResult::text(text),
            Err(failure) => {
                info!(tool = %name, backend = failure.backend.as_deref().unwrap_or(""), error = %failure.error, "Tool call failed");
                ToolsCallResult::error(failure.to_string())
            }
        })
    }

    async fn query(&self, arguments: Value) -> std::result::Result<String, Failure> {
        let args: QueryArgs = parse_args(arguments).map_err(Failure::unresolved)?;
        let backend = self
            .router
            .resolve_backend(&args.backend)
            .map_err(Failure::unresolved)?;
        let tenant = tenant(&args.org_id);
        self.router.warn_if_tenant_ignored(&backend, tenant);

        let on_backend = |e: Error| Failure::on(&backend, e);
        if args.query.is_empty() {
            return Err(on_backend(required("query")));
        }
        let timestamp = if args.time.is_empty() {
            Utc::now()
        } else {
            parse_time(&args.time, "time").map_err(on_backend)?
        };

        let data = self
            .router
            .query(&backend, &args.query, timestamp, tenant)
            .await
            .map_err(on_backend)?;

        Ok(format!(
            "Prometheus Query Results [{backend}]:\n\nQuery: {}\nTimestamp: {}\n\nResults:\n{}",
            args.query,
            format_time(timestamp),
            pretty(&data).map_err(on_backend)?
        ))
    }

    async fn range_query(&self, arguments: Value) -> std::result::Result<String, Failure> {
        let args: RangeQueryArgs = parse_args(arguments).map_err(Failure::unresolved)?;
        let backend = self
            .router
            .resolve_backend(&args.backend)
            .map_err(Failure::unresolved)?;
        let tenant = tenant(&args.org_id);
        self.router.warn_if_tenant_ignored(&backend, tenant);

        let on_backend = |e: Error| Failure::on(&backend, e);
        if args.query.is_empty() {
            return Err(on_backend(required("query")));
        }
        if args.start.is_empty() {
            return Err(on_backend(required("start")));
        }
        if args.end.is_empty() {
            return Err(on_backend(required("end")));
        }
        let start = parse_time(&args.start, "start time").map_err(on_backend)?;
        let end = parse_time(&args.end, "end time").map_err(on_backend)?;
        let step = if args.step.is_empty() {
            DEFAULT_STEP
        } else {
            parse_duration(&args.step).map_err(|e| {
                on_backend(Error::InvalidArgument(format!("invalid step duration: {e}")))
            })?
        };

        let data = self
            .router
            .query_range(&backend, &args.query, start, end, step, tenant)
            .await
            .map_err(on_backend)?;

        Ok(format!(
            "Range Query Results [{backend}]:\n\nQuery: {}\nStart: {}\nEnd: {}\nStep: {}\n\nResults:\n{}",
            args.query,
            format_time(start),
            format_time(end),
            format_duration(&step),
            pretty(&data).map_err(on_backend)?
        ))
    }

    async fn list_metrics(&self, arguments: Value) -> std::result::Result<String, Failure> {
        let args: ListMetricsArgs = parse_args(arguments).map_err(Failure::unresolved)?;
        let backend = self
            .router
            .resolve_backend(&args.backend)
            .map_err(Failure::unresolved)?;
        let tenant = tenant(&args.org_id);
        self.router.warn_if_tenant_ignored(&backend, tenant);

        let on_backend = |e: Error| Failure::on(&backend, e);
        let page = self
            .router
            .list_metrics(&backend, &args.query, args.limit, args.offset, tenant)
            .await
            .map_err(on_backend)?;

        Ok(format!(
            "Available Metrics [{backend}]:\n\n{}",
            pretty(&page).map_err(on_backend)?
        ))
    }
}

/// A tool failure, tagged with the backend once one was resolved
struct Failure {
    backend: Option<String>,
    error: Error,
}

impl Failure {
    fn unresolved(error: Error) -> Self {
        Self {
            backend: None,
            error,
        }
    }

    fn on(backend: &str, error: Error) -> Self {
        Self {
            backend: Some(backend.to_string()),
            error,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.backend, self.error.backend()) {
            (Some(backend), None) => write!(f, "backend {backend:?}: {}", self.error),
            // Unresolved, or the error already names its backend
            _ => write!(f, "{}", self.error),
        }
    }
}

fn tenant(org_id: &str) -> Option<&str> {
    Some(org_id).filter(|t| !t.is_empty())
}

fn required(name: &str) -> Error {
    Error::InvalidArgument(format!("{name} parameter is required"))
}

fn parse_time(value: &str, what: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InvalidArgument(format!("invalid {what} format, use RFC3339: {e}")))
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn build_tools(backend_desc: &str, org_id_desc: &str) -> Vec<Tool> {
    vec![
        Tool {
            name: QUERY_TOOL.to_string(),
            title: Some("PromQL Query".to_string()),
            description: Some("Execute a PromQL query against a metrics backend".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "backend": {
                        "type": "string",
                        "description": backend_desc
                    },
                    "query": {
                        "type": "string",
                        "description": "The PromQL query to execute"
                    },
                    "time": {
                        "type": "string",
                        "description": "Timestamp for the query (RFC3339 format). If not provided, uses current time"
                    },
                    "org_id": {
                        "type": "string",
                        "description": org_id_desc
                    }
                },
                "required": ["query"]
            }),
            annotations: Some(ToolAnnotations::read_only()),
        },
        Tool {
            name: RANGE_QUERY_TOOL.to_string(),
            title: Some("PromQL Range Query".to_string()),
            description: Some(
                "Execute a PromQL range query against a metrics backend".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "backend": {
                        "type": "string",
                        "description": backend_desc
                    },
                    "query": {
                        "type": "string",
                        "description": "The PromQL query to execute"
                    },
                    "start": {
                        "type": "string",
                        "description": "Start time for the range query (RFC3339 format)"
                    },
                    "end": {
                        "type": "string",
                        "description": "End time for the range query (RFC3339 format)"
                    },
                    "step": {
                        "type": "string",
                        "description": "Step duration for the range query (e.g., '30s', '1m', '5m'). Defaults to '1m'"
                    },
                    "org_id": {
                        "type": "string",
                        "description": org_id_desc
                    }
                },
                "required": ["query", "start", "end"]
            }),
            annotations: Some(ToolAnnotations::read_only()),
        },
        Tool {
            name: LIST_METRICS_TOOL.to_string(),
            title: Some("List Metrics".to_string()),
            description: Some("List all available metrics from a metrics backend".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "backend": {
                        "type": "string",
                        "description": backend_desc
                    },
                    "query": {
                        "type": "string",
                        "description": "Optional glob pattern to filter metrics (e.g., 'redis*', '*cpu*', '[^_]*')"
                    },
                    "org_id": {
                        "type": "string",
                        "description": org_id_desc
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of metrics to return. Defaults to 100."
                    },
                    "offset": {
                        "type": "number",
                        "description": "Number of metrics to skip for pagination. Defaults to 0."
                    }
                },
                "required": []
            }),
            annotations: Some(ToolAnnotations::read_only()),
        },
    ]
}
