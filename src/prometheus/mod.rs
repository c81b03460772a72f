//! Prometheus HTTP API client
//!
//! One [`PrometheusClient`] exists per configured backend. It knows the three
//! read endpoints this server needs and sends every request through the
//! backend's [`AuthenticatedTransport`].

mod types;

pub use types::{ApiResponse, Fetched, QueryData, QueryRange};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, Request};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::{BackendConfig, humantime_serde::format_duration};
use crate::transport::{AuthenticatedTransport, Transport, TransportProfile};
use crate::{Error, Result};

/// Label holding the metric name
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Client for one Prometheus-compatible backend
pub struct PrometheusClient {
    name: String,
    base_url: Url,
    transport: AuthenticatedTransport,
}

impl PrometheusClient {
    /// Build a client with its own HTTP connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(name: &str, config: &BackendConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client for {name}: {e}")))?;

        Self::with_transport(name, config, Arc::new(http))
    }

    /// Build a client over an arbitrary inner transport
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is not an absolute http(s) URL.
    pub fn with_transport(
        name: &str,
        config: &BackendConfig,
        inner: Arc<dyn Transport>,
    ) -> Result<Self> {
        let base_url = Url::parse(config.url.trim())
            .map_err(|e| Error::Config(format!("Invalid URL for backend {name}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Invalid URL for backend {name}: unsupported scheme {}",
                base_url.scheme()
            )));
        }

        Ok(Self {
            name: name.to_string(),
            base_url,
            transport: AuthenticatedTransport::new(inner, TransportProfile::from_config(name, config)),
        })
    }

    /// Backend name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base URL the API paths are appended to
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The header-injecting transport
    #[must_use]
    pub fn transport(&self) -> &AuthenticatedTransport {
        &self.transport
    }

    /// Instant query (`/api/v1/query`)
    pub async fn query(
        &self,
        expr: &str,
        time: DateTime<Utc>,
        tenant: Option<&str>,
    ) -> Result<Fetched<QueryData>> {
        self.get(
            "query",
            &[("query", expr.to_string()), ("time", format_time(time))],
            tenant,
        )
        .await
    }

    /// Range query (`/api/v1/query_range`)
    pub async fn query_range(
        &self,
        expr: &str,
        range: &QueryRange,
        tenant: Option<&str>,
    ) -> Result<Fetched<QueryData>> {
        self.get(
            "query_range",
            &[
                ("query", expr.to_string()),
                ("start", format_time(range.start)),
                ("end", format_time(range.end)),
                ("step", format_duration(&range.step)),
            ],
            tenant,
        )
        .await
    }

    /// Distinct values of `label` seen in `[start, end]`
    pub async fn label_values(
        &self,
        label: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tenant: Option<&str>,
    ) -> Result<Fetched<Vec<String>>> {
        self.get(
            &format!("label/{label}/values"),
            &[("start", format_time(start)), ("end", format_time(end))],
            tenant,
        )
        .await
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let raw = format!("{}/api/v1/{path}", self.base_url.as_str().trim_end_matches('/'));
        let mut url = Url::parse(&raw)
            .map_err(|e| Error::query_execution(&self.name, format!("invalid endpoint {raw}: {e}")))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        tenant: Option<&str>,
    ) -> Result<Fetched<T>> {
        let request = Request::new(Method::GET, self.endpoint(path, params)?);
        debug!(backend = %self.name, path = %path, "Sending backend request");

        let response = self
            .transport
            .send(&request, tenant)
            .await
            .map_err(|e| match e {
                Error::Transport(message) => Error::query_execution(&self.name, message),
                other => other,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::query_execution(&self.name, format!("failed to read response: {e}"))
        })?;

        match serde_json::from_str::<ApiResponse<T>>(&body) {
            Ok(parsed) if parsed.is_success() => {
                let warnings = parsed.warnings;
                let data = parsed.data.ok_or_else(|| {
                    Error::query_execution(&self.name, "response carried no data")
                })?;
                Ok(Fetched { data, warnings })
            }
            Ok(parsed) => Err(Error::query_execution(&self.name, parsed.error_message())),
            Err(_) if !status.is_success() => Err(Error::query_execution(
                &self.name,
                format!("HTTP {status}: {}", body.trim()),
            )),
            Err(e) => Err(Error::query_execution(
                &self.name,
                format!("invalid response body: {e}"),
            )),
        }
    }
}

impl std::fmt::Debug for PrometheusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .field("profile", self.transport.profile())
            .finish()
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
