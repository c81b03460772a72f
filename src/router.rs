//! Backend resolution and query execution

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::backend::BackendRegistry;
use crate::catalog::{self, MetricsPage};
use crate::prometheus::{Fetched, QueryData, QueryRange};
use crate::transport::TENANT_HEADER;
use crate::{Error, Result};

/// Routes calls to the backend they target
#[derive(Debug, Clone)]
pub struct QueryRouter {
    registry: Arc<BackendRegistry>,
}

impl QueryRouter {
    /// Create a router over an initialized registry
    #[must_use]
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    /// The underlying registry
    #[must_use]
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Pick the backend a call targets.
    ///
    /// An empty name selects the only backend when exactly one is configured.
    ///
    /// # Errors
    ///
    /// [`Error::NoBackendsConfigured`], [`Error::BackendRequired`] or
    /// [`Error::UnknownBackend`].
    pub fn resolve_backend(&self, name: &str) -> Result<String> {
        if self.registry.is_empty() {
            return Err(Error::NoBackendsConfigured);
        }

        let mut names = self.registry.names();
        if name.is_empty() {
            return match names.len() {
                1 => Ok(names.remove(0)),
                _ => Err(Error::BackendRequired),
            };
        }

        if self.registry.config(name).is_some() {
            Ok(name.to_string())
        } else {
            Err(Error::UnknownBackend {
                name: name.to_string(),
                available: names,
            })
        }
    }

    /// Log when a tenant is given for a backend with no tenant setup.
    ///
    /// Returns whether the warning was emitted. Never fails the call.
    pub fn warn_if_tenant_ignored(&self, backend: &str, tenant: Option<&str>) -> bool {
        let Some(tenant) = tenant.filter(|t| !t.is_empty()) else {
            return false;
        };
        let Some(config) = self.registry.config(backend) else {
            return false;
        };
        if config.is_multi_tenant() {
            return false;
        }

        warn!(
            backend = %backend,
            org_id = %tenant,
            "org_id provided but backend has no multi-tenant configuration, header will be sent but may be ignored"
        );
        true
    }

    /// Instant query at `time`
    ///
    /// # Errors
    ///
    /// [`Error::ClientUnavailable`] or [`Error::QueryExecution`].
    pub async fn query(
        &self,
        backend: &str,
        expr: &str,
        time: DateTime<Utc>,
        tenant: Option<&str>,
    ) -> Result<QueryData> {
        let client = self.registry.client(backend)?;
        debug!(backend = %backend, query = %expr, "Executing instant query");

        let fetched = client.query(expr, time, tenant).await?;
        Ok(log_warnings(backend, fetched))
    }

    /// Range query over `[start, end]` at `step`.
    ///
    /// `end` before `start` is passed through for the backend to judge.
    ///
    /// # Errors
    ///
    /// [`Error::ClientUnavailable`] or [`Error::QueryExecution`].
    pub async fn query_range(
        &self,
        backend: &str,
        expr: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
        tenant: Option<&str>,
    ) -> Result<QueryData> {
        let client = self.registry.client(backend)?;
        debug!(backend = %backend, query = %expr, step = ?step, "Executing range query");

        let range = QueryRange::new(start, end, step);
        let fetched = client.query_range(expr, &range, tenant).await?;
        Ok(log_warnings(backend, fetched))
    }

    /// List metric names on a backend
    ///
    /// # Errors
    ///
    /// [`Error::ClientUnavailable`], [`Error::InvalidPattern`] or
    /// [`Error::QueryExecution`].
    pub async fn list_metrics(
        &self,
        backend: &str,
        pattern: &str,
        limit: Option<i64>,
        offset: Option<i64>,
        tenant: Option<&str>,
    ) -> Result<MetricsPage> {
        let client = self.registry.client(backend)?;
        catalog::list(&client, pattern, limit, offset, tenant).await
    }

    /// Description of the `backend` tool argument
    #[must_use]
    pub fn backend_description(&self) -> String {
        let names = self.registry.names();
        let mut desc = format!("Backend to query. Available: [{}].", names.join(", "));
        if let [only] = names.as_slice() {
            desc.push_str(&format!(" Defaults to '{only}' if not specified."));
        }
        desc
    }

    /// Description of the `org_id` tool argument
    #[must_use]
    pub fn org_id_description(&self) -> String {
        let mut desc = format!(
            "Optional tenant ID for multi-tenant Prometheus/Mimir ({TENANT_HEADER} header)."
        );

        if let Some(default) = self
            .registry
            .configs()
            .map(|(_, c)| c.org_id.as_str())
            .find(|t| !t.is_empty())
        {
            desc.push_str(&format!(" Default: '{default}'."));
        }

        if let Some(orgs) = self
            .registry
            .configs()
            .map(|(_, c)| &c.available_orgs)
            .find(|orgs| !orgs.is_empty())
        {
            desc.push_str(&format!(" Available tenants: [{}].", orgs.join(", ")));
        }

        desc
    }
}

fn log_warnings(backend: &str, fetched: Fetched<QueryData>) -> QueryData {
    if !fetched.warnings.is_empty() {
        warn!(backend = %backend, warnings = ?fetched.warnings, "Backend returned warnings");
    }
    fetched.data
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::BackendConfig;

    fn router(entries: &[(&str, &str)]) -> QueryRouter {
        let configs: HashMap<String, BackendConfig> = entries
            .iter()
            .map(|(name, url)| {
                (
                    (*name).to_string(),
                    BackendConfig {
                        url: (*url).to_string(),
                        ..Default::default()
                    },
                )
            })
            .collect();
        QueryRouter::new(Arc::new(BackendRegistry::init(&configs)))
    }

    #[test]
    fn single_backend_is_implicit_default() {
        let r = router(&[("prom", "http://prom:9090")]);
        assert_eq!(r.resolve_backend("").unwrap(), "prom");
        assert_eq!(r.resolve_backend("prom").unwrap(), "prom");
    }

    #[test]
    fn multiple_backends_require_a_name() {
        let r = router(&[("prom", "http://prom:9090"), ("pmm", "http://pmm:9090")]);
        assert!(matches!(r.resolve_backend(""), Err(Error::BackendRequired)));
        assert_eq!(r.resolve_backend("pmm").unwrap(), "pmm");
    }

    #[test]
    fn unknown_backend_lists_sorted_names() {
        let r = router(&[("prom", "http://prom:9090"), ("pmm", "http://pmm:9090")]);
        match r.resolve_backend("ghost") {
            Err(Error::UnknownBackend { name, available }) => {
                assert_eq!(name, "ghost");
                assert_eq!(available, vec!["pmm", "prom"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn no_backends() {
        let r = router(&[]);
        assert!(matches!(r.resolve_backend(""), Err(Error::NoBackendsConfigured)));
        assert!(matches!(r.resolve_backend("prom"), Err(Error::NoBackendsConfigured)));
    }

    #[tokio::test]
    async fn backend_without_client_is_unavailable() {
        let r = router(&[("prom", "http://prom:9090"), ("pmm", "")]);
        assert_eq!(r.resolve_backend("pmm").unwrap(), "pmm");
        let err = r.query("pmm", "up", Utc::now(), None).await.unwrap_err();
        assert!(matches!(err, Error::ClientUnavailable(ref n) if n == "pmm"));
        assert_eq!(err.backend(), Some("pmm"));
    }

    #[tokio::test]
    async fn invalid_pattern_is_rejected_before_any_call() {
        // Port 9 (discard) would fail if contacted; the pattern check comes first.
        let r = router(&[("prom", "http://127.0.0.1:9")]);
        let err = r.list_metrics("prom", "[", None, None, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn tenant_advisory() {
        let mut tenanted = BackendConfig {
            url: "http://mimir:8080".to_string(),
            ..Default::default()
        };
        tenanted.available_orgs = vec!["a".to_string(), "b".to_string()];
        let plain = BackendConfig {
            url: "http://prom:9090".to_string(),
            ..Default::default()
        };
        let configs = HashMap::from([
            ("mimir".to_string(), tenanted),
            ("prom".to_string(), plain),
        ]);
        let r = QueryRouter::new(Arc::new(BackendRegistry::init(&configs)));

        assert!(r.warn_if_tenant_ignored("prom", Some("tenantB")));
        assert!(!r.warn_if_tenant_ignored("prom", Some("")));
        assert!(!r.warn_if_tenant_ignored("prom", None));
        assert!(!r.warn_if_tenant_ignored("mimir", Some("tenantB")));
    }

    #[test]
    fn argument_descriptions() {
        let r = router(&[("prom", "http://prom:9090")]);
        assert_eq!(
            r.backend_description(),
            "Backend to query. Available: [prom]. Defaults to 'prom' if not specified."
        );
        assert_eq!(
            r.org_id_description(),
            "Optional tenant ID for multi-tenant Prometheus/Mimir (X-Scope-OrgId header)."
        );

        let mut mimir = BackendConfig {
            url: "http://mimir:8080".to_string(),
            org_id: "tenantA".to_string(),
            ..Default::default()
        };
        mimir.available_orgs = vec!["tenantA".to_string(), "tenantB".to_string()];
        let configs = HashMap::from([
            ("mimir".to_string(), mimir),
            ("prom".to_string(), BackendConfig::default()),
        ]);
        let r = QueryRouter::new(Arc::new(BackendRegistry::init(&configs)));
        assert_eq!(r.backend_description(), "Backend to query. Available: [mimir, prom].");
        assert_eq!(
            r.org_id_description(),
            "Optional tenant ID for multi-tenant Prometheus/Mimir (X-Scope-OrgId header). \
             Default: 'tenantA'. Available tenants: [tenantA, tenantB]."
        );
    }
}
