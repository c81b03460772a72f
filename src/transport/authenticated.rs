//! Per-backend header injection
//!
//! Every request bound for a backend passes through exactly one
//! [`AuthenticatedTransport`]. It works on a copy of the request, adds the
//! tenant header (`X-Scope-OrgId`) and the backend's Authorization header,
//! then hands the copy to the inner transport.
//!
//! # Security
//!
//! Credentials are resolved once into a sensitive [`HeaderValue`] and are
//! never logged; debug output names only the scheme.

use std::sync::Arc;

use base64::Engine;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use reqwest::{Request, Response};
use tracing::{debug, warn};

use super::{Transport, describe_error};
use crate::config::{AuthKind, BackendAuthConfig, BackendConfig};
use crate::{Error, Result};

/// Tenant header understood by Mimir, Cortex and Thanos
pub const TENANT_HEADER: &str = "X-Scope-OrgId";

fn tenant_header_name() -> HeaderName {
    HeaderName::from_static("x-scope-orgid")
}

/// Immutable snapshot of what a transport needs from its backend config
#[derive(Clone)]
pub struct TransportProfile {
    backend: String,
    default_tenant: Option<String>,
    authorization: Option<HeaderValue>,
    scheme: &'static str,
}

impl TransportProfile {
    /// Build the profile for one backend
    #[must_use]
    pub fn from_config(backend: &str, config: &BackendConfig) -> Self {
        let authorization = authorization_header(backend, &config.auth);
        let scheme = match (&authorization, config.auth.kind()) {
            (Some(_), AuthKind::Basic) => "basic",
            (Some(_), AuthKind::Token) => "bearer",
            _ => "none",
        };

        Self {
            backend: backend.to_string(),
            default_tenant: Some(config.org_id.clone()).filter(|t| !t.is_empty()),
            authorization,
            scheme,
        }
    }

    /// Backend this profile belongs to
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Configured default tenant
    #[must_use]
    pub fn default_tenant(&self) -> Option<&str> {
        self.default_tenant.as_deref()
    }

    /// Authorization scheme that will be sent (`basic`, `bearer` or `none`)
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        self.scheme
    }
}

impl std::fmt::Debug for TransportProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportProfile")
            .field("backend", &self.backend)
            .field("default_tenant", &self.default_tenant)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

/// Compute the Authorization header value for a backend.
///
/// Missing fields for the declared scheme yield no header, never an error.
fn authorization_header(backend: &str, auth: &BackendAuthConfig) -> Option<HeaderValue> {
    let raw = match auth.kind() {
        AuthKind::Basic if !auth.username.is_empty() && !auth.password.is_empty() => {
            let credentials = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", auth.username, auth.password));
            format!("Basic {credentials}")
        }
        AuthKind::Token if !auth.token.is_empty() => format!("Bearer {}", auth.token),
        AuthKind::Basic | AuthKind::Token => {
            debug!(backend = %backend, auth_type = %auth.auth_type, "Auth fields incomplete, no Authorization header");
            return None;
        }
        AuthKind::None => return None,
    };

    match HeaderValue::from_str(&raw) {
        Ok(mut value) => {
            value.set_sensitive(true);
            Some(value)
        }
        Err(_) => {
            warn!(backend = %backend, "Credentials contain characters not allowed in headers, no Authorization header");
            None
        }
    }
}

/// Transport that injects tenant and auth headers for one backend
pub struct AuthenticatedTransport {
    inner: Arc<dyn Transport>,
    profile: TransportProfile,
}

impl AuthenticatedTransport {
    /// Wrap `inner` for the backend described by `profile`
    pub fn new(inner: Arc<dyn Transport>, profile: TransportProfile) -> Self {
        Self { inner, profile }
    }

    /// The backend snapshot this transport was built from
    #[must_use]
    pub fn profile(&self) -> &TransportProfile {
        &self.profile
    }

    /// Tenant sent for a call: the override if non-empty, else the default
    #[must_use]
    pub fn effective_tenant<'a>(&'a self, tenant_override: Option<&'a str>) -> Option<&'a str> {
        tenant_override
            .filter(|t| !t.is_empty())
            .or(self.profile.default_tenant())
    }

    /// Copy `request` and add the backend's headers to the copy
    ///
    /// # Errors
    ///
    /// Fails if the request body cannot be cloned or the tenant is not a
    /// valid header value.
    pub fn prepare(&self, request: &Request, tenant_override: Option<&str>) -> Result<Request> {
        let mut outgoing = request.try_clone().ok_or_else(|| {
            Error::Transport("request body cannot be cloned".to_string())
        })?;

        let tenant = self.effective_tenant(tenant_override);
        if let Some(tenant) = tenant {
            let value = HeaderValue::from_str(tenant).map_err(|_| {
                Error::InvalidArgument(format!("org_id {tenant:?} is not a valid header value"))
            })?;
            outgoing.headers_mut().insert(tenant_header_name(), value);
        }

        if let Some(ref authorization) = self.profile.authorization {
            outgoing
                .headers_mut()
                .insert(AUTHORIZATION, authorization.clone());
        }

        let tenant_source = match (tenant_override.filter(|t| !t.is_empty()), tenant) {
            (Some(_), _) => "override",
            (None, Some(_)) => "default",
            (None, None) => "none",
        };
        debug!(
            backend = %self.profile.backend,
            tenant = tenant.unwrap_or(""),
            tenant_source,
            auth = self.profile.scheme,
            "Prepared backend request"
        );

        Ok(outgoing)
    }

    /// Prepare `request` and send it through the inner transport
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when the network call fails, including
    /// timeouts.
    pub async fn send(&self, request: &Request, tenant_override: Option<&str>) -> Result<Response> {
        let outgoing = self.prepare(request, tenant_override)?;
        self.inner
            .send(outgoing)
            .await
            .map_err(|e| Error::Transport(describe_error(&e)))
    }
}
