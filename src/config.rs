//! Configuration management

use std::{collections::HashMap, env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Prefix for environment overrides (`PROMETHEUS_MCP_SERVER__NAME=...`)
pub const ENV_PREFIX: &str = "PROMETHEUS_MCP_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// HTTP middleware configuration
    pub middleware: MiddlewareConfig,
    /// OAuth authorization server metadata endpoint
    pub oauth_authorization_server: OAuthAuthorizationServerConfig,
    /// OAuth protected resource metadata endpoint
    pub oauth_protected_resource: OAuthProtectedResourceConfig,
    /// Backend configurations, keyed by backend name
    pub backends: HashMap<String, BackendConfig>,
}

impl Config {
    /// Load configuration from a YAML file, expanding `${VAR}` and `$VAR`
    /// from the process environment before parsing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content, |name| env::var(name).ok())
    }

    /// Parse configuration from YAML text, resolving variables through `lookup`.
    ///
    /// Environment overrides with the [`ENV_PREFIX`] prefix are merged on top.
    pub fn from_yaml<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = expand_vars(content, lookup);

        Figment::new()
            .merge(Yaml::string(&expanded))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Backend names in sorted order
    #[must_use]
    pub fn backend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Expand `${VAR}`, `${VAR:-default}` and `$VAR` references.
///
/// Unset variables expand to the default, or to an empty string.
pub fn expand_vars<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static regex");

    re.replace_all(content, |caps: &regex::Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());
        let default = caps.get(2).map_or("", |m| m.as_str());
        lookup(name).unwrap_or_else(|| default.to_string())
    })
    .into_owned()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name announced in `initialize`
    pub name: String,
    /// Version announced in `initialize`
    pub version: String,
    /// Transport selection
    pub transport: ServerTransportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            transport: ServerTransportConfig::default(),
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerTransportConfig {
    /// Transport type
    #[serde(rename = "type")]
    pub kind: TransportKind,
    /// HTTP transport settings
    pub http: HttpTransportConfig,
}

/// Transport type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC on stdin/stdout
    #[default]
    Stdio,
    /// Streamable HTTP on `/mcp`
    Http,
}

/// HTTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    /// Listen address (`host:port`)
    pub host: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Middleware configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Access log settings
    pub access_logs: AccessLogsConfig,
    /// JWT validation settings
    pub jwt: JwtConfig,
}

/// Access log settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessLogsConfig {
    /// Headers left out of access logs entirely
    pub excluded_headers: Vec<String>,
    /// Headers logged with their value masked
    pub redacted_headers: Vec<String>,
}

/// JWT middleware configuration.
///
/// Inbound token validation happens in front of this server; only the shape
/// is carried so existing config files keep parsing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Whether validation is enabled
    pub enabled: bool,
    /// Validation settings
    pub validation: JwtValidationConfig,
}

/// JWT validation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtValidationConfig {
    /// `local` or `external`
    pub strategy: String,
    /// Header carrying the already validated token
    pub forwarded_header: String,
    /// Local validation settings
    pub local: JwtValidationLocalConfig,
}

/// Local JWT validation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtValidationLocalConfig {
    /// JWKS location
    pub jwks_uri: String,
    /// JWKS refresh interval
    #[serde(with = "humantime_serde")]
    pub cache_interval: Duration,
    /// Expressions evaluated against the token claims
    pub allow_conditions: Vec<JwtAllowCondition>,
}

/// Allow condition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwtAllowCondition {
    /// Claim expression
    pub expression: String,
}

/// OAuth authorization server metadata endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthAuthorizationServerConfig {
    /// Serve `/.well-known/oauth-authorization-server`
    pub enabled: bool,
    /// Issuer whose OpenID configuration is relayed
    pub issuer_uri: String,
}

/// OAuth protected resource metadata (RFC 9728)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct OAuthProtectedResourceConfig {
    /// Serve `/.well-known/oauth-protected-resource`
    pub enabled: bool,
    /// Resource identifier
    pub resource: String,
    /// Authorization servers trusted for this resource
    pub auth_servers: Vec<String>,
    /// JWKS location
    pub jwks_uri: String,
    /// Scopes the resource understands
    pub scopes_supported: Vec<String>,
    /// Accepted bearer token placements
    pub bearer_methods_supported: Vec<String>,
    /// Signing algorithms for resource responses
    pub resource_signing_alg_values_supported: Vec<String>,
    /// Human-readable resource name
    pub resource_name: String,
    /// Documentation URL
    pub resource_documentation: String,
    /// Policy URL
    pub resource_policy_uri: String,
    /// Terms of service URL
    pub resource_tos_uri: String,
    /// Whether tokens must be bound to a client certificate
    pub tls_client_certificate_bound_access_tokens: bool,
    /// Supported authorization details types
    pub authorization_details_types_supported: Vec<String>,
    /// Supported `DPoP` signing algorithms
    pub dpop_signing_alg_values_supported: Vec<String>,
    /// Whether `DPoP`-bound tokens are required
    pub dpop_bound_access_tokens_required: bool,
}

/// Backend configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the Prometheus-compatible API
    pub url: String,
    /// Outbound authentication
    pub auth: BackendAuthConfig,
    /// Default tenant sent as `X-Scope-OrgId`
    pub org_id: String,
    /// Tenants callers may choose from (advertised in tool descriptions)
    pub available_orgs: Vec<String>,
    /// Request timeout; the HTTP client default applies when unset
    #[serde(with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
}

impl BackendConfig {
    /// Whether tenant routing is configured for this backend
    #[must_use]
    pub fn is_multi_tenant(&self) -> bool {
        !self.org_id.is_empty() || !self.available_orgs.is_empty()
    }
}

/// Outbound authentication for one backend
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendAuthConfig {
    /// `none`, `basic` or `token`
    #[serde(rename = "type")]
    pub auth_type: String,
    /// Basic auth user
    pub username: String,
    /// Basic auth password
    pub password: String,
    /// Bearer token
    pub token: String,
}

impl BackendAuthConfig {
    /// Declared authentication scheme; unrecognised values mean none
    #[must_use]
    pub fn kind(&self) -> AuthKind {
        match self.auth_type.trim().to_ascii_lowercase().as_str() {
            "basic" => AuthKind::Basic,
            "token" => AuthKind::Token,
            _ => AuthKind::None,
        }
    }
}

// Credentials never reach the logs.
impl std::fmt::Debug for BackendAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendAuthConfig")
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// Authentication scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// No Authorization header
    None,
    /// `Authorization: Basic ...`
    Basic,
    /// `Authorization: Bearer ...`
    Token,
}

/// Duration parsing in the Go style (`30s`, `5m`, `1h30m`, `250ms`)
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Parse a duration string.
    ///
    /// Accepts a sequence of decimal numbers each followed by a unit
    /// (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`). A bare integer is seconds.
    ///
    /// # Errors
    ///
    /// Returns a message describing the malformed input.
    pub fn parse_duration(input: &str) -> Result<Duration, String> {
        let s = input.trim();
        if s.is_empty() {
            return Err("empty duration".to_string());
        }
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(Duration::from_secs(secs));
        }

        let invalid = || format!("invalid duration {input:?}");
        let mut total = 0.0_f64;
        let mut rest = s;

        while !rest.is_empty() {
            let num_end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            if num_end == 0 {
                return Err(invalid());
            }
            let value: f64 = rest[..num_end].parse().map_err(|_| invalid())?;
            rest = &rest[num_end..];

            let unit_end = rest
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(rest.len());
            let factor = match &rest[..unit_end] {
                "ns" => 1e-9,
                "us" | "µs" => 1e-6,
                "ms" => 1e-3,
                "s" => 1.0,
                "m" => 60.0,
                "h" => 3600.0,
                "" => return Err(format!("missing unit in duration {input:?}")),
                unit => return Err(format!("unknown unit {unit:?} in duration {input:?}")),
            };
            total += value * factor;
            rest = &rest[unit_end..];
        }

        if !total.is_finite() {
            return Err(format!("duration {input:?} out of range"));
        }
        Duration::try_from_secs_f64(total).map_err(|_| format!("duration {input:?} out of range"))
    }

    /// Render a duration as `30s` or `250ms`
    #[must_use]
    pub fn format_duration(duration: &Duration) -> String {
        if duration.subsec_nanos() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(duration))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Same format for optional durations; an empty string means unset
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        /// Serialize an optional duration
        ///
        /// # Errors
        ///
        /// Returns a serialization error if the serializer fails.
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => serializer.serialize_str(&super::format_duration(d)),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize an optional duration
        ///
        /// # Errors
        ///
        /// Returns a deserialization error if the string cannot be parsed as a duration.
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) if !s.trim().is_empty() => super::parse_duration(&s)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}
