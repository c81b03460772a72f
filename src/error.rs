//! Error types for the Prometheus MCP server

use std::io;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Prometheus MCP errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No backend survived configuration
    #[error("no backends configured")]
    NoBackendsConfigured,

    /// Several backends are configured and the caller named none
    #[error("backend parameter required when multiple backends are configured")]
    BackendRequired,

    /// Caller named a backend that is not configured
    #[error("unknown backend {name:?}, available: [{}]", .available.join(", "))]
    UnknownBackend {
        /// Requested backend name
        name: String,
        /// Configured backend names, sorted
        available: Vec<String>,
    },

    /// Backend is configured but has no client (missing URL or failed construction)
    #[error("client for backend {0:?} is not available")]
    ClientUnavailable(String),

    /// Malformed glob pattern
    #[error("invalid glob pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The pattern as supplied
        pattern: String,
        /// Parser message
        reason: String,
    },

    /// Backend call failed
    #[error("query on backend {backend:?} failed: {message}")]
    QueryExecution {
        /// Backend the call was routed to
        backend: String,
        /// Upstream message, verbatim
        message: String,
    },

    /// Invalid tool argument
    #[error("{0}")]
    InvalidArgument(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON-RPC error
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        /// Error code
        code: i32,
        /// Error message
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a JSON-RPC error
    pub fn json_rpc(code: i32, message: impl Into<String>) -> Self {
        Self::JsonRpc {
            code,
            message: message.into(),
        }
    }

    /// Wrap a backend failure, keeping the upstream message verbatim
    pub fn query_execution(backend: &str, message: impl Into<String>) -> Self {
        Self::QueryExecution {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    /// Backend name this error is about, when one was resolved
    #[must_use]
    pub fn backend(&self) -> Option<&str> {
        match self {
            Self::UnknownBackend { name, .. } | Self::ClientUnavailable(name) => Some(name),
            Self::QueryExecution { backend, .. } => Some(backend),
            _ => None,
        }
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::JsonRpc { code, .. } => *code,
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::Protocol(_) => rpc_codes::INVALID_REQUEST,
            Self::InvalidArgument(_)
            | Self::InvalidPattern { .. }
            | Self::BackendRequired
            | Self::UnknownBackend { .. } => rpc_codes::INVALID_PARAMS,
            Self::ClientUnavailable(_) | Self::QueryExecution { .. } | Self::Transport(_) => {
                rpc_codes::SERVER_ERROR_START
            }
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server error range start
    pub const SERVER_ERROR_START: i32 = -32000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_lists_available_names() {
        let err = Error::UnknownBackend {
            name: "ghost".to_string(),
            available: vec!["pmm".to_string(), "prom".to_string()],
        };
        assert_eq!(
            err.to_string(),
            r#"unknown backend "ghost", available: [pmm, prom]"#
        );
        assert_eq!(err.backend(), Some("ghost"));
    }

    #[test]
    fn query_execution_keeps_upstream_message() {
        let err = Error::query_execution("prom", "bad_data: parse error at char 4");
        assert_eq!(
            err.to_string(),
            r#"query on backend "prom" failed: bad_data: parse error at char 4"#
        );
        assert_eq!(err.to_rpc_code(), rpc_codes::SERVER_ERROR_START);
    }

    #[test]
    fn resolution_errors_are_invalid_params() {
        assert_eq!(Error::BackendRequired.to_rpc_code(), rpc_codes::INVALID_PARAMS);
        assert_eq!(
            Error::NoBackendsConfigured.to_rpc_code(),
            rpc_codes::INTERNAL_ERROR
        );
        assert!(Error::BackendRequired.backend().is_none());
    }
}
