//! OAuth discovery documents served next to `/mcp`

use serde_json::{Map, Value, json};

use crate::config::OAuthProtectedResourceConfig;

/// Path of the issuer's discovery document relayed as authorization server metadata
pub const OPENID_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";

/// Discovery URL for an issuer
pub fn openid_configuration_url(issuer_uri: &str) -> String {
    format!("{}{OPENID_CONFIGURATION_PATH}", issuer_uri.trim_end_matches('/'))
}

/// RFC 9728 protected resource metadata; empty fields are omitted
pub fn protected_resource_document(config: &OAuthProtectedResourceConfig) -> Value {
    let mut doc = Map::new();

    let mut text = |key: &str, value: &str| {
        if !value.is_empty() {
            doc.insert(key.to_string(), json!(value));
        }
    };
    text("resource", &config.resource);
    text("jwks_uri", &config.jwks_uri);
    text("resource_name", &config.resource_name);
    text("resource_documentation", &config.resource_documentation);
    text("resource_policy_uri", &config.resource_policy_uri);
    text("resource_tos_uri", &config.resource_tos_uri);

    let mut list = |key: &str, values: &[String]| {
        if !values.is_empty() {
            doc.insert(key.to_string(), json!(values));
        }
    };
    list("authorization_servers", &config.auth_servers);
    list("scopes_supported", &config.scopes_supported);
    list("bearer_methods_supported", &config.bearer_methods_supported);
    list(
        "resource_signing_alg_values_supported",
        &config.resource_signing_alg_values_supported,
    );
    list(
        "authorization_details_types_supported",
        &config.authorization_details_types_supported,
    );
    list(
        "dpop_signing_alg_values_supported",
        &config.dpop_signing_alg_values_supported,
    );

    if config.tls_client_certificate_bound_access_tokens {
        doc.insert(
            "tls_client_certificate_bound_access_tokens".to_string(),
            Value::Bool(true),
        );
    }
    if config.dpop_bound_access_tokens_required {
        doc.insert(
            "dpop_bound_access_tokens_required".to_string(),
            Value::Bool(true),
        );
    }

    Value::Object(doc)
}
