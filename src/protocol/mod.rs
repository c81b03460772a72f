//! MCP Protocol types (version 2025-11-25)

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// MCP Protocol version
pub const PROTOCOL_VERSION: &str = "2025-11-25";

/// Versions this server can speak, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[PROTOCOL_VERSION, "2025-06-18", "2025-03-26"];

/// Pick the version to answer `initialize` with
///
/// The client's version is echoed when supported, otherwise the latest.
#[must_use]
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(PROTOCOL_VERSION)
}
