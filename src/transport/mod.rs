//! Outbound HTTP transports for metrics backends

mod authenticated;

pub use self::authenticated::{AuthenticatedTransport, TENANT_HEADER, TransportProfile};

use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes a fully built HTTP request
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return the raw response
    async fn send(&self, request: Request) -> reqwest::Result<Response>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn send(&self, request: Request) -> reqwest::Result<Response> {
        self.execute(request).await
    }
}

/// Render a reqwest error together with its source chain.
///
/// The top-level message alone ("error sending request") hides whether the
/// call timed out or the connection was refused.
pub(crate) fn describe_error(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    if err.is_timeout() && !message.contains("timed out") {
        message.push_str(": operation timed out");
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
