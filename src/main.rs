//! Prometheus MCP - PromQL tools over multiple Prometheus-compatible backends

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use prometheus_mcp::{
    backend::BackendRegistry,
    cli::{Cli, Command},
    config::{Config, TransportKind},
    router::QueryRouter,
    server::{McpServer, http, stdio},
    setup_tracing,
    tools::ToolsManager,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Optional for local development
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Check) => run_check(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Build the registry and report what came up
fn run_check(config: &Config) -> ExitCode {
    let registry = BackendRegistry::init(&config.backends);

    println!("Configured backends: {}", registry.len());
    for (name, backend) in registry.configs() {
        match registry.client(name) {
            Ok(client) => println!(
                "  ✓ {name}: {} (auth: {}, org_id: {})",
                client.base_url(),
                client.transport().profile().scheme(),
                if backend.org_id.is_empty() { "-" } else { &backend.org_id }
            ),
            Err(e) => println!("  ✗ {name}: {e}"),
        }
    }

    if registry.client_count() == 0 {
        eprintln!("No usable backends");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run_server(config: Config) -> ExitCode {
    let registry = Arc::new(BackendRegistry::init(&config.backends));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?config.server.transport.kind,
        backends = registry.len(),
        clients = registry.client_count(),
        "Starting Prometheus MCP"
    );
    if registry.client_count() == 0 {
        warn!("No usable backends; every tool call will fail until the configuration is fixed");
    }
    if config.middleware.jwt.enabled {
        warn!("JWT validation is configured but must be enforced in front of this server");
    }

    let tools = ToolsManager::new(QueryRouter::new(registry));
    let server = Arc::new(McpServer::new(&config.server, tools));

    let result = match config.server.transport.kind {
        TransportKind::Stdio => stdio::serve(server).await,
        TransportKind::Http => http::serve(&config, server).await,
    };

    if let Err(e) = result {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
