//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Prometheus MCP - PromQL tools over multiple Prometheus-compatible backends
#[derive(Parser, Debug)]
#[command(name = "prometheus-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(
        short,
        long,
        env = "PROMETHEUS_MCP_CONFIG",
        default_value = "config.yaml",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "PROMETHEUS_MCP_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PROMETHEUS_MCP_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the MCP server (default)
    Serve,

    /// Load the configuration, build backend clients and report the result
    Check,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["prometheus-mcp"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert_eq!(cli.log_level, "info");
        assert!(cli.command.is_none());
    }

    #[test]
    fn check_subcommand_with_global_config() {
        let cli = Cli::try_parse_from(["prometheus-mcp", "check", "--config", "/etc/prom.yaml"])
            .unwrap();
        assert!(matches!(cli.command, Some(Command::Check)));
        assert_eq!(cli.config, PathBuf::from("/etc/prom.yaml"));
    }
}
