//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// MCP Database Gateway - one MCP tool surface over many databases
#[derive(Parser, Debug)]
#[command(name = "mcp-db-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "DB_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "DB_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "DB_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to serving over stdio)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve MCP requests (default)
    Serve {
        /// Transport to serve on
        #[arg(short, long, value_enum, default_value_t = TransportKind::Stdio)]
        transport: TransportKind,

        /// Host to bind to (http transport)
        #[arg(long, env = "DB_GATEWAY_HOST")]
        host: Option<String>,

        /// Port to listen on (http transport)
        #[arg(short, long, env = "DB_GATEWAY_PORT")]
        port: Option<u16>,
    },

    /// List databases and their operations without connecting
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Connect to every database and report which are reachable
    Check,
}

/// Server transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
    /// JSON-RPC over `POST /mcp`
    Http,
}

/// Output format of `list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned text table
    Table,
    /// JSON document
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_no_subcommand() {
        let cli = Cli::try_parse_from(["mcp-db-gateway"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn serve_http_with_port() {
        let cli =
            Cli::try_parse_from(["mcp-db-gateway", "serve", "--transport", "http", "--port", "4100"])
                .unwrap();
        match cli.command {
            Some(Command::Serve {
                transport, port, ..
            }) => {
                assert_eq!(transport, TransportKind::Http);
                assert_eq!(port, Some(4100));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mcp-db-gateway",
            "list",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(
            cli.command,
            Some(Command::List {
                format: OutputFormat::Json
            })
        ));
    }

    #[test]
    fn rejects_unknown_transport() {
        assert!(Cli::try_parse_from(["mcp-db-gateway", "serve", "--transport", "sse"]).is_err());
    }
}
