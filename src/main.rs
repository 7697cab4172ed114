//! MCP Database Gateway - one MCP tool surface over many databases

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use mcp_db_gateway::{
    backends,
    cli::{Cli, Command, OutputFormat, TransportKind},
    config::Config,
    gateway::{Gateway, McpServer},
    registry::Registry,
    setup_tracing, transport,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(Command::Serve { host, port, .. }) = &cli.command {
        if let Some(port) = port {
            config.server.port = *port;
        }
        if let Some(host) = host {
            config.server.host.clone_from(host);
        }
    }
    config.load_env_files();

    let registry = match backends::enabled_adapters(&config).and_then(Registry::register) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Failed to build adapter registry: {e}");
            return ExitCode::FAILURE;
        }
    };
    let gateway = Arc::new(Gateway::new(Arc::clone(&registry), &config.gateway));

    let code = match cli.command {
        Some(Command::List { format }) => run_list(&gateway, format).await,
        Some(Command::Check) => run_check(&gateway).await,
        Some(Command::Serve { transport: kind, .. }) => run_server(&gateway, &config, kind).await,
        None => run_server(&gateway, &config, TransportKind::Stdio).await,
    };

    for report in registry.disconnect_all(config.gateway.disconnect_timeout).await {
        if let Err(e) = report.result {
            error!(adapter = %report.adapter, "Disconnect failed during shutdown: {e}");
        }
    }
    code
}

/// Serve MCP until the transport ends
async fn run_server(gateway: &Arc<Gateway>, config: &Config, kind: TransportKind) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?kind,
        databases = gateway.registry().len(),
        operations = gateway.registry().operation_count(),
        "Starting MCP Database Gateway"
    );

    if !config.gateway.warm_start.is_empty() {
        let gateway = Arc::clone(gateway);
        let names = config.gateway.warm_start.clone();
        tokio::spawn(async move { gateway.warm_start(&names).await });
    }

    let server = McpServer::new(Arc::clone(gateway));
    let result = match kind {
        TransportKind::Stdio => transport::stdio::serve_stdio(server).await,
        TransportKind::Http => transport::http::serve_http(server, &config.server).await,
    };

    if let Err(e) = result {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }
    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}

/// Print the catalogue without connecting to anything
async fn run_list(gateway: &Gateway, format: OutputFormat) -> ExitCode {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&gateway.list(false).await) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize to JSON: {e}");
                return ExitCode::FAILURE;
            }
        },
        OutputFormat::Table => {
            let registry = gateway.registry();
            let width = registry.names().iter().map(|n| n.len()).max().unwrap_or(0);
            for adapter in registry.adapters() {
                println!("{:width$}  {}", adapter.name(), adapter.description());
                for op in adapter.operations().values() {
                    let marker = if op.is_destructive() { " (destructive)" } else { "" };
                    println!("{:width$}    {}{marker}", "", op.name());
                }
            }
            println!(
                "\n{} databases, {} operations",
                registry.len(),
                registry.operation_count()
            );
        }
    }
    ExitCode::SUCCESS
}

/// Connect to every adapter and report reachability
async fn run_check(gateway: &Gateway) -> ExitCode {
    let probes = gateway.probe_all().await;
    let mut all_up = true;
    for (adapter, up) in gateway.registry().adapters().zip(&probes) {
        if *up {
            println!("  ✓ {} connected", adapter.name());
        } else {
            all_up = false;
            println!("  ✗ {} disconnected", adapter.name());
        }
    }
    let connected = probes.iter().filter(|up| **up).count();
    println!("\n{connected}/{} databases connected", probes.len());

    if all_up {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
