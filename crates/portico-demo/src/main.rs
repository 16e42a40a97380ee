//! Portico demo - Entry point
//!
//! Serves `example.Example` over gRPC and the HTTP gateway until SIGTERM or
//! SIGINT.

use std::path::PathBuf;

use anyhow::Context;
use portico::boot::Orchestrator;
use portico::config::AppConfig;
use portico::telemetry::init_logging;
use portico_demo::repository::InMemoryRepository;
use portico_demo::ExampleService;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Command-line arguments.
struct Args {
    /// `.env` file to read instead of `./.env`.
    env_file: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut env_file = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--env-file" | "-e" => {
                    env_file = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("portico-demo {}", portico_demo::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { env_file }
    }
}

fn print_help() {
    println!(
        r"Portico demo - example.Example over gRPC and HTTP

USAGE:
    portico-demo [OPTIONS]

OPTIONS:
    -e, --env-file <PATH>  Read variables from PATH instead of ./.env
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    GRPC_ADDR          gRPC listen address (default: 0.0.0.0:50051)
    GRPC_GW_ADDR       HTTP gateway listen address (default: 0.0.0.0:8080)
    ENV_NAMESPACE      development, staging, production, ... (default: none)
    ENV_SERVICE_NAME   Service name in logs (default: portico)
    LOG_FORMAT         json or pretty
    LOG_LEVEL          Default filter directive, overridden by RUST_LOG
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.env_file {
        Some(path) => AppConfig::from_env_file(path),
        None => AppConfig::from_env(),
    }
    .context("failed to read configuration")?;

    init_logging(&config.log_config()).context("failed to initialize logging")?;
    tracing::info!(
        environment = %config.environment,
        rpc_addr = %config.rpc_addr,
        gateway_addr = %config.gateway_addr,
        "starting portico demo"
    );

    let rpc_listener = TcpListener::bind(config.rpc_addr)
        .await
        .with_context(|| format!("failed to bind gRPC listener on {}", config.rpc_addr))?;
    let gateway_listener = TcpListener::bind(config.gateway_addr)
        .await
        .with_context(|| format!("failed to bind gateway on {}", config.gateway_addr))?;

    let boot = Orchestrator::new();
    portico_demo::register(
        &boot,
        &ExampleService::new(InMemoryRepository::seeded()),
        rpc_listener,
        gateway_listener,
        config.gateway_config(),
    )?;

    if let Err(error) = boot.run(CancellationToken::new()).await {
        tracing::error!(error = %error, "portico demo failed");
        return Err(error.into());
    }

    // Shutdown callbacks may still be draining connections.
    boot.wait().await;
    tracing::info!("portico demo stopped");
    Ok(())
}
