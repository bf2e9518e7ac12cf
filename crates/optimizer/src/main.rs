//! Instance Optimizer - stops idle or after-hours compute instances
//!
//! Each invocation evaluates the tagged candidate instances once, stops
//! those that qualify (or simulates it under dry run), and leaves an audit
//! record and a notification for every stop.

use anyhow::Result;
use clap::{Parser, Subcommand};
use optimizer_lib::{
    cloud::CloudApiClient,
    configuration_failure,
    health::{components, HealthRegistry},
    notify::WebhookNotifier,
    store::FileAuditStore,
    ActionExecutor, InvocationResponse, Optimizer, OptimizerConfig, OptimizerMetrics,
    RunCoordinator, StructuredLogger,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

/// Instance Optimizer
#[derive(Parser)]
#[command(name = "instance-optimizer")]
#[command(author, version, about = "Stops idle or after-hours compute instances", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single optimization pass and print the response
    Run,

    /// Serve the invocation endpoint with health and metrics
    Serve {
        /// Listen port (overrides OPTIMIZER_API_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();

    // Configuration errors abort before any instance is touched
    let service = match config::ServiceConfig::load() {
        Ok(service) => service,
        Err(e) => {
            error!(error = %e, "Invalid service configuration");
            return finish(configuration_failure(&e));
        }
    };
    let optimizer_config = match OptimizerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid optimizer configuration");
            return finish(configuration_failure(&e));
        }
    };
    info!(
        table = %optimizer_config.table_name,
        timezone = %optimizer_config.evaluation.timezone,
        dry_run = optimizer_config.dry_run,
        cpu_threshold = optimizer_config.evaluation.cpu_threshold,
        "Optimizer configured"
    );

    let optimizer = match build_optimizer(optimizer_config, &service).await {
        Ok(optimizer) => optimizer,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to initialize collaborators");
            return finish(InvocationResponse {
                status_code: 500,
                body: format!("Initialization error: {:#}", e),
            });
        }
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let (response, _) = optimizer.invoke(&serde_json::Value::Null).await;
            finish(response)
        }
        Command::Serve { port } => {
            let health_registry = HealthRegistry::new();
            for name in components::ALL {
                health_registry.register(name).await;
            }

            let state = Arc::new(api::AppState::new(optimizer, health_registry.clone()));
            health_registry.set_ready(true).await;

            let port = port.unwrap_or(service.api_port);
            tokio::select! {
                result = api::serve(port, state) => result?,
                _ = tokio::signal::ctrl_c() => info!("Shutting down"),
            }
            Ok(())
        }
    }
}

/// Wire the optimizer to its HTTP and file-backed collaborators
async fn build_optimizer(
    config: OptimizerConfig,
    service: &config::ServiceConfig,
) -> Result<Optimizer> {
    let timeout = service.request_timeout();
    let cloud = Arc::new(CloudApiClient::new(&service.cloud_api_url, timeout)?);
    let notifier = Arc::new(WebhookNotifier::new(&config.notification_target, timeout)?);
    let audit = Arc::new(FileAuditStore::open(&service.audit_dir, &config.table_name).await?);

    // Register metrics before the first run
    OptimizerMetrics::new();
    let logger = StructuredLogger::new(config.table_name.clone());

    let executor = ActionExecutor::new(
        cloud.clone(),
        audit,
        notifier,
        config.evaluation.timezone,
        logger.clone(),
    );
    let coordinator = RunCoordinator::new(config, cloud.clone(), executor, logger);

    Ok(Optimizer::new(cloud, coordinator))
}

/// Print the invocation response and map it to the process exit status
fn finish(response: InvocationResponse) -> Result<()> {
    println!("{}", serde_json::to_string(&response)?);
    if response.status_code != 200 {
        std::process::exit(1);
    }
    Ok(())
}
