//! NginxWebApp Operator - runs nginx web applications declared as CRDs

use clap::{Parser, Subcommand};
use kube::Client;

use webapp_common::telemetry::{init_telemetry, TelemetryConfig};
use webapp_operator::controller_runner::build_webapp_controller;
use webapp_operator::startup::{crd_yaml, ensure_crd_installed};
use webapp_operator::OperatorConfig;

/// NginxWebApp operator - keeps a Deployment and a Service per NginxWebApp
#[derive(Parser, Debug)]
#[command(name = "webapp-operator", version, about, long_about = None)]
struct Cli {
    /// Print the CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: OperatorConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches NginxWebApp resources and the Deployments and Services they
    /// own, and reconciles each one until the process receives a signal.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crd_yaml()?);
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        format: cli.config.log_format,
        ..Default::default()
    })?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {}", e))?;

    if config.install_crd {
        ensure_crd_installed(&client).await?;
    }

    tracing::info!(
        default_image = %config.default_image,
        explicit_child_cleanup = config.explicit_child_cleanup,
        reconcile_timeout_secs = config.reconcile_timeout_secs,
        "Starting NginxWebApp operator"
    );

    build_webapp_controller(client, config.namespace.as_deref(), config.controller_config()).await;

    tracing::info!("Controller stopped, shutting down");
    Ok(())
}
