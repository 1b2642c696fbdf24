//! Toolchain operator - tracks the liveness of registered remote clusters

use clap::Parser;
use kube::CustomResourceExt;

use toolchain_common::crd::ToolchainCluster;
use toolchain_common::kube_utils::{create_client, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use toolchain_common::telemetry::{init_telemetry, TelemetryConfig};
use toolchain_operator::config::{Cli, Commands, ControllerArgs, OperatorConfig};
use toolchain_operator::controller_runner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ToolchainCluster::crd())
            .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let args = match cli.command {
        Some(Commands::Controller(args)) => args,
        None => ControllerArgs::from_env()?,
    };
    let config = OperatorConfig::try_from(args)?;

    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        anyhow::bail!("failed to install crypto provider: {:?}", e);
    }

    init_telemetry(TelemetryConfig {
        format: config.log_format,
    })?;

    let client = create_client(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await?;
    controller_runner::run(client, config).await;

    tracing::info!("toolchain operator shut down");
    Ok(())
}
