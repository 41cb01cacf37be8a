//! spawnerd: serves the Spawner endpoints over HTTP

mod config;
mod http;

use anyhow::{Context, Result};
use clap::Parser;
use config::{CONFIG_ENV, DaemonConfig};
use spawner_cloud::{CredentialResolver, LroBridge};
use spawner_cloud_aws::AwsController;
use spawner_cloud_azure::AzureController;
use spawner_service::{
    EndpointSet, FileCredentialResolver, ResiliencePolicies, Spawner, StaticCredentialResolver,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "spawnerd")]
#[command(about = "Resilient multi-provider cluster orchestration daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// KDL config file
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let path = config::discover(cli.config.as_deref())?;
    let mut config = DaemonConfig::load(path.as_deref())?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    let endpoints = build_endpoints(&config);
    let app = http::router(endpoints);

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!(addr = %config.listen, "spawnerd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("spawnerd stopped");
    Ok(())
}

fn build_endpoints(config: &DaemonConfig) -> EndpointSet {
    let resolver: Arc<dyn CredentialResolver> = match &config.credentials {
        Some(path) => {
            info!(path = %path.display(), "using credential file");
            Arc::new(FileCredentialResolver::new(path.clone()))
        }
        None => {
            tracing::warn!("no credential file configured, every account will fail to resolve");
            Arc::new(StaticCredentialResolver::new())
        }
    };

    let bridge = LroBridge::new(config.service.poll.clone());
    let azure = AzureController::new(
        config.azure.endpoints.clone(),
        bridge,
        config.azure.settings.clone(),
    );

    let spawner = Spawner::new(resolver)
        .with_controller(Arc::new(azure))
        .with_controller(Arc::new(AwsController::new()));
    let policies = ResiliencePolicies::new(&config.service.resilience);

    EndpointSet::new(Arc::new(spawner), Arc::new(policies))
        .with_request_timeout(config.service.request_timeout)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
