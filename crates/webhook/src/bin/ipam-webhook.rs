//! IPAM admission webhook server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ipam_ports::PoolStore;
use ipam_provider::{ProviderRegistry, StaticPoolProvider};
use ipam_store_kube::KubePoolStore;
use ipam_store_memory::MemoryPoolStore;
use ipam_webhook::{AppState, IpamAdmission, StoreConfig, WebhookConfig};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(
    name = "ipam-webhook",
    version,
    about = "Mutating admission webhook that assigns IP addresses to machines"
)]
struct Args {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long, env = "IPAM_WEBHOOK_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => WebhookConfig::load(path)?,
        None => WebhookConfig::from_env()?,
    };
    if args.check {
        println!("configuration ok");
        return Ok(());
    }

    ipam_log::init(&config.log)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ipam-webhook starting");

    let pool_type = config.pool_api.resource_type_id()?;
    let store: Arc<dyn PoolStore> = match &config.store {
        StoreConfig::Memory { pools } => {
            tracing::warn!(
                pools = pools.len(),
                "using in-memory pool store; state is lost on restart"
            );
            Arc::new(MemoryPoolStore::with_pools(pools.iter().cloned())?)
        }
        StoreConfig::Kubernetes {
            kubeconfig,
            timeout,
        } => Arc::new(
            KubePoolStore::connect(&pool_type, kubeconfig.as_deref())
                .await
                .context("connecting to the kubernetes API")?
                .with_timeout(*timeout),
        ),
    };

    let provider = StaticPoolProvider::new(store).with_retry(config.retry.clone());
    let retry = provider.retry_policy();
    tracing::info!(
        max_attempts = retry.max_attempts,
        initial_backoff = ?retry.initial_backoff,
        max_backoff = ?retry.max_backoff,
        "static pool provider configured"
    );
    let registry = ProviderRegistry::builder()
        .register(pool_type, Arc::new(provider))?
        .build();

    let shutdown = CancellationToken::new();
    let state = AppState::new(
        Arc::new(IpamAdmission::new(Arc::new(registry))),
        config.request_timeout,
        shutdown.clone(),
    );
    let router = ipam_webhook::router_for(state, &config);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(addr = %config.bind, path = %config.path, "listening");

    tokio::spawn(wait_for_signal(shutdown.clone()));
    ipam_webhook::serve(listener, router, shutdown).await?;

    tracing::info!("ipam-webhook stopped");
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown requested");
    shutdown.cancel();
}
