//! Serve mode: wires the runtime, telemetry, and deploy layers behind
//! the REST API and runs the GPU sampler in the background.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use blackbox_api::AppState;
use blackbox_core::FleetConfig;
use blackbox_deploy::{HubValidator, Orchestrator};
use blackbox_runtime::{DockerGateway, GpuInventory, ProcessExecutor};
use blackbox_telemetry::{GpuSampler, TelemetryRegistry};

pub struct ServeOptions {
    pub port: u16,
    pub config: Option<PathBuf>,
    pub sample_interval: u64,
    pub sampler: bool,
}

pub async fn run(opts: ServeOptions) -> anyhow::Result<()> {
    info!("Blackbox daemon starting");

    let config = FleetConfig::load(opts.config.as_deref())?;
    if config.hf_token.is_none() {
        warn!("no HF token configured; every deploy must carry hf_token");
    }
    info!(
        max_concurrent = config.max_concurrent_models,
        profiles = %config.profiles_dir.display(),
        image = %config.image,
        "configuration loaded"
    );

    // ── Initialize subsystems ──────────────────────────────────

    let executor = Arc::new(ProcessExecutor);
    let gateway = DockerGateway::new(executor.clone(), config.image.clone())
        .with_cache_dir(config.cache_dir.clone());
    let inventory = GpuInventory::new(executor);
    let validator = HubValidator::new(config.hub_url.clone())?;
    let registry = TelemetryRegistry::new();

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        Arc::new(gateway),
        Arc::new(validator),
        inventory.clone(),
        registry.clone(),
    ));
    info!("orchestrator initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let sampler_handle = if opts.sampler {
        let sampler = GpuSampler::new(
            registry,
            inventory,
            Duration::from_secs(opts.sample_interval.max(1)),
        );
        Some(tokio::spawn(async move {
            sampler.run(shutdown_rx).await;
        }))
    } else {
        info!("GPU sampler disabled");
        None
    };

    // ── Start API server ───────────────────────────────────────

    let router = blackbox_api::build_router(AppState::new(orchestrator));
    let addr = SocketAddr::from(([0, 0, 0, 0], opts.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(handle) = sampler_handle {
        let _ = handle.await;
    }

    info!("Blackbox daemon stopped");
    Ok(())
}
