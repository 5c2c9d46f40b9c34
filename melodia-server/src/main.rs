//! melodia-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise tracing (console plus rolling file).
//! 3. Create the data, upload and staging directories.
//! 4. Build the provider, storage, callback and journal collaborators.
//! 5. Start the scheduler, restore the journal and start the cleanup sweep.
//! 6. Serve HTTP until SIGINT/SIGTERM, then stop the sweep and the scheduler.

mod config;
mod error;
mod extract;
mod logging;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use melodia_core::services::{
    CallbackConfig, HttpCallbackNotifier, JsonTaskLog, OssConfig, OssUploader, SunoClient,
    SunoConfig,
};
use melodia_core::{Collaborators, ProviderClient, Scheduler, TaskPersistence};
use tracing::{info, warn};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let _log_guard = logging::init(&cfg)?;
    info!(version = env!("CARGO_PKG_VERSION"), "melodia-server starting");

    // ── 3. Directories ─────────────────────────────────────────────────────────
    for dir in [&cfg.data_dir, &cfg.upload_dir, &cfg.temp_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }

    // ── 4. Collaborators ───────────────────────────────────────────────────────
    let suno = SunoConfig {
        base_url: cfg.suno_api_base_url.clone(),
        ..SunoConfig::new(cfg.suno_api_key.clone())
    };
    let provider: Arc<dyn ProviderClient> =
        Arc::new(SunoClient::new(suno).context("MELODIA_SUNO_API_KEY must be set")?);

    let oss = OssConfig {
        transfer_timeout: cfg.oss_upload_timeout,
        ..OssConfig::new(cfg.oss_signed_url_api.clone(), cfg.temp_dir.clone())
    };
    let uploader = Arc::new(OssUploader::new(oss)?);

    let notifier = Arc::new(HttpCallbackNotifier::new(CallbackConfig {
        timeout: cfg.callback_timeout,
        ..CallbackConfig::default()
    })?);

    let journal: Arc<dyn TaskPersistence> = Arc::new(JsonTaskLog::new(cfg.journal_path()));

    // ── 5. Scheduler ───────────────────────────────────────────────────────────
    let scheduler = Scheduler::new(
        cfg.scheduler_config(),
        Collaborators {
            provider: Arc::clone(&provider),
            uploader,
            notifier,
            persistence: Some(journal),
        },
    );
    match scheduler.restore_journal().await {
        Ok(interrupted) => info!(
            path = %cfg.journal_path().display(),
            interrupted,
            "task journal restored"
        ),
        Err(e) => warn!(error = %e, "failed to restore task journal; starting empty"),
    }
    let sweeper = scheduler.start_cleanup();

    if cfg.public_base_url.is_none() {
        warn!("MELODIA_PUBLIC_BASE_URL is not set; provider callbacks are disabled");
    }

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        scheduler: scheduler.clone(),
        provider,
        started_at: Instant::now(),
    });

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(state);
    let addr: SocketAddr = cfg
        .bind_address
        .parse()
        .with_context(|| format!("invalid MELODIA_BIND address {}", cfg.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.stop().await;
    scheduler.shutdown().await;

    info!("melodia-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
