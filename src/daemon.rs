//! Daemon - the long-running mirror service
//!
//! Runs a full sync at startup, then serves webhooks while a background
//! task repeats the full sync every `sync.interval`. Ctrl-C or SIGTERM stops
//! both gracefully.

use crate::config::Config;
use crate::git::{GitClient, StorageLayout};
use crate::github::GitHubClient;
use crate::gitlab::GitLabClient;
use crate::mirror::Mirror;
use crate::mirror_set::MirrorSet;
use crate::sync::{SyncEngine, SyncSummary};
use crate::webhook::{self, Dispatcher};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Wire the real GitLab, GitHub and git collaborators around a fresh mirror set
pub fn build_mirror(config: &Config) -> Result<Arc<Mirror>> {
    let source = GitLabClient::new(&config.source, &config.mirror.user_agent, config.sync.timeout())
        .context("Failed to create GitLab client")?;
    let target = GitHubClient::new(&config.mirror, config.mirror_organization())
        .context("Failed to create GitHub client")?;
    let transport = GitClient::new(config.sync.timeout());

    Ok(Arc::new(Mirror::new(
        Arc::new(source),
        Arc::new(target),
        Arc::new(transport),
        Arc::new(MirrorSet::new()),
        StorageLayout::from_config(&config.source.storage),
        config.source_homepage(),
    )))
}

/// Daemon state and control
pub struct Daemon {
    config: Arc<Config>,
    mirror: Arc<Mirror>,
    sync_engine: Arc<SyncEngine>,
    shutdown_sender: broadcast::Sender<()>,
}

impl Daemon {
    /// Create a daemon talking to the configured services
    pub fn new(config: Config) -> Result<Self> {
        let mirror = build_mirror(&config)?;
        Ok(Self::with_mirror(config, mirror))
    }

    /// Create a daemon around an already wired mirror
    pub fn with_mirror(config: Config, mirror: Arc<Mirror>) -> Self {
        let sync_engine = Arc::new(SyncEngine::new(mirror.clone(), &config));
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            config: Arc::new(config),
            mirror,
            sync_engine,
            shutdown_sender,
        }
    }

    pub fn mirror(&self) -> &Arc<Mirror> {
        &self.mirror
    }

    /// Sender that stops [`Daemon::serve`] when a value is sent
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_sender.clone()
    }

    /// Startup full sync, then serve until a shutdown signal arrives
    pub async fn run(&self) -> Result<()> {
        info!("Starting repomirror daemon");

        // Without a complete listing the mirror set would be meaningless
        self.sync_engine
            .run()
            .await
            .context("Startup full sync failed")?;

        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind webhook listener on {}", addr))?;

        let shutdown_sender = self.shutdown_sender.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("Shutdown signal received, stopping daemon...");
            let _ = shutdown_sender.send(());
        });

        self.serve(listener).await
    }

    /// Serve webhooks on `listener` and run the periodic full sync
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let dispatcher = Arc::new(Dispatcher::new(
            self.mirror.clone(),
            self.config.source.organization.clone(),
        ));
        let app = webhook::router(dispatcher, self.config.hooks.secret.clone());

        let sync_task = match self.config.sync.interval()? {
            Some(period) => {
                let engine = self.sync_engine.clone();
                let receiver = self.shutdown_sender.subscribe();
                Some(tokio::spawn(periodic_sync(engine, period, receiver)))
            }
            None => {
                info!("Periodic full sync disabled");
                None
            }
        };

        info!("Listening for webhooks on {}", listener.local_addr()?);

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_receiver.recv().await;
            })
            .await
            .context("Webhook server failed")?;

        if let Some(task) = sync_task {
            if let Err(e) = task.await {
                error!("Periodic sync task ended abnormally: {}", e);
            }
        }

        info!("Daemon stopped");
        Ok(())
    }
}

/// Repeat the full sync every `period` until shutdown. Failures are logged
/// and the previous mirror set is kept.
async fn periodic_sync(engine: Arc<SyncEngine>, period: Duration, mut shutdown_receiver: broadcast::Receiver<()>) {
    let mut interval_timer = interval(period);

    info!("Periodic full sync every {:?}", period);

    // Skip the first immediate tick
    interval_timer.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_receiver.recv() => {
                debug!("Shutdown signal received in sync loop");
                break;
            }

            _ = interval_timer.tick() => {
                debug!("Starting scheduled full sync");
                let sync_start = Instant::now();

                match engine.run().await {
                    Ok(summary) => log_sync_success(&summary, sync_start.elapsed()),
                    Err(e) => error!("Scheduled full sync failed: {}", e),
                }
            }
        }
    }
}

fn log_sync_success(summary: &SyncSummary, duration: Duration) {
    info!(
        "Scheduled sync finished in {:.2}s: {} created, {} updated, {} failed",
        duration.as_secs_f64(),
        summary.created,
        summary.updated,
        summary.failed
    );
}

/// Wait for Ctrl+C, or SIGTERM on Unix
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => debug!("Ctrl+C received"),
        _ = terminate => debug!("SIGTERM received"),
    }
}
