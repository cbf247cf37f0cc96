mod process;

pub use process::ProcessManager;

use crate::api::{server, ApiService};
use crate::config::{Config, EmbeddingConfig};
use crate::embedding::{CachedEmbedder, Embedder, FallbackEmbedder, OllamaEmbedder};
use crate::indexer::{IndexerService, QueryService};
use crate::store::{Distance, EmbeddedStoreServer, QdrantStore, VectorStore};
use crate::watcher::{FileEvent, FileEventKind, VaultWatcher, WatcherConfig};
use crate::{Result, VaultfindError};
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Internal marker for the fork/detach dance: the CLI re-executes itself
/// with this variable set and the child runs the daemon loop. Never set it
/// by hand.
pub const DAEMON_ENV: &str = "VAULTFIND_DAEMON";

const STORE_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Long-lived host for every stateful component: watcher, indexer, embedder
/// client, vector-store client, query service, and the HTTP surface.
pub struct Daemon {
    config: Arc<Config>,
    process_manager: ProcessManager,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let process_manager = ProcessManager::new(config.daemon.pid_file.clone());
        Self {
            config: Arc::new(config),
            process_manager,
        }
    }

    /// Run the daemon in the current process until a shutdown signal.
    pub async fn run(&self) -> Result<()> {
        self.process_manager.acquire()?;
        let result = self.run_inner().await;
        self.process_manager.release();
        result
    }

    async fn run_inner(&self) -> Result<()> {
        let config = Arc::clone(&self.config);
        let shutdown = CancellationToken::new();

        // Vector store first: supervisor, then client. A store that cannot
        // be reached at startup is fatal.
        let supervisor = Arc::new(EmbeddedStoreServer::new(&config.qdrant));
        if config.qdrant.embedded {
            supervisor.start().await?;
            supervisor.wait_ready(STORE_READY_TIMEOUT).await?;
        }

        let store: Arc<dyn VectorStore> = Arc::new(
            QdrantStore::connect(&config.qdrant)
                .await
                .map_err(|e| VaultfindError::StoreUnavailable(e.to_string()))?,
        );

        let distance = Distance::parse(&config.qdrant.distance).unwrap_or_default();
        store
            .create_collection(
                &config.qdrant.collection,
                config.embedding.dimensions,
                distance,
            )
            .await
            .map_err(|e| VaultfindError::StoreUnavailable(e.to_string()))?;

        // Embedding stack: cache over the fallback chain. A failing probe is
        // only a warning; the chain may still recover at call time.
        let probe = OllamaEmbedder::new(&config.embedding);
        if let Err(e) = probe.probe().await {
            warn!(error = %e, "embedding server probe failed, indexing will retry");
        }
        let embedder = build_embedder(&config.embedding)?;

        let indexer = Arc::new(IndexerService::new(
            config.clone(),
            embedder.clone(),
            store.clone(),
        ));
        indexer.ensure_payload_indexes().await;

        let query = Arc::new(QueryService::new(
            embedder.clone(),
            store.clone(),
            config.qdrant.collection.clone(),
            config.vault_paths().to_vec(),
        ));

        let api_service = Arc::new(ApiService::new(
            config.clone(),
            indexer.clone(),
            query,
            embedder.clone(),
            store.clone(),
            shutdown.clone(),
        ));

        // File watcher over every reachable vault.
        let (watcher, events) = VaultWatcher::new(WatcherConfig::from_config(&config))?;
        watcher.clone().start(shutdown.clone())?;
        for vault in config.vault_paths() {
            if let Err(e) = watcher.add_path(vault) {
                warn!(vault = %vault.display(), error = %e, "skipping unreachable vault");
            }
        }

        spawn_event_loop(indexer.clone(), events, shutdown.clone());

        if config.indexing.reindex_on_startup {
            if let Err(e) = indexer.clone().start_background_reindex(false, &shutdown) {
                warn!(error = %e, "startup reindex not started");
            }
        }

        let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
            .parse()
            .map_err(|e| VaultfindError::Config(format!("invalid API address: {e}")))?;
        let server_task = tokio::spawn(server::serve(api_service, addr, shutdown.clone()));

        info!(%addr, "daemon started");
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");

        // Cooperative shutdown with a deadline, then force-stop.
        shutdown.cancel();
        let deadline = Duration::from_secs(config.daemon.shutdown_timeout_seconds);
        match tokio::time::timeout(deadline, server_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!(error = %e, "API server exited with error"),
            Ok(Err(e)) => error!(error = %e, "API server task panicked"),
            Err(_) => warn!("shutdown deadline exceeded, force-stopping"),
        }

        embedder.close().await;
        // The store supervisor goes down after every client.
        drop(store);
        supervisor.stop().await?;

        info!("daemon stopped");
        Ok(())
    }

    /// Fork/detach: re-execute the current binary with the daemon marker set
    /// and its output appended to the log file.
    pub fn start_detached(&self, config_path: Option<&std::path::Path>) -> Result<u32> {
        if let Some(pid) = self.process_manager.running_pid() {
            return Err(VaultfindError::Daemon(format!(
                "daemon is already running (pid {pid})"
            )));
        }

        let exe = std::env::current_exe()
            .map_err(|e| VaultfindError::Daemon(format!("cannot locate executable: {e}")))?;

        let log_file = &self.config.daemon.log_file;
        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let open_log = || {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
        };

        let mut command = std::process::Command::new(exe);
        command.arg("start").arg("--foreground");
        if let Some(path) = config_path {
            command.arg("--config").arg(path);
        }

        let child = command
            .env(DAEMON_ENV, "1")
            .stdin(Stdio::null())
            .stdout(open_log()?)
            .stderr(open_log()?)
            .spawn()
            .map_err(|e| VaultfindError::Daemon(format!("failed to spawn daemon: {e}")))?;

        Ok(child.id())
    }

    /// Ask a running daemon to shut down.
    pub fn stop(&self) -> Result<()> {
        self.process_manager.signal(nix::sys::signal::Signal::SIGTERM)?;
        info!("sent shutdown signal to daemon");
        Ok(())
    }

    pub fn running_pid(&self) -> Option<i32> {
        self.process_manager.running_pid()
    }
}

fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let mut providers: Vec<Arc<dyn Embedder>> = vec![Arc::new(OllamaEmbedder::new(config))];
    for model in &config.fallback_models {
        providers.push(Arc::new(OllamaEmbedder::with_model(config, model)));
    }

    let fallback = FallbackEmbedder::new(providers)
        .map_err(|e| VaultfindError::EmbeddingUnavailable(e.to_string()))?;
    Ok(Arc::new(CachedEmbedder::new(Arc::new(fallback))))
}

/// Drive indexer updates from debounced watcher events.
pub fn spawn_event_loop(
    indexer: Arc<IndexerService>,
    mut events: mpsc::Receiver<FileEvent>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            handle_file_event(&indexer, event).await;
        }
    });
}

async fn handle_file_event(indexer: &IndexerService, event: FileEvent) {
    // Directory events only exist to maintain the watch set.
    if event.is_dir {
        return;
    }

    match event.kind {
        FileEventKind::Created | FileEventKind::Modified => {
            info!(path = %event.path.display(), "indexing changed file");
            if let Err(e) = indexer.index_file(&event.path).await {
                error!(path = %event.path.display(), error = %e, "failed to index file");
            }
        }
        FileEventKind::Deleted => {
            info!(path = %event.path.display(), "removing deleted file from index");
            if let Err(e) = indexer.remove_file(&event.path).await {
                error!(path = %event.path.display(), error = %e, "failed to remove file");
            }
        }
        FileEventKind::Renamed => {
            info!(
                old = ?event.old_path,
                new = %event.path.display(),
                "reindexing renamed file"
            );
            if let Some(old) = &event.old_path {
                if let Err(e) = indexer.remove_file(old).await {
                    error!(path = %old.display(), error = %e, "failed to remove old path");
                }
            }
            if let Err(e) = indexer.index_file(&event.path).await {
                error!(path = %event.path.display(), error = %e, "failed to index new path");
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return std::future::pending::<()>().await;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGINT handler");
            return std::future::pending::<()>().await;
        }
    };
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGHUP handler");
            return std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
        _ = sighup.recv() => info!("received SIGHUP"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
