use crate::config::QdrantConfig;
use crate::{Result, VaultfindError};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Supervisor for an embedded vector-store instance.
///
/// When a binary path is configured the supervisor owns the child process:
/// it spawns it with the configured data directory and kills it on stop.
/// Without a binary the process is assumed to be externally managed and only
/// the readiness probe is meaningful. Both modes honor the same
/// start/stop/readiness contract.
pub struct EmbeddedStoreServer {
    binary_path: Option<PathBuf>,
    data_path: PathBuf,
    host: String,
    port: u16,
    child: Mutex<Option<Child>>,
}

impl EmbeddedStoreServer {
    pub fn new(config: &QdrantConfig) -> Self {
        let binary_path = if config.binary_path.as_os_str().is_empty() {
            None
        } else {
            Some(config.binary_path.clone())
        };

        Self {
            binary_path,
            data_path: config.data_path.clone(),
            host: config.host.clone(),
            port: config.port,
            child: Mutex::new(None),
        }
    }

    /// Launch the embedded instance. A second start while running is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        if child.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.data_path)?;

        let Some(binary) = &self.binary_path else {
            info!("no embedded store binary configured, expecting an external instance");
            return Ok(());
        };

        debug!(binary = %binary.display(), data = %self.data_path.display(), "starting embedded store");

        let spawned = Command::new(binary)
            .env("QDRANT__STORAGE__STORAGE_PATH", &self.data_path)
            .env("QDRANT__SERVICE__GRPC_PORT", self.port.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                VaultfindError::Daemon(format!(
                    "failed to launch embedded store {}: {e}",
                    binary.display()
                ))
            })?;

        *child = Some(spawned);
        info!(port = self.port, "embedded store started");
        Ok(())
    }

    /// Block until the store answers on its port, or the timeout elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if TcpStream::connect(&addr).await.is_ok() {
                debug!(%addr, "store is ready");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(VaultfindError::StoreUnavailable(format!(
                    "store at {addr} not ready within {timeout:?}"
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    pub async fn is_running(&self) -> bool {
        let mut child = self.child.lock().await;
        match child.as_mut() {
            Some(process) => matches!(process.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Stop the managed process, if any. Safe to call repeatedly.
    pub async fn stop(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        if let Some(mut process) = child.take() {
            if let Err(e) = process.kill().await {
                warn!(error = %e, "failed to kill embedded store");
            }
            let _ = process.wait().await;
            info!("embedded store stopped");
        }
        Ok(())
    }
}
