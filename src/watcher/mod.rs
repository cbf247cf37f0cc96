
use crate::config::{Config, FileWatcherConfig, IndexingConfig};
use crate::{Result, VaultfindError};
use chrono::{DateTime, Utc};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind as NotifyKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A debounced filesystem event for a watched tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
    pub is_dir: bool,
    pub timestamp: DateTime<Utc>,
    /// Populated for renames when the backend reports both paths.
    pub old_path: Option<PathBuf>,
    pub extension: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub debounce_time: Duration,
    pub scan_interval: Duration,
    pub max_event_queue: usize,
    pub ignore_dot_files: bool,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl WatcherConfig {
    pub fn from_config(config: &Config) -> Self {
        Self::from_parts(&config.file_watcher, &config.indexing)
    }

    pub fn from_parts(watcher: &FileWatcherConfig, indexing: &IndexingConfig) -> Self {
        Self {
            debounce_time: Duration::from_millis(watcher.debounce_time_ms),
            scan_interval: Duration::from_secs(watcher.scan_interval_seconds),
            max_event_queue: watcher.max_event_queue,
            ignore_dot_files: watcher.ignore_dot_files,
            include_patterns: indexing.include_patterns.clone(),
            exclude_patterns: indexing.exclude_patterns.clone(),
        }
    }
}

struct PendingEvent {
    kind: FileEventKind,
    old_path: Option<PathBuf>,
    generation: u64,
}

/// Watches vault roots and emits debounced file events.
///
/// Per path, a new event within the debounce window supersedes the pending
/// one (last writer wins). The bounded output queue drops events with a
/// warning when full; the periodic rescan re-synthesizes anything missed.
pub struct VaultWatcher {
    config: WatcherConfig,
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    roots: Mutex<HashSet<PathBuf>>,
    pending: Arc<Mutex<HashMap<PathBuf, PendingEvent>>>,
    recent: Arc<Mutex<HashMap<PathBuf, Instant>>>,
    generation: std::sync::atomic::AtomicU64,
    tx: mpsc::Sender<FileEvent>,
}

impl VaultWatcher {
    /// Build the watcher and the channel its events arrive on.
    pub fn new(config: WatcherConfig) -> Result<(Arc<Self>, mpsc::Receiver<FileEvent>)> {
        let include = compile_patterns(&config.include_patterns)?;
        let exclude = compile_patterns(&config.exclude_patterns)?;
        let (tx, rx) = mpsc::channel(config.max_event_queue.max(1));

        let watcher = Arc::new(Self {
            config,
            include,
            exclude,
            watcher: Mutex::new(None),
            roots: Mutex::new(HashSet::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            recent: Arc::new(Mutex::new(HashMap::new())),
            generation: std::sync::atomic::AtomicU64::new(0),
            tx,
        });

        Ok((watcher, rx))
    }

    /// Register with the OS notification layer and start the rescan timer.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Event>();

        let backend = notify::recommended_watcher(move |result| match result {
            Ok(event) => {
                let _ = raw_tx.send(event);
            }
            Err(e) => warn!(error = %e, "watch backend error"),
        })
        .map_err(|e| VaultfindError::Watcher(format!("failed to create watcher: {e}")))?;

        *self.watcher.lock().expect("watcher lock") = Some(backend);

        // OS event loop.
        let this = Arc::clone(&self);
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = raw_rx.recv() => {
                        let Some(event) = event else { break };
                        this.handle_notify_event(event);
                    }
                }
            }
        });

        // Periodic rescan repairs missed notifications.
        let this = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.scan_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => this.rescan(),
                }
            }
        });

        Ok(())
    }

    /// Add a directory tree to the watch set.
    pub fn add_path(&self, path: &Path) -> Result<()> {
        let abs = path
            .canonicalize()
            .map_err(|e| VaultfindError::VaultUnreachable(format!("{}: {e}", path.display())))?;

        if !abs.is_dir() {
            return Err(VaultfindError::Watcher(format!(
                "not a directory: {}",
                abs.display()
            )));
        }

        let mut roots = self.roots.lock().expect("roots lock");
        if !roots.insert(abs.clone()) {
            return Ok(());
        }
        drop(roots);

        if let Some(watcher) = self.watcher.lock().expect("watcher lock").as_mut() {
            watcher
                .watch(&abs, RecursiveMode::Recursive)
                .map_err(|e| VaultfindError::Watcher(format!("failed to watch {}: {e}", abs.display())))?;
        }

        debug!(path = %abs.display(), "watching directory");
        Ok(())
    }

    /// Remove a directory tree from the watch set.
    pub fn remove_path(&self, path: &Path) {
        let abs = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let removed = self.roots.lock().expect("roots lock").remove(&abs);
        if removed {
            if let Some(watcher) = self.watcher.lock().expect("watcher lock").as_mut() {
                let _ = watcher.unwatch(&abs);
            }
            debug!(path = %abs.display(), "unwatched directory");
        }
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .roots
            .lock()
            .expect("roots lock")
            .iter()
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    fn handle_notify_event(&self, event: notify::Event) {
        match event.kind {
            NotifyKind::Create(_) => {
                for path in event.paths {
                    self.dispatch(FileEventKind::Created, path, None);
                }
            }
            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if event.paths.len() == 2 {
                    let old = event.paths[0].clone();
                    let new = event.paths[1].clone();
                    self.dispatch(FileEventKind::Renamed, new, Some(old));
                }
            }
            NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in event.paths {
                    self.dispatch(FileEventKind::Deleted, path, None);
                }
            }
            NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in event.paths {
                    self.dispatch(FileEventKind::Created, path, None);
                }
            }
            NotifyKind::Modify(_) => {
                for path in event.paths {
                    self.dispatch(FileEventKind::Modified, path, None);
                }
            }
            NotifyKind::Remove(_) => {
                for path in event.paths {
                    self.dispatch(FileEventKind::Deleted, path, None);
                }
            }
            _ => {}
        }
    }

    /// Filter, then hold the event for the debounce window. A newer event
    /// for the same path supersedes the pending one and restarts the timer.
    fn dispatch(&self, kind: FileEventKind, path: PathBuf, old_path: Option<PathBuf>) {
        let is_dir = path.is_dir();
        if !self.should_process(&path, is_dir) {
            return;
        }

        let generation = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        self.pending.lock().expect("pending lock").insert(
            path.clone(),
            PendingEvent {
                kind,
                old_path,
                generation,
            },
        );

        let pending = Arc::clone(&self.pending);
        let tx = self.tx.clone();
        let recent = Arc::clone(&self.recent);
        let debounce = self.config.debounce_time;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            let entry = {
                let mut map = pending.lock().expect("pending lock");
                match map.get(&path) {
                    Some(p) if p.generation == generation => map.remove(&path),
                    _ => None,
                }
            };

            if let Some(entry) = entry {
                send_event(&tx, &recent, entry.kind, path, entry.old_path, is_dir);
            }
        });
    }

    fn should_process(&self, path: &Path, is_dir: bool) -> bool {
        if is_dir {
            return !self.is_excluded_dir(path);
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if self.config.ignore_dot_files && name.starts_with('.') {
            return false;
        }

        for pattern in &self.exclude {
            if pattern.matches(name) {
                return false;
            }
        }
        if self.path_in_excluded_dir(path) {
            return false;
        }

        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| p.matches(name))
    }

    fn is_excluded_dir(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if self.config.ignore_dot_files && name.starts_with('.') {
            return true;
        }
        self.path_in_excluded_dir(path) || excluded_dir_names(&self.config.exclude_patterns).contains(&name.to_string())
    }

    fn path_in_excluded_dir(&self, path: &Path) -> bool {
        let excluded = excluded_dir_names(&self.config.exclude_patterns);
        path.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|name| excluded.contains(&name.to_string()))
        })
    }

    /// Walk every watched root and synthesize a `Modified` event for files
    /// whose last recorded event predates the scan interval.
    fn rescan(&self) {
        let roots = self.watched_paths();
        debug!(roots = roots.len(), "periodic rescan");

        for root in roots {
            let walk = WalkDir::new(&root).into_iter().filter_entry(|entry| {
                !(entry.file_type().is_dir() && self.is_excluded_dir(entry.path()))
            });

            for entry in walk.filter_map(std::result::Result::ok) {
                if entry.file_type().is_dir() {
                    continue;
                }
                let path = entry.path();
                if !self.should_process(path, false) {
                    continue;
                }

                let stale = {
                    let recent = self.recent.lock().expect("recent lock");
                    recent
                        .get(path)
                        .is_none_or(|last| last.elapsed() > self.config.scan_interval)
                };

                if stale {
                    send_event(
                        &self.tx,
                        &self.recent,
                        FileEventKind::Modified,
                        path.to_path_buf(),
                        None,
                        false,
                    );
                }
            }
        }
    }
}

fn send_event(
    tx: &mpsc::Sender<FileEvent>,
    recent: &Mutex<HashMap<PathBuf, Instant>>,
    kind: FileEventKind,
    path: PathBuf,
    old_path: Option<PathBuf>,
    is_dir: bool,
) {
    recent
        .lock()
        .expect("recent lock")
        .insert(path.clone(), Instant::now());

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();

    let event = FileEvent {
        kind,
        path,
        is_dir,
        timestamp: Utc::now(),
        old_path,
        extension,
    };

    if let Err(e) = tx.try_send(event) {
        match e {
            mpsc::error::TrySendError::Full(event) => {
                warn!(path = %event.path.display(), "event queue full, discarding event");
            }
            mpsc::error::TrySendError::Closed(_) => {}
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            // Directory patterns like ".git/*" are matched by component.
            let name = p.strip_suffix("/*").unwrap_or(p);
            glob::Pattern::new(name)
                .map_err(|e| VaultfindError::Config(format!("invalid glob pattern {p}: {e}")))
        })
        .collect()
}

/// Directory names carved out of `dir/*` style exclude patterns.
fn excluded_dir_names(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .filter_map(|p| p.strip_suffix("/*").map(str::to_string))
        .collect()
}
