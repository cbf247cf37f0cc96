
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Top-level application configuration, persisted as YAML at
/// `~/.config/vaultfind/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub paths: PathsConfig,
    pub daemon: DaemonConfig,
    pub api: ApiConfig,
    pub embedding: EmbeddingConfig,
    pub qdrant: QdrantConfig,
    pub indexing: IndexingConfig,
    pub file_watcher: FileWatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    pub data_dir: PathBuf,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub vault_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub log_level: String,
    pub shutdown_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model_name: String,
    pub server_url: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub timeout_seconds: u64,
    /// Additional providers tried in order when the primary fails.
    pub fallback_models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QdrantConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub embedded: bool,
    pub data_path: PathBuf,
    /// Path to a qdrant binary for embedded mode. When empty the supervisor
    /// assumes an externally managed process and only probes readiness.
    pub binary_path: PathBuf,
    pub collection: String,
    pub distance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexingConfig {
    pub chunk_strategy: String,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub window_size: usize,
    pub window_overlap: usize,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub reindex_on_startup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileWatcherConfig {
    pub debounce_time_ms: u64,
    pub scan_interval_seconds: u64,
    pub max_event_queue: usize,
    pub ignore_dot_files: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory could not be determined")]
    DirectoryError,
    #[error("At least one vault path must be configured")]
    NoVaultPaths,
    #[error("Invalid value at {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            paths: PathsConfig::default(),
            daemon: DaemonConfig::default(),
            api: ApiConfig::default(),
            embedding: EmbeddingConfig::default(),
            qdrant: QdrantConfig::default(),
            indexing: IndexingConfig::default(),
            file_watcher: FileWatcherConfig::default(),
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("vaultfind")
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: data_dir(),
            debug: false,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            vault_paths: vec![home_dir().join("Documents").join("Obsidian")],
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: data_dir().join("vaultfind.pid"),
            log_file: home_dir()
                .join(".config")
                .join("vaultfind")
                .join("logs")
                .join("vaultfind.log"),
            log_level: "info".to_string(),
            shutdown_timeout_seconds: 10,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8091,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model_name: "nomic-embed-text".to_string(),
            server_url: "http://localhost:11434".to_string(),
            dimensions: 768,
            batch_size: 8,
            max_attempts: 5,
            timeout_seconds: 60,
            fallback_models: Vec::new(),
        }
    }
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6334,
            api_key: String::new(),
            embedded: true,
            data_path: data_dir().join("qdrant"),
            binary_path: PathBuf::new(),
            collection: "vaultfind".to_string(),
            distance: "cosine".to_string(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_strategy: "hybrid".to_string(),
            min_chunk_size: 100,
            max_chunk_size: 1000,
            window_size: 500,
            window_overlap: 100,
            include_patterns: vec!["*.md".to_string()],
            exclude_patterns: vec![".git/*".to_string(), ".obsidian/*".to_string()],
            reindex_on_startup: false,
        }
    }
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            debounce_time_ms: 500,
            scan_interval_seconds: 600,
            max_event_queue: 1000,
            ignore_dot_files: true,
        }
    }
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".config").join("vaultfind"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Load configuration from the given path, or the default location when
    /// `None`. A missing file yields the defaults (without writing them).
    #[inline]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_file_path().context("Failed to determine config file path")?,
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Persist the full configuration. Mutations always rewrite the whole
    /// file; there is no partial update.
    #[inline]
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_file_path().context("Failed to determine config file path")?,
        };

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.vault_paths.is_empty() {
            return Err(ConfigError::NoVaultPaths);
        }

        if self.embedding.model_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "embedding.model_name".to_string(),
                message: "cannot be empty".to_string(),
            });
        }

        if self.embedding.dimensions == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.dimensions".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if self.embedding.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.batch_size".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if self.qdrant.collection.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "qdrant.collection".to_string(),
                message: "cannot be empty".to_string(),
            });
        }

        if !self.qdrant.embedded {
            if self.qdrant.host.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "qdrant.host".to_string(),
                    message: "cannot be empty for external mode".to_string(),
                });
            }
            if self.qdrant.port == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "qdrant.port".to_string(),
                    message: "must be positive for external mode".to_string(),
                });
            }
        }

        match self.qdrant.distance.as_str() {
            "cosine" | "dot" | "euclid" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "qdrant.distance".to_string(),
                    message: format!("unsupported metric: {other}"),
                });
            }
        }

        match self.indexing.chunk_strategy.as_str() {
            "header" | "sliding_window" | "hybrid" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "indexing.chunk_strategy".to_string(),
                    message: format!("unsupported strategy: {other}"),
                });
            }
        }

        if self.indexing.max_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "indexing.max_chunk_size".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if self.indexing.window_overlap >= self.indexing.max_chunk_size {
            return Err(ConfigError::InvalidValue {
                key: "indexing.window_overlap".to_string(),
                message: "must be smaller than max_chunk_size".to_string(),
            });
        }

        if self.file_watcher.max_event_queue == 0 {
            return Err(ConfigError::InvalidValue {
                key: "file_watcher.max_event_queue".to_string(),
                message: "must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// All configured vault roots.
    #[inline]
    pub fn vault_paths(&self) -> &[PathBuf] {
        &self.paths.vault_paths
    }

    /// Add a vault root if not already present. Paths are normalized to
    /// absolute form when possible.
    #[inline]
    pub fn add_vault_path(&mut self, path: &Path) {
        let abs = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        if !self.paths.vault_paths.contains(&abs) {
            self.paths.vault_paths.push(abs);
        }
    }

    /// Remove a vault root. Refuses to remove the last remaining path.
    #[inline]
    pub fn remove_vault_path(&mut self, path: &Path) -> Result<(), ConfigError> {
        if self.paths.vault_paths.len() <= 1 {
            return Err(ConfigError::NoVaultPaths);
        }
        let abs = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        self.paths.vault_paths.retain(|p| *p != abs && *p != path);
        Ok(())
    }

    #[inline]
    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.api.host, self.api.port)
    }

    #[inline]
    pub fn qdrant_url(&self) -> String {
        format!("http://{}:{}", self.qdrant.host, self.qdrant.port)
    }

    #[inline]
    pub fn debounce_time(&self) -> Duration {
        Duration::from_millis(self.file_watcher.debounce_time_ms)
    }

    #[inline]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.file_watcher.scan_interval_seconds)
    }

    #[inline]
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_seconds)
    }

    /// Apply a dotted-key assignment (`vaultfind config set <key> <value>`).
    #[inline]
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        match key {
            "general.debug" => {
                self.general.debug = value.parse().map_err(|_| invalid("expected true/false"))?;
            }
            "general.data_dir" => self.general.data_dir = PathBuf::from(value),
            "daemon.log_level" => self.daemon.log_level = value.to_string(),
            "api.host" => self.api.host = value.to_string(),
            "api.port" => {
                self.api.port = value.parse().map_err(|_| invalid("expected a port number"))?;
            }
            "embedding.provider" => self.embedding.provider = value.to_string(),
            "embedding.model_name" => self.embedding.model_name = value.to_string(),
            "embedding.server_url" => self.embedding.server_url = value.to_string(),
            "embedding.dimensions" => {
                self.embedding.dimensions =
                    value.parse().map_err(|_| invalid("expected an integer"))?;
            }
            "embedding.batch_size" => {
                self.embedding.batch_size =
                    value.parse().map_err(|_| invalid("expected an integer"))?;
            }
            "embedding.max_attempts" => {
                self.embedding.max_attempts =
                    value.parse().map_err(|_| invalid("expected an integer"))?;
            }
            "embedding.timeout_seconds" => {
                self.embedding.timeout_seconds =
                    value.parse().map_err(|_| invalid("expected an integer"))?;
            }
            "qdrant.host" => self.qdrant.host = value.to_string(),
            "qdrant.port" => {
                self.qdrant.port = value.parse().map_err(|_| invalid("expected a port number"))?;
            }
            "qdrant.embedded" => {
                self.qdrant.embedded =
                    value.parse().map_err(|_| invalid("expected true/false"))?;
            }
            "qdrant.collection" => self.qdrant.collection = value.to_string(),
            "qdrant.distance" => self.qdrant.distance = value.to_string(),
            "indexing.chunk_strategy" => self.indexing.chunk_strategy = value.to_string(),
            "indexing.min_chunk_size" => {
                self.indexing.min_chunk_size =
                    value.parse().map_err(|_| invalid("expected an integer"))?;
            }
            "indexing.max_chunk_size" => {
                self.indexing.max_chunk_size =
                    value.parse().map_err(|_| invalid("expected an integer"))?;
            }
            "indexing.window_overlap" => {
                self.indexing.window_overlap =
                    value.parse().map_err(|_| invalid("expected an integer"))?;
            }
            "file_watcher.debounce_time_ms" => {
                self.file_watcher.debounce_time_ms =
                    value.parse().map_err(|_| invalid("expected an integer"))?;
            }
            "file_watcher.scan_interval_seconds" => {
                self.file_watcher.scan_interval_seconds =
                    value.parse().map_err(|_| invalid("expected an integer"))?;
            }
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }

        self.validate()
    }

    /// Flat string map of the interesting settings, reported by /status.
    #[inline]
    pub fn as_status_map(&self) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();
        map.insert(
            "embedding_model".to_string(),
            self.embedding.model_name.clone(),
        );
        map.insert(
            "vector_dimensions".to_string(),
            self.embedding.dimensions.to_string(),
        );
        map.insert(
            "chunking_strategy".to_string(),
            self.indexing.chunk_strategy.clone(),
        );
        map.insert(
            "max_chunk_size".to_string(),
            self.indexing.max_chunk_size.to_string(),
        );
        if self.qdrant.embedded {
            map.insert("qdrant_mode".to_string(), "embedded".to_string());
            map.insert(
                "qdrant_data_path".to_string(),
                self.qdrant.data_path.display().to_string(),
            );
        } else {
            map.insert("qdrant_mode".to_string(), "external".to_string());
            map.insert(
                "qdrant_server".to_string(),
                format!("{}:{}", self.qdrant.host, self.qdrant.port),
            );
        }
        map.insert(
            "daemon_api".to_string(),
            format!("{}:{}", self.api.host, self.api.port),
        );
        map
    }

    /// Canned configuration templates (`vaultfind config template <name>`).
    #[inline]
    pub fn template(name: &str) -> Option<Config> {
        let mut config = Config::default();
        match name {
            "standard" => {}
            "server" => {
                config.qdrant.embedded = false;
                config.api.host = "0.0.0.0".to_string();
            }
            "docker" => {
                config.qdrant.embedded = false;
                config.qdrant.host = "qdrant".to_string();
                config.embedding.server_url = "http://ollama:11434".to_string();
            }
            "large" => {
                config.embedding.batch_size = 32;
                config.indexing.max_chunk_size = 2000;
                config.indexing.window_overlap = 200;
            }
            _ => return None,
        }
        Some(config)
    }
}
