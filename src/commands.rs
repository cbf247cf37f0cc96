//! CLI subcommand implementations. Each command talks to the daemon over
//! HTTP and renders the result for the terminal.

use crate::api::{ApiClient, SearchRequest, SimilarRequest};
use crate::config::Config;
use crate::daemon::Daemon;
use crate::indexer::SearchHit;
use anyhow::{anyhow, bail, Context, Result};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

fn client(config: &Config) -> ApiClient {
    ApiClient::new(&config.api_url())
}

/// Known server failure modes mapped to actionable suggestions.
fn remediation_hint(message: &str) -> Option<&'static str> {
    if message.contains("no vectors found") || message.contains("not been indexed") {
        return Some("Run 'vaultfind reindex' to build the search index.");
    }
    if message.contains("document not found") {
        return Some("The file is not indexed yet. Run 'vaultfind reindex' or index it directly.");
    }
    if message.contains("Ollama") {
        return Some("Start the embedding service: 'ollama serve' (and pull the configured model).");
    }
    None
}

fn print_hint(err: &anyhow::Error) {
    if let Some(hint) = remediation_hint(&err.to_string()) {
        eprintln!("hint: {hint}");
    }
}

fn render_results(results: &[SearchHit]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for (i, hit) in results.iter().enumerate() {
        println!("{}. {} (score: {:.3})", i + 1, hit.path, hit.score);
        if !hit.title.is_empty() {
            println!("   title: {}", hit.title);
        }
        if !hit.section.is_empty() {
            println!("   section: {}", hit.section);
        }
        if !hit.tags.is_empty() {
            println!("   tags: {}", hit.tags.join(", "));
        }
        if !hit.excerpt.is_empty() {
            println!("   {}", hit.excerpt.replace('\n', " "));
        }
        if i + 1 < results.len() {
            println!();
        }
    }
}

pub fn search(
    config: &Config,
    query: &str,
    limit: usize,
    min_score: f32,
    tags: Vec<String>,
    path_prefix: Option<String>,
) -> Result<()> {
    let request = SearchRequest {
        query: query.to_string(),
        limit,
        offset: 0,
        min_score,
        tags,
        path_prefix,
    };

    let results = client(config).search(&request).inspect_err(print_hint)?;
    render_results(&results);
    Ok(())
}

pub fn similar(config: &Config, file_path: &str, limit: usize) -> Result<()> {
    let absolute = Path::new(file_path)
        .canonicalize()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| file_path.to_string());

    let request = SimilarRequest {
        file_path: absolute,
        limit,
    };

    let results = client(config).similar(&request).inspect_err(print_hint)?;
    render_results(&results);
    Ok(())
}

pub fn status(config: &Config) -> Result<()> {
    let client = client(config);
    if !client.health() {
        bail!(
            "daemon is not reachable at {} - start it with 'vaultfind start'",
            config.api_url()
        );
    }

    let status = client.status()?;
    println!("Daemon:   {} (v{})", status.status, status.version);
    println!("Uptime:   {}", status.uptime);
    println!("Started:  {}", status.start_time.format("%Y-%m-%d %H:%M:%S"));
    println!();
    println!("Index status: {:?}", status.index_stats.status);
    println!(
        "Documents:    {} indexed, {} failed, {} total",
        status.index_stats.indexed_documents,
        status.index_stats.failed_documents,
        status.index_stats.total_documents
    );
    if let Some(last_run) = status.index_stats.last_run {
        println!("Last run:     {}", last_run.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(last_error) = &status.index_stats.last_error {
        println!("Last error:   {last_error}");
    }
    println!();
    println!("Configuration:");
    let mut keys: Vec<&String> = status.config.keys().collect();
    keys.sort();
    for key in keys {
        println!("  {key}: {}", status.config[key]);
    }
    Ok(())
}

pub fn reindex(config: &Config, force: bool) -> Result<()> {
    client(config).reindex(force).inspect_err(print_hint)?;
    println!("Reindexing started in the background.");
    println!("Check progress with 'vaultfind status'.");
    Ok(())
}

pub async fn start(config: Config, config_path: Option<&Path>, foreground: bool) -> Result<()> {
    let daemon = Daemon::new(config);
    if foreground {
        daemon.run().await?;
        return Ok(());
    }

    let pid = daemon.start_detached(config_path)?;
    println!("Daemon started (pid {pid}).");
    Ok(())
}

pub fn stop(config: &Config) -> Result<()> {
    let daemon = Daemon::new(config.clone());
    daemon.stop()?;
    println!("Sent shutdown signal to daemon.");
    Ok(())
}

pub fn config_init(path: Option<&Path>) -> Result<()> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => Config::config_file_path().context("cannot determine config path")?,
    };
    if target.exists() {
        bail!("config file already exists: {}", target.display());
    }

    Config::default().save(Some(&target))?;
    println!("Created default configuration at {}", target.display());
    Ok(())
}

pub fn config_view(config: &Config) -> Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

pub fn config_path() -> Result<()> {
    println!("{}", Config::config_file_path()?.display());
    Ok(())
}

pub fn config_set(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load(None)?;
    config.set_value(key, value)?;
    config.save(None)?;
    println!("Set {key} = {value}");
    println!("Restart the daemon for the change to take effect.");
    Ok(())
}

pub fn config_template(name: &str) -> Result<()> {
    let template = Config::template(name)
        .ok_or_else(|| anyhow!("unknown template '{name}' (standard, server, docker, large)"))?;
    print!("{}", serde_yaml::to_string(&template)?);
    Ok(())
}

pub fn vault_list(config: &Config) -> Result<()> {
    for (i, path) in config.vault_paths().iter().enumerate() {
        let marker = if path.is_dir() { "" } else { " (unreachable)" };
        println!("{}. {}{marker}", i + 1, path.display());
    }
    Ok(())
}

pub fn vault_add(path: &Path) -> Result<()> {
    if !path.is_dir() {
        bail!("not a directory: {}", path.display());
    }

    let mut config = Config::load(None)?;
    config.add_vault_path(path);
    config.save(None)?;
    println!("Added vault path: {}", path.display());
    println!("Restart the daemon to start watching it.");
    Ok(())
}

pub fn vault_remove(path: &Path) -> Result<()> {
    let mut config = Config::load(None)?;
    config.remove_vault_path(path)?;
    config.save(None)?;
    println!("Removed vault path: {}", path.display());
    Ok(())
}

pub fn logs(config: &Config, follow: bool) -> Result<()> {
    let log_file = &config.daemon.log_file;
    if !log_file.exists() {
        bail!("no log file at {}", log_file.display());
    }

    let mut file = std::fs::File::open(log_file)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    print!("{content}");

    if !follow {
        return Ok(());
    }

    let mut offset = file.seek(SeekFrom::End(0))?;
    loop {
        std::thread::sleep(std::time::Duration::from_millis(500));

        let len = std::fs::metadata(log_file)?.len();
        if len < offset {
            // Truncated or rotated; start over from the beginning.
            offset = 0;
        }
        if len > offset {
            file.seek(SeekFrom::Start(offset))?;
            let mut fresh = String::new();
            file.read_to_string(&mut fresh)?;
            print!("{fresh}");
            offset = len;
        }
    }
}

/// Load the configuration for CLI use, surfacing validation problems.
pub fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    Config::load(path.map(PathBuf::as_path)).context("failed to load configuration")
}
