use crate::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize tracing. With a log file the output goes there (append mode,
/// world-writable like the rest of the config directory); otherwise it goes
/// to stderr. Setting `DEBUG` in the environment raises the level to debug
/// regardless of the configured level.
pub fn init(level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = if std::env::var_os("DEBUG").is_some() {
        "debug"
    } else {
        level
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    };

    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(directory)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("vaultfind.log");
    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o666);
            let _ = std::fs::set_permissions(path, permissions);
        }
    }

    Ok(Some(guard))
}
