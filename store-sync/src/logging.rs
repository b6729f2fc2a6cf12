//! Tracing setup with optional rotated file output.
//!
//! Each process start moves the previous `run.log` aside to
//! `store-sync.YYYY-MM-DD.HHMMSS.log` and keeps at most `max_files` archives.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{LoggingError, LoggingResult};

const LOG_FILE_PREFIX: &str = "store-sync.";
const ACTIVE_LOG_NAME: &str = "run.log";

/// Keeps the non-blocking file writer alive. Buffered lines are flushed on drop.
#[derive(Debug)]
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Explicit level. `None` reads `RUST_LOG`, falling back to INFO.
    pub level: Option<LevelFilter>,
    /// Write to stderr.
    pub console: bool,
    pub file: Option<LogFileConfig>,
}

#[derive(Debug, Clone)]
pub struct LogFileConfig {
    pub log_dir: PathBuf,
    /// Archived files to keep besides the active `run.log`.
    pub max_files: usize,
}

/// Console-only logging at `level`.
pub fn init_console_logging(level: LevelFilter) -> LoggingResult<LoggingGuard> {
    init_logging(LoggingConfig {
        level: Some(level),
        console: true,
        file: None,
    })
}

/// Install the global tracing subscriber.
///
/// With neither console nor file output configured nothing is installed and the
/// tracing macros stay no-ops.
///
/// # Errors
///
/// Fails when the log directory cannot be prepared or a global subscriber is
/// already set.
pub fn init_logging(config: LoggingConfig) -> LoggingResult<LoggingGuard> {
    if !config.console && config.file.is_none() {
        return Ok(LoggingGuard {
            _worker_guard: None,
        });
    }

    let env_filter = match config.level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(LevelFilter::INFO.to_string())),
    };

    let (file_layer, guard) = match config.file {
        Some(ref file_config) => {
            let (writer, guard) = open_log_file(file_config)?;
            let layer = fmt::layer().with_target(true).with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = config.console.then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| LoggingError::SubscriberInit(e.to_string()))?;

    Ok(LoggingGuard {
        _worker_guard: guard,
    })
}

fn open_log_file(config: &LogFileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.log_dir)?;
    archive_active_log(&config.log_dir)?;
    prune_archives(&config.log_dir, config.max_files)?;

    let file = File::create(config.log_dir.join(ACTIVE_LOG_NAME))?;
    Ok(tracing_appender::non_blocking(file))
}

/// Rename an existing `run.log` after its modification time.
fn archive_active_log(log_dir: &Path) -> LoggingResult<()> {
    let active = log_dir.join(ACTIVE_LOG_NAME);
    if !active.exists() {
        return Ok(());
    }

    let stamp = modified_at(&active).unwrap_or_else(Local::now).format("%Y-%m-%d.%H%M%S");
    let mut target = log_dir.join(format!("{}{}.log", LOG_FILE_PREFIX, stamp));
    let mut suffix = 1;
    while target.exists() {
        if suffix > 999 {
            return Err(LoggingError::RotationFailed(
                "too many log files with same timestamp".to_string(),
            ));
        }
        target = log_dir.join(format!("{}{}-{}.log", LOG_FILE_PREFIX, stamp, suffix));
        suffix += 1;
    }

    fs::rename(&active, &target).map_err(|e| LoggingError::RotationFailed(e.to_string()))
}

fn modified_at(path: &Path) -> Option<DateTime<Local>> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::from(modified))
}

fn is_archive(name: &str) -> bool {
    name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log")
}

/// Delete the oldest archives beyond `max_files`. `run.log` is never touched.
fn prune_archives(log_dir: &Path, max_files: usize) -> LoggingResult<()> {
    let mut archives: Vec<_> = fs::read_dir(log_dir)
        .map_err(|e| LoggingError::RotationFailed(format!("failed to read log dir: {}", e)))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_str().map(is_archive).unwrap_or(false))
        .collect();

    if archives.len() <= max_files {
        return Ok(());
    }

    archives.sort_by_key(|entry| entry.metadata().and_then(|m| m.modified()).ok());

    let excess = archives.len() - max_files;
    for entry in archives.into_iter().take(excess) {
        if let Err(e) = fs::remove_file(entry.path()) {
            tracing::warn!("Failed to remove old log file {:?}: {}", entry.path(), e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    fn archives_in(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_archive(&e.file_name().to_string_lossy()))
            .count()
    }

    #[test]
    fn test_archive_without_active_log_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        archive_active_log(temp_dir.path()).unwrap();
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_archive_keeps_content() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = File::create(temp_dir.path().join(ACTIVE_LOG_NAME)).unwrap();
        writeln!(file, "INFO history request started").unwrap();
        drop(file);

        archive_active_log(temp_dir.path()).unwrap();

        assert!(!temp_dir.path().join(ACTIVE_LOG_NAME).exists());
        let archived: Vec<_> =
            fs::read_dir(temp_dir.path()).unwrap().filter_map(|e| e.ok()).collect();
        assert_eq!(archived.len(), 1);
        let name = archived[0].file_name().to_string_lossy().to_string();
        assert!(is_archive(&name));
        let content = fs::read_to_string(archived[0].path()).unwrap();
        assert!(content.contains("history request started"));
    }

    #[test]
    fn test_prune_keeps_newest_and_ignores_other_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        for i in 1..=5 {
            let mut file =
                File::create(dir.join(format!("store-sync.2026-01-{:02}.120000.log", i))).unwrap();
            writeln!(file, "log {}", i).unwrap();
            drop(file);
            std::thread::sleep(Duration::from_millis(20));
        }
        File::create(dir.join(ACTIVE_LOG_NAME)).unwrap();
        File::create(dir.join("notes.txt")).unwrap();

        prune_archives(dir, 2).unwrap();

        assert_eq!(archives_in(dir), 2);
        assert!(dir.join("store-sync.2026-01-05.120000.log").exists());
        assert!(dir.join(ACTIVE_LOG_NAME).exists());
        assert!(dir.join("notes.txt").exists());
    }

    #[test]
    fn test_open_log_file_creates_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("data").join("logs");

        let result = open_log_file(&LogFileConfig {
            log_dir: log_dir.clone(),
            max_files: 3,
        });

        assert!(result.is_ok());
        assert!(log_dir.join(ACTIVE_LOG_NAME).exists());
    }

    #[test]
    fn test_no_output_configured_succeeds() {
        let result = init_logging(LoggingConfig {
            level: Some(LevelFilter::DEBUG),
            console: false,
            file: None,
        });
        assert!(result.is_ok());
    }
}
