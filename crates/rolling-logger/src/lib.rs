//! Rolling Logger
//!
//! Routes `tracing` output to a daily log file and keeps the most recent
//! lines in a circular buffer, so the settings screen can show them without
//! reading from disk.
//!
//! Files are named `<app>_<YYYY-MM-DD>.log`; only the newest
//! [`MAX_LOG_FILES`] are kept.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{Local, NaiveDate};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Number of lines kept in memory
pub const BUFFER_CAPACITY: usize = 500;

/// Number of daily files kept on disk
pub const MAX_LOG_FILES: usize = 7;

static LOGGER: OnceLock<RollingLogger> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("failed to prepare log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("a global logger is already installed")]
    AlreadyInitialized,

    #[error("logger not initialized")]
    NotInitialized,
}

/// Install the global subscriber.
///
/// Honors `RUST_LOG`; defaults to `info`. Events go to stderr and to the
/// rolling file/buffer.
pub fn init_logger(
    log_dir: impl AsRef<Path>,
    app_name: &str,
) -> Result<RollingLogger, LoggerError> {
    let logger = RollingLogger::new(log_dir.as_ref(), app_name)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(logger.clone()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)?;

    // try_init already guarantees this is the first logger
    let _ = LOGGER.set(logger.clone());
    Ok(logger)
}

/// Lines currently held by the global logger's buffer, oldest first.
pub fn recent_logs() -> Vec<String> {
    LOGGER.get().map(RollingLogger::recent_lines).unwrap_or_default()
}

pub fn info(message: &str) -> Result<(), LoggerError> {
    LOGGER.get().ok_or(LoggerError::NotInitialized)?;
    tracing::info!(target: "rolling_logger", "{message}");
    Ok(())
}

pub fn error(message: &str) -> Result<(), LoggerError> {
    LOGGER.get().ok_or(LoggerError::NotInitialized)?;
    tracing::error!(target: "rolling_logger", "{message}");
    Ok(())
}

/// File + ring buffer sink, usable as a `tracing_subscriber` writer.
#[derive(Clone)]
pub struct RollingLogger {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    app_name: String,
    state: Mutex<SinkState>,
}

#[derive(Default)]
struct SinkState {
    date: Option<NaiveDate>,
    file: Option<File>,
    lines: VecDeque<String>,
    // Text after the last newline of the previous write
    partial: String,
}

impl RollingLogger {
    pub fn new(dir: &Path, app_name: &str) -> Result<Self, LoggerError> {
        fs::create_dir_all(dir).map_err(|source| LoggerError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                dir: dir.to_path_buf(),
                app_name: app_name.to_string(),
                state: Mutex::new(SinkState::default()),
            }),
        })
    }

    pub fn recent_lines(&self) -> Vec<String> {
        match self.inner.state.lock() {
            Ok(state) => state.lines.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().lines.iter().cloned().collect(),
        }
    }

    /// Path of the file that receives today's output
    pub fn current_file(&self) -> PathBuf {
        log_file_path(&self.inner.dir, &self.inner.app_name, Local::now().date_naive())
    }

    fn append(&self, buf: &[u8]) -> io::Result<()> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| io::Error::other("log buffer poisoned"))?;

        let today = Local::now().date_naive();
        if state.date != Some(today) || state.file.is_none() {
            let path = log_file_path(&self.inner.dir, &self.inner.app_name, today);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            state.file = Some(file);
            state.date = Some(today);
            prune_old_files(&self.inner.dir, &self.inner.app_name, MAX_LOG_FILES)?;
        }

        if let Some(file) = state.file.as_mut() {
            file.write_all(buf)?;
        }

        let text = String::from_utf8_lossy(buf);
        let mut pending = std::mem::take(&mut state.partial);
        pending.push_str(&text);

        let mut rest = pending.as_str();
        while let Some(pos) = rest.find('\n') {
            let line = rest[..pos].trim_end_matches('\r').to_string();
            if state.lines.len() == BUFFER_CAPACITY {
                state.lines.pop_front();
            }
            state.lines.push_back(line);
            rest = &rest[pos + 1..];
        }
        state.partial = rest.to_string();
        Ok(())
    }

    fn flush_file(&self) -> io::Result<()> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| io::Error::other("log buffer poisoned"))?;
        match state.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Writer handed out per event by [`MakeWriter`]
pub struct LogWriter {
    logger: RollingLogger,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.logger.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.logger.flush_file()
    }
}

impl<'a> MakeWriter<'a> for RollingLogger {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            logger: self.clone(),
        }
    }
}

fn log_file_path(dir: &Path, app_name: &str, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}_{}.log", app_name, date.format("%Y-%m-%d")))
}

/// Remove all but the newest `keep` log files of this app.
fn prune_old_files(dir: &Path, app_name: &str, keep: usize) -> io::Result<()> {
    let prefix = format!("{}_", app_name);
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(&prefix) && name.ends_with(".log"))
                .unwrap_or(false)
        })
        .collect();

    // Date suffix sorts lexicographically
    files.sort();
    let excess = files.len().saturating_sub(keep);
    for path in files.into_iter().take(excess) {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_reach_buffer_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let logger = RollingLogger::new(dir.path(), "DataItems").unwrap();

        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(logger.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("gateway ready");
            tracing::warn!(count = 3, "snapshot lagged");
        });

        let lines = logger.recent_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("gateway ready"));
        assert!(lines[1].contains("count=3"));

        let contents = fs::read_to_string(logger.current_file()).unwrap();
        assert!(contents.contains("gateway ready"));
    }

    #[test]
    fn test_buffer_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let logger = RollingLogger::new(dir.path(), "DataItems").unwrap();
        let mut writer = logger.make_writer();

        for i in 0..BUFFER_CAPACITY + 10 {
            writeln!(writer, "line {i}").unwrap();
        }

        let lines = logger.recent_lines();
        assert_eq!(lines.len(), BUFFER_CAPACITY);
        assert_eq!(lines[0], "line 10");
    }

    #[test]
    fn test_partial_writes_are_joined() {
        let dir = tempfile::tempdir().unwrap();
        let logger = RollingLogger::new(dir.path(), "DataItems").unwrap();
        let mut writer = logger.make_writer();

        writer.write_all(b"first ha").unwrap();
        assert!(logger.recent_lines().is_empty());
        writer.write_all(b"lf\nsecond\n").unwrap();

        assert_eq!(logger.recent_lines(), vec!["first half", "second"]);
    }

    #[test]
    fn test_prune_keeps_newest_files() {
        let dir = tempfile::tempdir().unwrap();
        for day in 1..=9 {
            File::create(dir.path().join(format!("DataItems_2026-01-0{day}.log"))).unwrap();
        }
        File::create(dir.path().join("Other_2026-01-01.log")).unwrap();

        prune_old_files(dir.path(), "DataItems", 3).unwrap();

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "DataItems_2026-01-07.log",
                "DataItems_2026-01-08.log",
                "DataItems_2026-01-09.log",
                "Other_2026-01-01.log",
            ]
        );
    }

    #[test]
    fn test_helpers_require_init() {
        if LOGGER.get().is_none() {
            assert!(matches!(info("hello"), Err(LoggerError::NotInitialized)));
        }
    }
}
