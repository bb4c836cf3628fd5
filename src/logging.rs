//! Log sinks for agents, plus tracing setup.
//!
//! An agent writes leveled lines to the [`LogSink`] it was constructed
//! with. [`FileLogSink`] appends formatted lines to `<log_dir>/<agent_id>.log`;
//! [`TracingLogSink`] forwards to the `tracing` subscriber.

use crate::document::ensure_dir;
use crate::errors::{StateError, StateResult};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Destination for an agent's log lines.
pub trait LogSink: Send {
    /// Record one line. Sinks decide for themselves which levels they keep.
    fn log(&mut self, level: Level, message: &str);

    /// Flush buffered lines
    fn flush(&mut self) -> StateResult<()> {
        Ok(())
    }
}

/// Install a global `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

// `Level` orders more verbose levels higher (TRACE > ERROR).
fn at_least(level: Level, min: Level) -> bool {
    level <= min
}

fn emit(agent_id: &str, level: Level, message: &str) {
    match level {
        Level::ERROR => tracing::error!(agent.id = agent_id, "{}", message),
        Level::WARN => tracing::warn!(agent.id = agent_id, "{}", message),
        Level::INFO => tracing::info!(agent.id = agent_id, "{}", message),
        Level::DEBUG => tracing::debug!(agent.id = agent_id, "{}", message),
        Level::TRACE => tracing::trace!(agent.id = agent_id, "{}", message),
    }
}

/// Appends `<asctime> - <agent_id> - <LEVEL> - <message>` lines to a file.
///
/// Lines at `min_level` or above are written; WARN and above are also
/// mirrored to `tracing` so they reach the console.
pub struct FileLogSink {
    agent_id: String,
    path: PathBuf,
    writer: BufWriter<File>,
    min_level: Level,
}

impl FileLogSink {
    /// Open (or create) `<log_dir>/<agent_id>.log`, creating `log_dir` if needed.
    pub fn open(log_dir: impl AsRef<Path>, agent_id: impl Into<String>) -> StateResult<Self> {
        let agent_id = agent_id.into();
        let dir = ensure_dir(log_dir)?;
        let path = dir.join(format!("{}.log", agent_id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                StateError::storage(format!("Failed to open log file: {}", e))
                    .with_context("path", path.display().to_string())
            })?;

        Ok(Self {
            agent_id,
            path,
            writer: BufWriter::new(file),
            min_level: Level::INFO,
        })
    }

    /// Set the minimum level written to the file
    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn log(&mut self, level: Level, message: &str) {
        if at_least(level, Level::WARN) {
            emit(&self.agent_id, level, message);
        }
        if !at_least(level, self.min_level) {
            return;
        }
        let line = format!(
            "{} - {} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            self.agent_id,
            level,
            message
        );
        if let Err(e) = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush()) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write log line");
        }
    }

    fn flush(&mut self) -> StateResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Forwards every line to `tracing`, tagged with the agent id.
#[derive(Debug, Clone)]
pub struct TracingLogSink {
    agent_id: String,
}

impl TracingLogSink {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
        }
    }
}

impl LogSink for TracingLogSink {
    fn log(&mut self, level: Level, message: &str) {
        emit(&self.agent_id, level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
        let mut sink = TracingLogSink::new("quiet");
        sink.log(Level::INFO, "forwarded");
        sink.flush().unwrap();
    }

    #[test]
    fn test_file_sink_format_and_threshold() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = FileLogSink::open(tmp.path().join("logs"), "worker").unwrap();
        sink.log(Level::DEBUG, "hidden");
        sink.log(Level::INFO, "Agent worker initialized");
        sink.log(Level::ERROR, "Error during execution: boom");
        sink.flush().unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - worker - INFO - Agent worker initialized"));
        assert!(lines[1].contains(" - ERROR - Error during execution: boom"));
        assert!(tmp.path().join("logs").join("worker.log").exists());
    }

    #[test]
    fn test_file_sink_min_level() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = FileLogSink::open(tmp.path(), "verbose")
            .unwrap()
            .min_level(Level::DEBUG);
        sink.log(Level::DEBUG, "details");
        let text = std::fs::read_to_string(sink.path()).unwrap();
        assert!(text.contains("DEBUG - details"));
    }

    #[test]
    fn test_level_ordering() {
        assert!(at_least(Level::ERROR, Level::INFO));
        assert!(at_least(Level::INFO, Level::INFO));
        assert!(!at_least(Level::DEBUG, Level::INFO));
    }
}
