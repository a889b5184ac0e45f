use crate::config::LoggingConfig;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Maximum size per log file before rotation (~5 MB)
const MAX_LOG_FILE_SIZE: u64 = 5 * 1024 * 1024;
/// Number of rotated log files to keep
const MAX_LOG_FILES: usize = 5;
/// In-memory log buffer cap (`tagify logs`)
const MAX_MEMORY_LOGS: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

pub struct LogState {
    pub logs: Mutex<Vec<LogEntry>>,
    pub log_dir: Mutex<Option<PathBuf>>,
    pub debug_mode: AtomicBool,
}

impl Default for LogState {
    fn default() -> Self {
        Self::new()
    }
}

impl LogState {
    pub fn new() -> Self {
        Self {
            logs: Mutex::new(Vec::new()),
            log_dir: Mutex::new(None),
            debug_mode: AtomicBool::new(false),
        }
    }

    /// Initialise the persistent log directory and write a session marker.
    pub fn init_log_dir(&self, log_dir: &Path) {
        if let Err(e) = fs::create_dir_all(log_dir) {
            eprintln!("[LogState] Failed to create log directory {:?}: {}", log_dir, e);
            return;
        }

        if let Ok(mut dir) = self.log_dir.lock() {
            *dir = Some(log_dir.to_path_buf());
        }

        self.write_to_file(
            "INFO",
            &format!(
                "=== Tagify session started at {} ===",
                Local::now().format("%Y-%m-%d %H:%M:%S %Z")
            ),
        );
    }

    /// The current (active) log file path.
    pub fn current_log_path(&self) -> Option<PathBuf> {
        self.log_dir.lock().ok()?.as_ref().map(|d| d.join("tagify.log"))
    }

    pub fn get_log_dir(&self) -> Option<PathBuf> {
        self.log_dir.lock().ok()?.clone()
    }

    /// Rotate log files: tagify.log → tagify.1.log → tagify.2.log → …
    fn rotate_if_needed(&self) {
        let Some(current) = self.current_log_path() else { return };
        let file_size = fs::metadata(&current).map(|m| m.len()).unwrap_or(0);
        if file_size < MAX_LOG_FILE_SIZE {
            return;
        }

        let Some(dir) = self.get_log_dir() else { return };

        for i in (1..MAX_LOG_FILES).rev() {
            let from = dir.join(format!("tagify.{}.log", i));
            let to = dir.join(format!("tagify.{}.log", i + 1));
            let _ = fs::rename(&from, &to);
        }
        let _ = fs::rename(&current, dir.join("tagify.1.log"));
    }

    fn write_to_file(&self, level: &str, message: &str) {
        self.rotate_if_needed();
        let Some(path) = self.current_log_path() else { return };

        let line = format!(
            "[{}] [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            message
        );

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
            let _ = file.write_all(line.as_bytes());
        }
    }

    /// Writes to the memory buffer and the log file.
    pub fn add_log(&self, level: &str, message: &str) {
        if level == "DEBUG" && !self.is_debug() {
            return;
        }

        let entry = LogEntry {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            level: level.to_string(),
            message: message.to_string(),
        };

        if let Ok(mut logs) = self.logs.lock() {
            logs.push(entry);
            if logs.len() > MAX_MEMORY_LOGS {
                let drain_count = MAX_MEMORY_LOGS / 5;
                logs.drain(..drain_count);
            }
        }

        self.write_to_file(level, message);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_debug(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, enabled: bool) {
        let was = self.debug_mode.swap(enabled, Ordering::Relaxed);
        if was != enabled {
            self.add_log(
                "INFO",
                &format!("Debug mode {}", if enabled { "ENABLED" } else { "DISABLED" }),
            );
        }
    }

    pub fn stats(&self) -> Option<LogStats> {
        let dir = self.get_log_dir()?;
        let current_path = self.current_log_path()?;

        let mut total_size: u64 = 0;
        let mut file_count: usize = 0;

        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                if let Ok(meta) = entry.metadata() {
                    if meta.is_file() {
                        total_size += meta.len();
                        file_count += 1;
                    }
                }
            }
        }

        let current_size = fs::metadata(&current_path).map(|m| m.len()).unwrap_or(0);

        Some(LogStats {
            log_dir: dir.to_string_lossy().to_string(),
            total_size_bytes: total_size,
            file_count,
            current_file_size_bytes: current_size,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LogStats {
    pub log_dir: String,
    pub total_size_bytes: u64,
    pub file_count: usize,
    pub current_file_size_bytes: u64,
}

/// Forwards `tracing` events into a [`LogState`].
pub struct LogLayer {
    state: Arc<LogState>,
}

impl LogLayer {
    pub fn new(state: Arc<LogState>) -> Self {
        Self { state }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl<S: Subscriber> Layer<S> for LogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = match *event.metadata().level() {
            Level::ERROR => "ERROR",
            Level::WARN => "WARN",
            Level::INFO => "INFO",
            Level::DEBUG => "DEBUG",
            _ => return,
        };
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.state.add_log(level, &visitor.finish());
    }
}

/// Installs the global subscriber: env filter, stderr output and the
/// buffered/rotating [`LogState`] sink. Safe to call more than once.
pub fn init(config: &LoggingConfig) -> Arc<LogState> {
    let state = Arc::new(LogState::new());
    state.set_debug(config.debug);
    if let Some(dir) = &config.log_dir {
        state.init_log_dir(dir);
    }

    let default_level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(LogLayer::new(state.clone()))
        .try_init();

    state
}
