use env_logger::{Logger, Target};
use log::{Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, OnceLock};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};

const MAX_LOG_ENTRIES: usize = 2000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    fn now(level: &str, target: &str, message: String) -> Self {
        Self {
            timestamp_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
            level: level.to_string(),
            target: target.to_string(),
            message,
        }
    }
}

struct LogHub {
    entries: Mutex<VecDeque<LogEntry>>,
    tx: broadcast::Sender<LogEntry>,
}

impl LogHub {
    fn push(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push_back(entry.clone());
            while entries.len() > MAX_LOG_ENTRIES {
                entries.pop_front();
            }
        }
        let _ = self.tx.send(entry);
    }

    fn recent_entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }
}

static LOG_HUB: LazyLock<LogHub> = LazyLock::new(|| {
    let (tx, _) = broadcast::channel(512);
    LogHub {
        entries: Mutex::new(VecDeque::with_capacity(MAX_LOG_ENTRIES)),
        tx,
    }
});

struct LogFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl LogFile {
    fn new(path: PathBuf) -> Self {
        let file = Self::open(&path).ok();
        Self {
            path,
            file: Mutex::new(file),
        }
    }

    fn open(path: &Path) -> io::Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn append_entry(&self, entry: &LogEntry) {
        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if guard.is_none() {
            if let Ok(file) = Self::open(&self.path) {
                *guard = Some(file);
            } else {
                return;
            }
        }
        if let Some(file) = guard.as_mut() {
            let line = format_log_line(entry);
            let _ = file.write_all(line.as_bytes());
            let _ = file.write_all(b"\n");
            let _ = file.flush();
        }
    }
}

/// Set at most once, by `init`.
static LOG_FILE: OnceLock<LogFile> = OnceLock::new();

fn format_log_line(entry: &LogEntry) -> String {
    format!(
        "{} [{}] [{}] {}",
        entry.timestamp_ms,
        entry.level.to_uppercase(),
        entry.target,
        entry.message.replace('\n', "\\n")
    )
}

fn publish(entry: LogEntry) {
    if let Some(file) = LOG_FILE.get() {
        file.append_entry(&entry);
    }
    LOG_HUB.push(entry);
}

struct BroadcastLogger {
    inner: Logger,
}

impl Log for BroadcastLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Mirror to stderr through env_logger's own formatting.
        self.inner.log(record);
        publish(LogEntry::now(
            &record.level().to_string().to_lowercase(),
            record.target(),
            record.args().to_string(),
        ));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the logger. `filter` is the default; `RUST_LOG` overrides it.
pub fn init(filter: &str, log_file: Option<PathBuf>) -> Result<(), SetLoggerError> {
    if let Some(path) = log_file {
        let _ = LOG_FILE.set(LogFile::new(path));
    }
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter));
    builder.target(Target::Stderr);
    let logger = Box::leak(Box::new(BroadcastLogger {
        inner: builder.build(),
    }));
    log::set_logger(logger)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

pub fn recent_entries() -> Vec<LogEntry> {
    LOG_HUB.recent_entries()
}

pub fn subscribe() -> broadcast::Receiver<LogEntry> {
    LOG_HUB.tx.subscribe()
}

/// Newest error still held in the ring buffer.
pub fn last_error() -> Option<LogEntry> {
    recent_entries().into_iter().rev().find(|e| e.level == "error")
}

/// Warnings and errors seen on a live entry stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSummary {
    pub warnings: usize,
    pub errors: usize,
    /// Entries dropped because the counter fell behind.
    pub missed: u64,
}

impl LogSummary {
    fn record(&mut self, entry: &LogEntry) {
        match entry.level.as_str() {
            "warn" => self.warnings += 1,
            "error" => self.errors += 1,
            _ => {}
        }
    }
}

/// Count warnings and errors until `shutdown` flips, then drain what is queued.
pub async fn tally(mut entries: broadcast::Receiver<LogEntry>, mut shutdown: watch::Receiver<bool>) -> LogSummary {
    let mut summary = LogSummary::default();
    loop {
        tokio::select! {
            entry = entries.recv() => match entry {
                Ok(entry) => summary.record(&entry),
                Err(RecvError::Lagged(n)) => summary.missed += n,
                Err(RecvError::Closed) => return summary,
            },
            _ = shutdown.changed() => break,
        }
    }
    loop {
        match entries.try_recv() {
            Ok(entry) => summary.record(&entry),
            Err(TryRecvError::Lagged(n)) => summary.missed += n,
            Err(_) => return summary,
        }
    }
}

pub fn log_file_path() -> Option<String> {
    LOG_FILE.get().map(|f| f.path.display().to_string())
}

pub fn write_fallback_line(message: &str) {
    let entry = LogEntry::now("error", "taskflow.log_bridge", message.to_string());
    eprintln!("{}", format_log_line(&entry));
    publish(entry);
}
