//! Bounded user-facing log
//!
//! Server output and installer milestones land here. The buffer keeps the
//! newest entries, broadcasts each one as a `server-log` event, and is
//! mirrored to `logs.json` every few appends.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::events::{CoreEvent, EventBus};

/// Entries retained in memory and in the log file
pub const MAX_LOGS: usize = 1000;

/// Appends between two background flushes
const FLUSH_EVERY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, kind: LogKind) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            message: message.into(),
            kind,
        }
    }
}

/// Ring buffer of [`LogEntry`], cheap to clone and share
#[derive(Clone)]
pub struct LogBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
    appended: Arc<AtomicUsize>,
    file: Option<PathBuf>,
    /// Held across snapshot and write, so the file only moves forward
    file_lock: Arc<Mutex<()>>,
    events: EventBus,
}

impl LogBuffer {
    pub fn new(capacity: usize, file: Option<PathBuf>, events: EventBus) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(MAX_LOGS)))),
            capacity: capacity.max(1),
            appended: Arc::new(AtomicUsize::new(0)),
            file,
            file_lock: Arc::new(Mutex::new(())),
            events,
        }
    }

    /// Buffer restored from a previous session's log file, if readable
    pub fn restore(file: &Path, events: EventBus) -> Self {
        let buffer = Self::new(MAX_LOGS, Some(file.to_path_buf()), events);
        if let Ok(content) = std::fs::read_to_string(file) {
            match serde_json::from_str::<Vec<LogEntry>>(&content) {
                Ok(previous) => {
                    let mut entries = buffer.entries.lock();
                    let skip = previous.len().saturating_sub(buffer.capacity);
                    entries.extend(previous.into_iter().skip(skip));
                }
                Err(e) => tracing::warn!("[Logs] Ignoring unreadable log file {:?}: {}", file, e),
            }
        }
        buffer
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(message, LogKind::Info);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(message, LogKind::Error);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(message, LogKind::Success);
    }

    /// Append an entry, evicting the oldest one when full
    pub fn push(&self, message: impl Into<String>, kind: LogKind) {
        let entry = LogEntry::new(message, kind);

        match kind {
            LogKind::Error => tracing::warn!(target: "llama_control::server_log", "{}", entry.message),
            _ => tracing::info!(target: "llama_control::server_log", "{}", entry.message),
        }

        {
            let mut entries = self.entries.lock();
            while entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }

        self.events.emit(CoreEvent::ServerLog(entry));

        let count = self.appended.fetch_add(1, Ordering::Relaxed) + 1;
        if count % FLUSH_EVERY == 0 {
            self.schedule_flush();
        }
    }

    /// Current entries, oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Write the buffer to the log file right now
    pub fn flush(&self) -> std::io::Result<()> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let _writing = self.file_lock.lock();
        write_entries(path, &self.snapshot())
    }

    fn schedule_flush(&self) {
        if self.file.is_none() {
            return;
        }

        let buffer = self.clone();
        let flush = move || {
            if let Err(e) = buffer.flush() {
                tracing::warn!("[Logs] Periodic flush failed: {}", e);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(flush);
            }
            Err(_) => flush(),
        }
    }
}

fn write_entries(path: &Path, entries: &[LogEntry]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(entries)?;
    std::fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_oldest_entries_evicted() {
        let logs = LogBuffer::new(3, None, EventBus::new());
        for i in 0..5 {
            logs.info(format!("line {}", i));
        }

        let messages: Vec<String> = logs.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_entry_wire_shape() {
        let entry = LogEntry::new("ready", LogKind::Success);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "success");
        assert_eq!(json["message"], "ready");
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_push_emits_server_log() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let logs = LogBuffer::new(10, None, bus);
        logs.error("boom");

        match rx.recv().await.unwrap() {
            CoreEvent::ServerLog(entry) => {
                assert_eq!(entry.message, "boom");
                assert_eq!(entry.kind, LogKind::Error);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_flush_and_restore() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("logs.json");

        let logs = LogBuffer::new(MAX_LOGS, Some(file.clone()), EventBus::new());
        logs.info("first");
        logs.success("second");
        logs.flush().unwrap();

        let restored = LogBuffer::restore(&file, EventBus::new());
        let messages: Vec<String> = restored.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_background_flushes_end_on_newest_snapshot() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("logs.json");
        let logs = LogBuffer::new(MAX_LOGS, Some(file.clone()), EventBus::new());

        let total = FLUSH_EVERY * 30;
        for i in 0..total {
            logs.info(format!("line {}", i));
        }

        let read = || -> usize {
            std::fs::read_to_string(&file)
                .ok()
                .and_then(|c| serde_json::from_str::<Vec<LogEntry>>(&c).ok())
                .map_or(0, |entries| entries.len())
        };
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while read() != total && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(read(), total);

        // Stragglers must not roll the file back
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(read(), total);
    }

    #[test]
    fn test_periodic_flush_without_runtime() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("logs.json");
        let logs = LogBuffer::new(MAX_LOGS, Some(file.clone()), EventBus::new());

        for i in 0..FLUSH_EVERY - 1 {
            logs.info(format!("{}", i));
        }
        assert!(!file.exists());

        logs.info("tenth");
        let written: Vec<LogEntry> =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(written.len(), FLUSH_EVERY);
    }
}
