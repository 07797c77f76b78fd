//! Event Boundary
//!
//! Fire-and-forget events from the core to whoever is presenting it.
//! A command's return value and the events it causes are not ordered
//! relative to each other; subscribers must tolerate either order.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::logs::LogEntry;

/// Events buffered per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 256;

/// Download state reported with every progress event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Downloading,
    Completed,
    Failed,
}

/// Download progress information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Asset file name
    pub name: String,
    /// Whole percent, 0..=100
    pub progress: u8,
    pub status: DownloadStatus,
}

/// Server liveness as seen by the supervisor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerStatus {
    pub running: bool,
    pub model: Option<String>,
}

impl ServerStatus {
    pub fn stopped() -> Self {
        Self {
            running: false,
            model: None,
        }
    }

    pub fn running(model: impl Into<String>) -> Self {
        Self {
            running: true,
            model: Some(model.into()),
        }
    }
}

/// Everything the core pushes to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum CoreEvent {
    ServerStatus(ServerStatus),
    ServerLog(LogEntry),
    DownloadProgress(DownloadProgress),
}

impl CoreEvent {
    /// Wire channel name of the event
    pub fn channel(&self) -> &'static str {
        match self {
            CoreEvent::ServerStatus(_) => "server-status",
            CoreEvent::ServerLog(_) => "server-log",
            CoreEvent::DownloadProgress(_) => "download-progress",
        }
    }
}

/// Broadcast hub shared by every core component
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Emit an event. Having no subscribers is fine.
    pub fn emit(&self, event: CoreEvent) {
        self.tx.send(event).ok();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    pub fn download_progress(&self, name: &str, progress: u8, status: DownloadStatus) {
        self.emit(CoreEvent::DownloadProgress(DownloadProgress {
            name: name.to_string(),
            progress,
            status,
        }));
    }

    pub fn server_status(&self, status: ServerStatus) {
        self.emit(CoreEvent::ServerStatus(status));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.server_status(ServerStatus::stopped());
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.download_progress("llama.zip", 42, DownloadStatus::Downloading);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.channel(), "download-progress");
        assert_eq!(
            event,
            CoreEvent::DownloadProgress(DownloadProgress {
                name: "llama.zip".into(),
                progress: 42,
                status: DownloadStatus::Downloading,
            })
        );
    }

    #[test]
    fn test_status_wire_shape() {
        let json = serde_json::to_value(CoreEvent::ServerStatus(ServerStatus::stopped())).unwrap();
        assert_eq!(json["event"], "server-status");
        assert_eq!(json["payload"]["running"], false);
        assert!(json["payload"]["model"].is_null());
    }
}
