//! Fire-and-forget event bus for UI collaborators.
//!
//! Indexing and the tool server publish notifications here; a desktop UI (or
//! nothing at all) subscribes. Delivery is best-effort: a lagging or absent
//! subscriber never blocks indexing, and a dropped event is a UX glitch, not
//! a correctness bug.

use serde::Serialize;
use tokio::sync::broadcast;

/// Channel capacity. Old events are overwritten when no subscriber keeps up.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications published to UI subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum UiEvent {
    /// A file finished (re-)indexing.
    #[serde(rename = "project:fileIndexed")]
    FileIndexed {
        project_id: String,
        file_path: String,
        timestamp: i64,
    },
    /// Embedding model download progress (forwarded from the installer).
    #[serde(rename = "embedding:download-progress")]
    DownloadProgress {
        model_id: String,
        downloaded: u64,
        total: u64,
        stage: String,
    },
    /// Periodic tool-server status telemetry.
    #[serde(rename = "mcp:status")]
    ServerStatus {
        is_running: bool,
        uptime_seconds: u64,
        active_connections: usize,
        total_requests: u64,
        avg_response_time_ms: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_error: Option<String>,
    },
    /// Tool availability changed.
    #[serde(rename = "mcp:tools")]
    ToolsChanged { tools: Vec<String> },
}

/// Best-effort broadcast emitter.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<UiEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Send errors (no subscribers) are ignored.
    pub fn emit(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    /// Convenience for the most frequent event.
    pub fn file_indexed(&self, project_id: &str, file_path: &str) {
        self.emit(UiEvent::FileIndexed {
            project_id: project_id.to_string(),
            file_path: file_path.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        });
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let emitter = EventEmitter::new();
        // Must not panic or block
        emitter.file_indexed("proj", "src/main.rs");
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();

        emitter.file_indexed("proj", "src/main.rs");

        match rx.recv().await.unwrap() {
            UiEvent::FileIndexed {
                project_id,
                file_path,
                ..
            } => {
                assert_eq!(project_id, "proj");
                assert_eq!(file_path, "src/main.rs");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serialization_tags() {
        let event = UiEvent::FileIndexed {
            project_id: "p".into(),
            file_path: "f".into(),
            timestamp: 0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("project:fileIndexed"));
    }
}
