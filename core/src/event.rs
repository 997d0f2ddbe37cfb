//! Step events of an extension run.
//!
//! Every transition of an extension run publishes one [`ExtendEvent`] naming
//! the step and the object it acted on: a container ID, the staged path, or
//! the donor or extended image name.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Transition of one extension run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "extend.created")]
    Created,
    #[serde(rename = "extend.staged")]
    Staged,
    #[serde(rename = "extend.started")]
    Started,
    #[serde(rename = "extend.exited")]
    Exited,
    #[serde(rename = "extend.committed")]
    Committed,
    #[serde(rename = "extend.grafted")]
    Grafted,
    #[serde(rename = "extend.cleaned")]
    Cleaned,
    #[serde(rename = "extend.failed")]
    Failed,
}

impl EventKind {
    /// Dotted event key, as serialized.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Created => "extend.created",
            Self::Staged => "extend.staged",
            Self::Started => "extend.started",
            Self::Exited => "extend.exited",
            Self::Committed => "extend.committed",
            Self::Grafted => "extend.grafted",
            Self::Cleaned => "extend.cleaned",
            Self::Failed => "extend.failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendEvent {
    pub kind: EventKind,

    /// What the step acted on, or the error message for `Failed`
    pub subject: String,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ExtendEvent {
    pub fn new(kind: EventKind, subject: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Broadcasts step events to any number of subscribers.
#[derive(Clone)]
pub struct EventEmitter {
    sender: Arc<broadcast::Sender<ExtendEvent>>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish `subject` under `kind`. Dropped when nobody is subscribed.
    pub fn emit(&self, kind: EventKind, subject: impl Into<String>) {
        let _ = self.sender.send(ExtendEvent::new(kind, subject));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExtendEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(64)
    }
}
