//! Typed events emitted by the engine toward presentation layers.
//!
//! ```text
//! +----------------+     +--------------+     +---------------------+
//! | engine modules | --> | mpsc channel | --> | suportectl display  |
//! | (emit)         |     | (EngineEvent)|     | (renders)           |
//! +----------------+     +--------------+     +---------------------+
//! ```
//!
//! The engine only ever hands off immutable values over the channel; it
//! never mutates presentation state. A dropped receiver simply discards
//! events, which keeps long-running operations independent of the UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::executor::ToolRunResult;
use crate::probe::ServerStatus;
use crate::repair::RepairResult;
use crate::tools::Tool;

/// Kind of event in the remediation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventKind {
    /// Human-readable pipeline log line
    Log { line: String },
    /// Fraction of the current operation completed, 0.0..=1.0
    Progress { fraction: f64 },
    /// Spreadsheet unlock pipeline finished
    RepairFinished { result: RepairResult },
    /// External remediation script finished
    ToolFinished { tool: Tool, result: ToolRunResult },
    /// File-server connectivity status changed
    Server { status: ServerStatus },
}

/// A single timestamped engine event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// When this event occurred
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub kind: EventKind,
}

impl EngineEvent {
    /// Create a new event with the current timestamp.
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Format as a display line for a console renderer.
    pub fn to_display_line(&self) -> String {
        let stamp = self.timestamp.format("%H:%M:%S");
        let body = match &self.kind {
            EventKind::Log { line } => line.clone(),
            EventKind::Progress { fraction } => {
                format!("progresso: {}%", (fraction * 100.0).round() as u32)
            }
            EventKind::RepairFinished { result } => result.summary.clone(),
            EventKind::ToolFinished { tool, result } => {
                format!("{} finalizado (código {})", tool, result.exit_code)
            }
            EventKind::Server { status } => format!("servidor: {}", status),
        };
        format!("[{stamp}] {body}")
    }
}

/// Sender half handed to engine operations.
///
/// Sends never fail from the caller's point of view: if the presentation
/// side went away the event is dropped.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSender {
    /// Create a connected sender/receiver pair.
    pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender { tx }, rx)
    }

    /// A sender with no receiver, for callers that do not render events.
    pub fn discard() -> EventSender {
        let (tx, _rx) = mpsc::unbounded_channel();
        EventSender { tx }
    }

    /// Emit an event, stamping it with the current time.
    pub fn emit(&self, kind: EventKind) {
        let _ = self.tx.send(EngineEvent::new(kind));
    }

    /// Emit a log line.
    pub fn log(&self, line: impl Into<String>) {
        self.emit(EventKind::Log { line: line.into() });
    }

    /// Emit a progress checkpoint.
    pub fn progress(&self, fraction: f64) {
        self.emit(EventKind::Progress { fraction });
    }
}
