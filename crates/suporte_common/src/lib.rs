//! Suporte Common - shared engine for the helpdesk assistant
//!
//! Hosts the orchestration core: intent routing, the Ollama client, the
//! remediation script executor, the spreadsheet unlock pipeline and the
//! file-server connectivity prober. Presentation layers (suportectl today)
//! consume these modules through immutable result values and typed event
//! channels only; no module here ever touches presentation state.

pub mod config;
pub mod events;
pub mod executor;
pub mod ollama;
pub mod probe;
pub mod repair;
pub mod router;
pub mod session;
pub mod tools;

pub use config::Config;
pub use events::{EngineEvent, EventKind, EventSender};
pub use executor::{ExecError, ScriptExecutor, ToolRunResult};
pub use ollama::{ChatTurn, OllamaClient, OllamaConfig, OllamaError, TextGen};
pub use probe::ServerStatus;
pub use repair::{RepairPipeline, RepairResult, StepOutcome};
pub use router::Classification;
pub use session::Session;
pub use tools::Tool;
