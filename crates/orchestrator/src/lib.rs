//! Restaurant analysis pipeline.
//!
//! [`PipelineOrchestrator`] runs a session through sixteen ordered stages,
//! checkpointing after each one so an interrupted or failed run resumes
//! after its last successful stage. Stages whose inputs were not provided
//! are skipped and recorded as such. Progress is pushed through
//! [`events::ProgressBroadcaster`] or pulled with [`StatusPoller`].

pub mod analyzers;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod stage;
pub mod stages;
pub mod status;
pub mod trace;

pub use analyzers::Analyzers;
pub use config::PipelineConfig;
pub use error::{AnalyzerError, PipelineError, Result, StageError};
pub use pipeline::{PipelineOrchestrator, PipelineReport, SessionListEntry};
pub use registry::{InMemoryRegistry, SessionRegistry};
pub use stage::{Requirement, StageContext, StageHandler};
pub use status::{StageStatus, StatusPoller, StatusView, DEFAULT_POLL_INTERVAL};
pub use trace::ThoughtTraceRecorder;
