// Library interface for batchcache
// The binary and the integration tests both go through these modules

pub mod cli;
pub mod cli_utils;
pub mod commands;
pub mod config;
pub mod config_discovery;
pub mod detector;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod host;
pub mod job;
pub mod logging;
pub mod merger;
pub mod orchestrator;
pub mod probe;
pub mod progress;

// Re-export commonly used types
pub use detector::PollPolicy;
pub use engine::{BatchResult, ExecutionEngine, UnitFailure};
pub use error::{HostError, UnitFailureReason};
pub use host::{HythonHost, HythonHostConfig, SceneHost, SimulatedHost, SimulatedUnit};
pub use job::{parse, serialize, Batch, CacheUnitRef, ExecutionMode, JobDescriptor};
pub use orchestrator::{BatchOrchestrator, JobResult, OrchestratorConfig, SceneResult, SceneStatus};
pub use progress::{ConsoleReporter, ProgressEvent, ProgressSink, RecordingSink};
