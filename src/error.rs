//! Error taxonomy for batch caching
//!
//! Errors are grouped by the scope they affect: a row of the job file, a single
//! cache unit, or the whole scene. Nothing here aborts work at a wider scope than
//! the one named by the type.

use thiserror::Error;

use crate::logging::status;

/// Row-level problems found while parsing a job file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("malformed row: expected `scene, mode, unit...` but found {fields} field(s)")]
    MalformedRow { fields: usize },

    #[error("unrecognized execution mode '{0}' (expected sequential or parallel)")]
    UnrecognizedMode(String),

    #[error("unterminated quoted field")]
    UnterminatedQuote,
}

/// Failures reported by a scene host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("scene could not be loaded: {0}")]
    LoadFailed(String),

    #[error("trigger failed: {0}")]
    TriggerFailed(String),

    #[error("no scene is loaded")]
    NoSceneLoaded,

    #[error("host reported an error: {0}")]
    Remote(String),

    #[error("bridge protocol error: {0}")]
    Protocol(String),

    #[error("bridge I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        HostError::Io(err.to_string())
    }
}

/// Failures while probing a cache unit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("cache unit not found: {0}")]
    NotFound(String),

    #[error("output template '{template}' is shorter than the expected '{suffix}' suffix")]
    TemplateTooShort { template: String, suffix: String },

    #[error("invalid frame range {start}..{end}")]
    InvalidFrameRange { start: i64, end: i64 },

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Why a cache unit did not complete
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitFailureReason {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("trigger failed: {0}")]
    TriggerFailed(String),

    #[error("timed out at {frames_done}/{frames_total} frames")]
    TimedOut { frames_done: u64, frames_total: u64 },

    #[error("cancelled")]
    Cancelled,
}

impl UnitFailureReason {
    /// Short machine-friendly label, used as the `status` log field
    pub fn label(&self) -> &'static str {
        match self {
            UnitFailureReason::NotFound(_) => status::NOT_FOUND,
            UnitFailureReason::TriggerFailed(_) => status::TRIGGER_FAILED,
            UnitFailureReason::TimedOut { .. } => status::TIMED_OUT,
            UnitFailureReason::Cancelled => status::CANCELLED,
        }
    }
}

impl From<ProbeError> for UnitFailureReason {
    fn from(err: ProbeError) -> Self {
        UnitFailureReason::NotFound(err.to_string())
    }
}

/// Failures of the scene-probe collaborator
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to run discovery: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("discovery reported an error: {0}")]
    Reported(String),

    #[error("discovery produced malformed output: {0}")]
    MalformedOutput(String),

    #[error("discovery did not finish within {0:?}")]
    TimedOut(std::time::Duration),
}
