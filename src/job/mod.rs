//! Job descriptors: which scenes to open and which cache units to write
//!
//! A job is a list of scenes; each scene holds its batches in execution order.
//! The interchange format lives in [`interchange`].

pub mod interchange;

pub use interchange::{load_job_file, parse, serialize, ParseReport, RowIssue};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RowError;

/// How the units of a batch are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One unit at a time, in file order
    Sequential,
    /// All units triggered together, joined before the batch ends
    Parallel,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = RowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            _ => Err(RowError::UnrecognizedMode(s.trim().to_string())),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path of a cache node inside the scene's node graph (e.g. `/obj/sim/filecache1`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheUnitRef(String);

impl CacheUnitRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheUnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheUnitRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A group of units sharing one execution mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub mode: ExecutionMode,
    pub units: Vec<CacheUnitRef>,
}

impl Batch {
    pub fn new(mode: ExecutionMode, units: Vec<CacheUnitRef>) -> Self {
        Self { mode, units }
    }
}

/// All batches for one scene file, in execution order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneJob {
    pub scene_path: String,
    pub batches: Vec<Batch>,
}

impl SceneJob {
    pub fn unit_count(&self) -> usize {
        self.batches.iter().map(|b| b.units.len()).sum()
    }
}

/// Ordered list of scenes; each scene path appears once
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    scenes: Vec<SceneJob>,
}

impl JobDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch to the scene's batch list, creating the scene on first use
    pub fn push_batch(&mut self, scene_path: &str, batch: Batch) {
        match self.scenes.iter_mut().find(|s| s.scene_path == scene_path) {
            Some(scene) => scene.batches.push(batch),
            None => self.scenes.push(SceneJob {
                scene_path: scene_path.to_string(),
                batches: vec![batch],
            }),
        }
    }

    pub fn scenes(&self) -> &[SceneJob] {
        &self.scenes
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn batch_count(&self) -> usize {
        self.scenes.iter().map(|s| s.batches.len()).sum()
    }

    /// Total number of cache units referenced by the job
    pub fn unit_count(&self) -> usize {
        self.scenes.iter().map(SceneJob::unit_count).sum()
    }
}
