//! Scene hosts: the external application that owns the loaded scene
//!
//! The engine only talks to a host through [`SceneHost`]. Triggering a cache
//! unit is fire-and-forget; whether it finished is decided on disk by the
//! completion detector, never by the host's return value.

pub mod hython;
pub mod simulated;

pub use hython::{HythonHost, HythonHostConfig};
pub use simulated::{SimulatedHost, SimulatedUnit, TriggerRecord};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::job::CacheUnitRef;

/// Raw parameters read from a cache node
///
/// `output_template` is the output path evaluated at the current frame, so it
/// ends with a four digit frame number followed by the extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeParameters {
    pub output_template: String,
    pub file_type: i64,
    pub start_frame: i64,
    pub end_frame: i64,
}

/// Capability interface to the external application
#[async_trait]
pub trait SceneHost: Send + Sync {
    /// Load a scene, replacing whatever was loaded before
    async fn load(&self, scene_path: &str) -> Result<(), HostError>;

    /// Read a cache node's parameters; `None` when the node (or one of its
    /// parameters) does not exist in the loaded scene
    async fn probe(&self, unit: &CacheUnitRef) -> Result<Option<NodeParameters>, HostError>;

    /// Start writing a cache unit. Returns once the request was accepted.
    async fn trigger(&self, unit: &CacheUnitRef) -> Result<(), HostError>;
}
