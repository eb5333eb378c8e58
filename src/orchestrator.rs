//! Batch orchestrator
//!
//! Walks a job scene by scene: load the scene, hand its batches to the
//! execution engine, record how it went. A scene that cannot be loaded is
//! marked fatal and the job moves on to the next one.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::detector::PollPolicy;
use crate::engine::{ExecutionEngine, UnitFailure};
use crate::host::SceneHost;
use crate::job::{CacheUnitRef, JobDescriptor, SceneJob};
use crate::logging::status;
use crate::progress::{ProgressEvent, ProgressSink};

/// Settings threaded into every run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub poll: PollPolicy,
    pub max_parallel_units: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            max_parallel_units: num_cpus::get(),
        }
    }
}

/// How one scene ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneStatus {
    Success,
    PartialFailure(Vec<UnitFailure>),
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneResult {
    pub scene_path: String,
    pub status: SceneStatus,
}

impl SceneResult {
    /// Units that did not complete in this scene
    pub fn failed_units(&self) -> Vec<CacheUnitRef> {
        match &self.status {
            SceneStatus::PartialFailure(failures) => {
                failures.iter().map(|f| f.unit_ref.clone()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Per-scene results, in job order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobResult {
    pub scenes: Vec<SceneResult>,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.scenes
            .iter()
            .all(|s| matches!(s.status, SceneStatus::Success))
    }

    pub fn has_fatal(&self) -> bool {
        self.scenes
            .iter()
            .any(|s| matches!(s.status, SceneStatus::Fatal(_)))
    }

    /// 0 when everything cached, 1 when only units failed, 2 when a scene was fatal
    pub fn exit_code(&self) -> i32 {
        if self.has_fatal() {
            2
        } else if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Final report listing what failed, grouped by scene
    pub fn summary(&self) -> String {
        let ok = self
            .scenes
            .iter()
            .filter(|s| matches!(s.status, SceneStatus::Success))
            .count();

        let mut out = format!(
            "{} scene(s): {} succeeded, {} with failures\n",
            self.scenes.len(),
            ok,
            self.scenes.len() - ok
        );

        for scene in &self.scenes {
            match &scene.status {
                SceneStatus::Success => {}
                SceneStatus::Fatal(reason) => {
                    let _ = writeln!(out, "  {}: FATAL: {}", scene.scene_path, reason);
                }
                SceneStatus::PartialFailure(failures) => {
                    let _ = writeln!(
                        out,
                        "  {}: {} unit(s) failed",
                        scene.scene_path,
                        failures.len()
                    );
                    for failure in failures {
                        let _ = writeln!(out, "    {}: {}", failure.unit_ref, failure.reason);
                    }
                }
            }
        }

        out
    }
}

/// Runs a whole job against one scene host
pub struct BatchOrchestrator {
    host: Arc<dyn SceneHost>,
    engine: ExecutionEngine,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(
        host: Arc<dyn SceneHost>,
        config: OrchestratorConfig,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Self {
        let engine = ExecutionEngine::new(
            Arc::clone(&host),
            config.poll,
            config.max_parallel_units,
            Arc::clone(&sink),
            cancel.clone(),
        );
        Self {
            host,
            engine,
            sink,
            cancel,
        }
    }

    /// Run every scene of the job in order
    pub async fn run(&self, job: &JobDescriptor) -> JobResult {
        let mut result = JobResult::default();

        for scene in job.scenes() {
            let status = if self.cancel.is_cancelled() {
                warn!(scene = %scene.scene_path, "Skipping scene after cancellation");
                SceneStatus::Fatal("cancelled".to_string())
            } else {
                self.run_scene(scene).await
            };

            result.scenes.push(SceneResult {
                scene_path: scene.scene_path.clone(),
                status,
            });
        }

        result
    }

    async fn run_scene(&self, scene: &SceneJob) -> SceneStatus {
        let path = scene.scene_path.as_str();
        self.sink.report(ProgressEvent::SceneLoading {
            scene: path.to_string(),
        });

        if let Err(reason) = self.load(path).await {
            error!(scene = %path, status = status::FATAL, "Scene failed: {}", reason);
            self.sink.report(ProgressEvent::SceneFailed {
                scene: path.to_string(),
                error: reason.clone(),
            });
            return SceneStatus::Fatal(reason);
        }

        info!(scene = %path, batches = scene.batches.len(), "Scene loaded");
        let outcome = self.engine.run_scene(scene).await;

        self.sink.report(ProgressEvent::SceneFinished {
            scene: path.to_string(),
            failed_units: outcome.failures.len(),
        });

        if outcome.failures.is_empty() {
            SceneStatus::Success
        } else {
            SceneStatus::PartialFailure(outcome.failures)
        }
    }

    async fn load(&self, path: &str) -> Result<(), String> {
        match tokio::fs::metadata(Path::new(path)).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(format!("scene path is not a file: {}", path)),
            Err(e) => return Err(format!("scene file not found: {} ({})", path, e)),
        }

        self.host.load(path).await.map_err(|e| e.to_string())
    }
}
