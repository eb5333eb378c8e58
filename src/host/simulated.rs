/// In-process scene host that fakes cache writes
///
/// Triggering a unit spawns a task that writes its frame files one by one,
/// each first as an empty file and then with content, the way a real cache
/// writer leaves partial files behind while it works.
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{NodeParameters, SceneHost};
use crate::error::HostError;
use crate::job::CacheUnitRef;
use crate::probe::CacheUnitState;

/// A cache node known to the simulated host
#[derive(Debug, Clone)]
pub struct SimulatedUnit {
    pub parameters: NodeParameters,
    pub frame_delay: Duration,
    pub fail_trigger: bool,
    /// Stop after this many frames (simulates a stuck writer)
    pub frame_limit: Option<u64>,
}

impl SimulatedUnit {
    pub fn new(output_template: impl Into<String>, file_type: i64, start: i64, end: i64) -> Self {
        Self {
            parameters: NodeParameters {
                output_template: output_template.into(),
                file_type,
                start_frame: start,
                end_frame: end,
            },
            frame_delay: Duration::from_millis(5),
            fail_trigger: false,
            frame_limit: None,
        }
    }

    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn failing_trigger(mut self) -> Self {
        self.fail_trigger = true;
        self
    }

    pub fn writing_only(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }
}

/// When a unit was triggered
#[derive(Debug, Clone)]
pub struct TriggerRecord {
    pub scene: String,
    pub unit: CacheUnitRef,
    pub at: Instant,
}

#[derive(Default)]
struct SimState {
    current_scene: Option<String>,
    loaded: Vec<String>,
    triggers: Vec<TriggerRecord>,
    finished: HashMap<CacheUnitRef, Instant>,
}

/// Scene host double used by tests and dry runs
#[derive(Default)]
pub struct SimulatedHost {
    units: HashMap<(String, CacheUnitRef), SimulatedUnit>,
    failing_scenes: HashSet<String>,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache node inside a scene
    pub fn with_unit(mut self, scene: &str, unit: &str, node: SimulatedUnit) -> Self {
        self.units
            .insert((scene.to_string(), CacheUnitRef::new(unit)), node);
        self
    }

    /// Make loading this scene fail
    pub fn with_failing_scene(mut self, scene: &str) -> Self {
        self.failing_scenes.insert(scene.to_string());
        self
    }

    /// Scenes loaded so far, in order
    pub fn loaded_scenes(&self) -> Vec<String> {
        self.lock().loaded.clone()
    }

    /// Accepted triggers, in the order they arrived
    pub fn triggers(&self) -> Vec<TriggerRecord> {
        self.lock().triggers.clone()
    }

    /// When the simulated writer for `unit` wrote its last frame
    pub fn finished_at(&self, unit: &str) -> Option<Instant> {
        self.lock().finished.get(&CacheUnitRef::new(unit)).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup(&self, unit: &CacheUnitRef) -> Result<(String, Option<&SimulatedUnit>), HostError> {
        let scene = self
            .lock()
            .current_scene
            .clone()
            .ok_or(HostError::NoSceneLoaded)?;
        let node = self.units.get(&(scene.clone(), unit.clone()));
        Ok((scene, node))
    }
}

#[async_trait]
impl SceneHost for SimulatedHost {
    async fn load(&self, scene_path: &str) -> Result<(), HostError> {
        let mut state = self.lock();
        state.loaded.push(scene_path.to_string());

        if self.failing_scenes.contains(scene_path) {
            state.current_scene = None;
            return Err(HostError::LoadFailed(format!(
                "simulated load failure: {}",
                scene_path
            )));
        }

        state.current_scene = Some(scene_path.to_string());
        Ok(())
    }

    async fn probe(&self, unit: &CacheUnitRef) -> Result<Option<NodeParameters>, HostError> {
        let (_, node) = self.lookup(unit)?;
        Ok(node.map(|s| s.parameters.clone()))
    }

    async fn trigger(&self, unit: &CacheUnitRef) -> Result<(), HostError> {
        let (scene, node) = self.lookup(unit)?;
        let node = node
            .cloned()
            .ok_or_else(|| HostError::TriggerFailed(format!("no such node: {}", unit)))?;

        if node.fail_trigger {
            return Err(HostError::TriggerFailed(format!(
                "simulated trigger failure: {}",
                unit
            )));
        }

        let cache = CacheUnitState::from_parameters(unit.clone(), &node.parameters)
            .map_err(|e| HostError::TriggerFailed(e.to_string()))?;

        self.lock().triggers.push(TriggerRecord {
            scene,
            unit: unit.clone(),
            at: Instant::now(),
        });

        let state = Arc::clone(&self.state);
        let unit = unit.clone();
        tokio::spawn(async move {
            let limit = node.frame_limit.unwrap_or(u64::MAX);
            let mut last_write = Instant::now();
            for (written, frame) in (cache.start_frame..=cache.end_frame).enumerate() {
                if written as u64 >= limit {
                    return;
                }
                tokio::time::sleep(node.frame_delay / 2).await;
                let path = cache.frame_path(frame);
                if let Some(parent) = path.parent() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
                let _ = tokio::fs::write(&path, b"").await;
                tokio::time::sleep(node.frame_delay / 2).await;
                let _ = tokio::fs::write(&path, format!("frame {}", frame)).await;
                last_write = Instant::now();
            }
            debug!(unit = %unit, "Simulated writer finished");
            state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .finished
                .insert(unit, last_write);
        });

        Ok(())
    }
}
