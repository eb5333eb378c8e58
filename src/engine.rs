//! Execution engine
//!
//! Runs the batches of an already-loaded scene. A unit goes through
//! probe, trigger and completion wait; whatever goes wrong is recorded against
//! that unit and the batch carries on.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::detector::{self, PollPolicy};
use crate::error::{HostError, UnitFailureReason};
use crate::host::SceneHost;
use crate::job::{Batch, CacheUnitRef, ExecutionMode, SceneJob};
use crate::probe;
use crate::progress::{ProgressEvent, ProgressSink};

/// A cache unit that did not complete, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub unit_ref: CacheUnitRef,
    pub reason: UnitFailureReason,
}

/// Outcome of one or more batches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub completed: Vec<CacheUnitRef>,
    pub failures: Vec<UnitFailure>,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn extend(&mut self, other: BatchResult) {
        self.completed.extend(other.completed);
        self.failures.extend(other.failures);
    }
}

/// Drives cache units against a scene host
#[derive(Clone)]
pub struct ExecutionEngine {
    host: Arc<dyn SceneHost>,
    policy: PollPolicy,
    max_parallel_units: usize,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl ExecutionEngine {
    pub fn new(
        host: Arc<dyn SceneHost>,
        policy: PollPolicy,
        max_parallel_units: usize,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            host,
            policy,
            max_parallel_units: max_parallel_units.max(1),
            sink,
            cancel,
        }
    }

    /// Run every batch of a loaded scene, in order
    pub async fn run_scene(&self, scene: &SceneJob) -> BatchResult {
        let mut result = BatchResult::default();
        for batch in &scene.batches {
            result.extend(self.run_batch(&scene.scene_path, batch).await);
        }
        result
    }

    /// Run one batch of the currently loaded scene
    pub async fn run_batch(&self, scene: &str, batch: &Batch) -> BatchResult {
        info!(
            scene = %scene,
            mode = %batch.mode,
            units = batch.units.len(),
            "Starting batch"
        );
        self.sink.report(ProgressEvent::BatchStarted {
            scene: scene.to_string(),
            mode: batch.mode,
            units: batch.units.len(),
        });

        match batch.mode {
            ExecutionMode::Sequential => self.run_sequential(&batch.units).await,
            ExecutionMode::Parallel => self.run_parallel(&batch.units).await,
        }
    }

    async fn run_sequential(&self, units: &[CacheUnitRef]) -> BatchResult {
        let mut result = BatchResult::default();
        for unit in units {
            let outcome = self.run_unit(unit, ExecutionMode::Sequential).await;
            self.record(&mut result, unit, outcome);
        }
        result
    }

    async fn run_parallel(&self, units: &[CacheUnitRef]) -> BatchResult {
        let permits = Arc::new(Semaphore::new(self.max_parallel_units));
        let mut workers = JoinSet::new();

        for (index, unit) in units.iter().cloned().enumerate() {
            let engine = self.clone();
            let permits = Arc::clone(&permits);
            workers.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => engine.run_unit(&unit, ExecutionMode::Parallel).await,
                    Err(_) => Err(UnitFailureReason::Cancelled),
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<Duration, UnitFailureReason>>> =
            vec![None; units.len()];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => error!("Cache worker failed: {}", e),
            }
        }

        let mut result = BatchResult::default();
        for (unit, outcome) in units.iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| {
                Err(UnitFailureReason::TriggerFailed(
                    "cache worker aborted".to_string(),
                ))
            });
            self.record(&mut result, unit, outcome);
        }
        result
    }

    async fn run_unit(
        &self,
        unit: &CacheUnitRef,
        mode: ExecutionMode,
    ) -> Result<Duration, UnitFailureReason> {
        if self.cancel.is_cancelled() {
            return Err(UnitFailureReason::Cancelled);
        }

        let state = probe::probe(self.host.as_ref(), unit).await?;
        debug!(
            unit = %unit,
            prefix = %state.output_prefix,
            start = state.start_frame,
            end = state.end_frame,
            "Probed cache unit"
        );

        if self.cancel.is_cancelled() {
            return Err(UnitFailureReason::Cancelled);
        }

        self.host.trigger(unit).await.map_err(trigger_failure)?;
        self.sink.report(ProgressEvent::UnitTriggered {
            unit: unit.clone(),
            mode,
            start_frame: state.start_frame,
            end_frame: state.end_frame,
        });

        detector::wait_for_completion(&state, &self.policy, &self.cancel, self.sink.as_ref())
            .await
    }

    fn record(
        &self,
        result: &mut BatchResult,
        unit: &CacheUnitRef,
        outcome: Result<Duration, UnitFailureReason>,
    ) {
        match outcome {
            Ok(elapsed) => {
                self.sink.report(ProgressEvent::UnitCompleted {
                    unit: unit.clone(),
                    elapsed,
                });
                result.completed.push(unit.clone());
            }
            Err(reason) => {
                self.sink.report(ProgressEvent::UnitFailed {
                    unit: unit.clone(),
                    reason: reason.clone(),
                });
                result.failures.push(UnitFailure {
                    unit_ref: unit.clone(),
                    reason,
                });
            }
        }
    }
}

fn trigger_failure(err: HostError) -> UnitFailureReason {
    match err {
        HostError::TriggerFailed(message) => UnitFailureReason::TriggerFailed(message),
        other => UnitFailureReason::TriggerFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{SimulatedHost, SimulatedUnit};
    use crate::progress::RecordingSink;
    use tempfile::TempDir;

    fn policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(5),
            stall_timeout: Some(Duration::from_secs(5)),
            max_wait: Some(Duration::from_secs(20)),
        }
    }

    fn template(dir: &TempDir, name: &str) -> String {
        dir.path()
            .join(format!("{}.0001.bgeo.sc", name))
            .to_string_lossy()
            .to_string()
    }

    fn engine(host: Arc<SimulatedHost>, sink: Arc<RecordingSink>, workers: usize) -> ExecutionEngine {
        ExecutionEngine::new(host, policy(), workers, sink, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_sequential_batch_records_missing_unit_and_continues() {
        let temp = TempDir::new().unwrap();
        let host = Arc::new(
            SimulatedHost::new()
                .with_unit("s.hip", "/obj/a", SimulatedUnit::new(template(&temp, "a"), 0, 1, 3))
                .with_unit("s.hip", "/obj/c", SimulatedUnit::new(template(&temp, "c"), 0, 1, 2)),
        );
        host.load("s.hip").await.unwrap();
        let sink = Arc::new(RecordingSink::new());

        let batch = Batch::new(
            ExecutionMode::Sequential,
            vec!["/obj/a".into(), "/obj/b".into(), "/obj/c".into()],
        );
        let result = engine(host.clone(), sink, 4).run_batch("s.hip", &batch).await;

        assert_eq!(
            result.completed,
            vec![CacheUnitRef::new("/obj/a"), CacheUnitRef::new("/obj/c")]
        );
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].unit_ref, CacheUnitRef::new("/obj/b"));
        assert_eq!(result.failures[0].reason.label(), "not_found");

        let triggered: Vec<_> = host.triggers().into_iter().map(|t| t.unit).collect();
        assert_eq!(
            triggered,
            vec![CacheUnitRef::new("/obj/a"), CacheUnitRef::new("/obj/c")]
        );
    }

    #[tokio::test]
    async fn test_trigger_failure_is_isolated_in_parallel_batch() {
        let temp = TempDir::new().unwrap();
        let host = Arc::new(
            SimulatedHost::new()
                .with_unit("s.hip", "/obj/a", SimulatedUnit::new(template(&temp, "a"), 0, 1, 4))
                .with_unit(
                    "s.hip",
                    "/obj/b",
                    SimulatedUnit::new(template(&temp, "b"), 0, 1, 4).failing_trigger(),
                )
                .with_unit("s.hip", "/obj/c", SimulatedUnit::new(template(&temp, "c"), 0, 1, 4)),
        );
        host.load("s.hip").await.unwrap();
        let sink = Arc::new(RecordingSink::new());

        let batch = Batch::new(
            ExecutionMode::Parallel,
            vec!["/obj/a".into(), "/obj/b".into(), "/obj/c".into()],
        );
        let result = engine(host, sink, 4).run_batch("s.hip", &batch).await;

        assert_eq!(result.completed.len(), 2);
        assert_eq!(result.failures.len(), 1);
        assert!(matches!(
            result.failures[0].reason,
            UnitFailureReason::TriggerFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_bounded_pool_still_runs_every_unit() {
        let temp = TempDir::new().unwrap();
        let mut host = SimulatedHost::new();
        let mut units = Vec::new();
        for i in 0..5 {
            let unit = format!("/obj/u{}", i);
            host = host.with_unit(
                "s.hip",
                &unit,
                SimulatedUnit::new(template(&temp, &format!("u{}", i)), 0, 1, 2),
            );
            units.push(CacheUnitRef::new(unit));
        }
        let host = Arc::new(host);
        host.load("s.hip").await.unwrap();
        let sink = Arc::new(RecordingSink::new());

        let batch = Batch::new(ExecutionMode::Parallel, units.clone());
        let result = engine(host, sink, 2).run_batch("s.hip", &batch).await;

        assert!(result.is_success());
        assert_eq!(result.completed, units);
    }

    #[tokio::test]
    async fn test_no_triggers_after_cancellation() {
        let temp = TempDir::new().unwrap();
        let host = Arc::new(
            SimulatedHost::new()
                .with_unit("s.hip", "/obj/a", SimulatedUnit::new(template(&temp, "a"), 0, 1, 2)),
        );
        host.load("s.hip").await.unwrap();
        let sink = Arc::new(RecordingSink::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let engine = ExecutionEngine::new(host.clone(), policy(), 2, sink, cancel);
        let batch = Batch::new(ExecutionMode::Sequential, vec!["/obj/a".into()]);
        let result = engine.run_batch("s.hip", &batch).await;

        assert!(host.triggers().is_empty());
        assert_eq!(result.failures[0].reason, UnitFailureReason::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_leaves_queued_units_untriggered() {
        let temp = TempDir::new().unwrap();
        let mut host = SimulatedHost::new();
        let mut units = Vec::new();
        for i in 0..4 {
            let name = format!("slow{}", i);
            let unit = format!("/obj/{}", name);
            host = host.with_unit(
                "s.hip",
                &unit,
                SimulatedUnit::new(template(&temp, &name), 0, 1, 20)
                    .with_frame_delay(Duration::from_millis(200)),
            );
            units.push(CacheUnitRef::new(unit));
        }
        let host = Arc::new(host);
        host.load("s.hip").await.unwrap();
        let cancel = CancellationToken::new();
        let engine = ExecutionEngine::new(
            host.clone(),
            policy(),
            2,
            Arc::new(RecordingSink::new()),
            cancel.clone(),
        );

        let interrupt = {
            let host = host.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                while host.triggers().len() < 2 {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                cancel.cancel();
            })
        };

        let batch = Batch::new(ExecutionMode::Parallel, units.clone());
        let result = engine.run_batch("s.hip", &batch).await;
        interrupt.await.unwrap();

        // Units queued behind the two permits were never triggered
        let triggered = host.triggers();
        assert_eq!(triggered.len(), 2);
        assert!(result.completed.is_empty());
        assert_eq!(result.failures.len(), 4);
        assert!(result
            .failures
            .iter()
            .all(|f| f.reason == UnitFailureReason::Cancelled));
        let failed: Vec<_> = result.failures.iter().map(|f| f.unit_ref.clone()).collect();
        assert_eq!(failed, units);

        // Caches already triggered keep writing after the run stops waiting
        let last_frame = temp
            .path()
            .join(format!(
                "{}.0005.bgeo.sc",
                triggered[0].unit.as_str().trim_start_matches("/obj/")
            ));
        let mut waited = Duration::ZERO;
        while !last_frame.exists() && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += Duration::from_millis(50);
        }
        assert!(last_frame.exists());
        assert_eq!(host.triggers().len(), 2);
    }
}
