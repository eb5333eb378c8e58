//! Progress reporting
//!
//! Every state transition of a run is reported to a [`ProgressSink`]. Sinks are
//! shared by all workers of a parallel batch, so they must accept events from
//! several tasks at once.

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::cli_utils::batchcache_prefix;
use crate::error::UnitFailureReason;
use crate::job::{CacheUnitRef, ExecutionMode};
use crate::logging::status;

/// A state transition worth telling the user about
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    SceneLoading {
        scene: String,
    },
    SceneFailed {
        scene: String,
        error: String,
    },
    SceneFinished {
        scene: String,
        failed_units: usize,
    },
    BatchStarted {
        scene: String,
        mode: ExecutionMode,
        units: usize,
    },
    UnitTriggered {
        unit: CacheUnitRef,
        mode: ExecutionMode,
        start_frame: i64,
        end_frame: i64,
    },
    UnitProgress {
        unit: CacheUnitRef,
        done: u64,
        total: u64,
    },
    UnitCompleted {
        unit: CacheUnitRef,
        elapsed: Duration,
    },
    UnitFailed {
        unit: CacheUnitRef,
        reason: UnitFailureReason,
    },
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Prints one human-readable line per event on stdout
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressSink for ConsoleReporter {
    fn report(&self, event: ProgressEvent) {
        log_event(&event);

        let line = format_event(&event);
        // One write per line keeps lines whole when workers report together
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let _ = writeln!(out, "{} {}", batchcache_prefix(), line);
        let _ = out.flush();
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ProgressSink for RecordingSink {
    fn report(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

/// Render an event the way the console shows it
pub fn format_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::SceneLoading { scene } => format!("Loading scene: {}", scene),
        ProgressEvent::SceneFailed { scene, error } => {
            format!("Scene failed: {} ({})", scene, error)
        }
        ProgressEvent::SceneFinished {
            scene,
            failed_units: 0,
        } => format!("Completed caching for {}", scene),
        ProgressEvent::SceneFinished {
            scene,
            failed_units,
        } => format!(
            "Finished {} with {} failed unit(s)",
            scene, failed_units
        ),
        ProgressEvent::BatchStarted { mode, units, .. } => {
            format!("Starting {} batch of {} unit(s)", mode, units)
        }
        ProgressEvent::UnitTriggered {
            unit,
            mode,
            start_frame,
            end_frame,
        } => format!(
            "Caching ({}): {} [{} -> {}]",
            mode, unit, start_frame, end_frame
        ),
        ProgressEvent::UnitProgress { unit, done, total } => {
            let percent = if *total == 0 { 100 } else { done * 100 / total };
            format!("{}: {}/{} frames ({}%)", unit, done, total, percent)
        }
        ProgressEvent::UnitCompleted { unit, elapsed } => {
            format!("Cached {} in {:.1}s", unit, elapsed.as_secs_f64())
        }
        ProgressEvent::UnitFailed { unit, reason } => format!("Failed {}: {}", unit, reason),
    }
}

fn log_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::UnitProgress { unit, done, total } => debug!(
            unit = %unit,
            frames_done = done,
            frames_total = total,
            "cache progress"
        ),
        ProgressEvent::UnitFailed { unit, reason } => debug!(
            unit = %unit,
            status = reason.label(),
            "cache unit failed"
        ),
        ProgressEvent::UnitCompleted { unit, elapsed } => debug!(
            unit = %unit,
            status = status::SUCCESS,
            elapsed_ms = elapsed.as_millis() as u64,
            "cache unit completed"
        ),
        other => debug!(event = ?other, "progress"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_format_progress_line() {
        let line = format_event(&ProgressEvent::UnitProgress {
            unit: "/obj/a".into(),
            done: 3,
            total: 12,
        });
        assert_eq!(line, "/obj/a: 3/12 frames (25%)");
    }

    #[test]
    fn test_format_scene_finished() {
        let ok = format_event(&ProgressEvent::SceneFinished {
            scene: "a.hip".to_string(),
            failed_units: 0,
        });
        assert_eq!(ok, "Completed caching for a.hip");

        let partial = format_event(&ProgressEvent::SceneFinished {
            scene: "a.hip".to_string(),
            failed_units: 2,
        });
        assert!(partial.contains("2 failed"));
    }

    #[test]
    fn test_recording_sink_accepts_concurrent_reports() {
        let sink = Arc::new(RecordingSink::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for done in 0..50 {
                        sink.report(ProgressEvent::UnitProgress {
                            unit: CacheUnitRef::new(format!("/obj/u{}", i)),
                            done,
                            total: 50,
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sink.events().len(), 400);
    }
}
