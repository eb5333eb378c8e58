//! Completion detection
//!
//! A triggered cache unit gives no signal when it is done. Completion is read
//! from disk instead: a frame counts once its file exists and is non-empty.
//! The count is recomputed from scratch on every poll, so files that appear
//! out of order, are rewritten, or are briefly truncated by a writer are all
//! handled by simply polling again.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::UnitFailureReason;
use crate::probe::CacheUnitState;
use crate::progress::{ProgressEvent, ProgressSink};

/// Polling cadence and give-up rules for one cache unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two polls
    pub interval: Duration,
    /// Give up when the frame count has not changed for this long
    pub stall_timeout: Option<Duration>,
    /// Give up after this long regardless of progress
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            stall_timeout: Some(Duration::from_secs(30 * 60)),
            max_wait: None,
        }
    }
}

/// Count frames in the unit's range whose file exists and is non-empty
pub fn count_completed_frames(state: &CacheUnitState) -> u64 {
    (state.start_frame..=state.end_frame)
        .filter(|frame| frame_is_complete(&state.frame_path(*frame)))
        .count() as u64
}

fn frame_is_complete(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Poll until every frame of the unit is on disk
///
/// Progress is reported only when the count differs from the previous poll.
/// Returns the time spent waiting.
pub async fn wait_for_completion(
    state: &CacheUnitState,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    sink: &dyn ProgressSink,
) -> Result<Duration, UnitFailureReason> {
    let total = state.total_frames();
    let started = Instant::now();
    let mut last_change = started;
    let mut previous: Option<u64> = None;

    loop {
        let snapshot = state.clone();
        let done = match tokio::task::spawn_blocking(move || count_completed_frames(&snapshot)).await
        {
            Ok(done) => done,
            Err(e) => {
                warn!(unit = %state.unit_ref, "Frame scan failed: {}", e);
                previous.unwrap_or(0)
            }
        };

        if previous != Some(done) {
            sink.report(ProgressEvent::UnitProgress {
                unit: state.unit_ref.clone(),
                done,
                total,
            });
            previous = Some(done);
            last_change = Instant::now();
        }

        if done >= total {
            return Ok(started.elapsed());
        }

        if let Some(limit) = policy.stall_timeout {
            if last_change.elapsed() >= limit {
                debug!(unit = %state.unit_ref, "No new frames for {:?}", limit);
                return Err(UnitFailureReason::TimedOut {
                    frames_done: done,
                    frames_total: total,
                });
            }
        }

        if let Some(limit) = policy.max_wait {
            if started.elapsed() >= limit {
                debug!(unit = %state.unit_ref, "Gave up after {:?}", limit);
                return Err(UnitFailureReason::TimedOut {
                    frames_done: done,
                    frames_total: total,
                });
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(UnitFailureReason::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}
