//! Off-thread analysis runs with last-submission-wins semantics.
//!
//! Every `submit` bumps a monotonically increasing run id. A worker only
//! publishes its outcome while its id is still the latest, so a slow run for
//! an old buffer can never overwrite the result of a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use super::model::AnalysisResult;
use super::pipeline::{AnalysisParams, CancelToken, Pipeline};
use crate::audio::decode::SampleBuffer;
use crate::audio::pitch::PitchExtractor;
use crate::error::{AnalysisError, ErrorReport};

pub type RunId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Idle,
    Pending(RunId),
    Ready(RunId, Arc<AnalysisResult>),
    Failed(RunId, ErrorReport),
}

impl RunStatus {
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            RunStatus::Idle => None,
            RunStatus::Pending(id) | RunStatus::Ready(id, _) | RunStatus::Failed(id, _) => Some(*id),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RunStatus::Pending(_))
    }

    pub fn result(&self) -> Option<&Arc<AnalysisResult>> {
        match self {
            RunStatus::Ready(_, result) => Some(result),
            _ => None,
        }
    }
}

struct Shared {
    status: Mutex<RunStatus>,
    changed: Condvar,
}

pub struct Session {
    extractor: Arc<dyn PitchExtractor>,
    params: AnalysisParams,
    latest: Arc<AtomicU64>,
    shared: Arc<Shared>,
}

impl Session {
    pub fn new(extractor: Arc<dyn PitchExtractor>, params: AnalysisParams) -> Self {
        Self {
            extractor,
            params,
            latest: Arc::new(AtomicU64::new(0)),
            shared: Arc::new(Shared {
                status: Mutex::new(RunStatus::Idle),
                changed: Condvar::new(),
            }),
        }
    }

    /// Start analyzing `buffer` on a worker thread. Any run still in flight
    /// is superseded and its outcome discarded.
    pub fn submit(&self, buffer: SampleBuffer) -> RunId {
        let run = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        self.publish(run, RunStatus::Pending(run));

        let extractor = Arc::clone(&self.extractor);
        let params = self.params.clone();
        let cancel = CancelToken::new(Arc::clone(&self.latest), run);
        let latest = Arc::clone(&self.latest);
        let shared = Arc::clone(&self.shared);

        thread::spawn(move || {
            let mut pipeline = Pipeline::new(extractor.as_ref(), params);
            let status = match pipeline.run(buffer, &cancel) {
                Ok(result) => RunStatus::Ready(run, result),
                Err(AnalysisError::Cancelled) => {
                    log::debug!("Run {} superseded; dropping it", run);
                    return;
                }
                Err(err) => RunStatus::Failed(run, err.report()),
            };
            publish_if_latest(&shared, &latest, run, status);
        });

        log::debug!("Submitted analysis run {}", run);
        run
    }

    pub fn status(&self) -> RunStatus {
        lock_status(&self.shared).clone()
    }

    /// Block up to `timeout` for the current run to finish.
    pub fn wait(&self, timeout: Duration) -> RunStatus {
        let guard = lock_status(&self.shared);
        let (guard, _) = self
            .shared
            .changed
            .wait_timeout_while(guard, timeout, |status| status.is_pending())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    fn publish(&self, run: RunId, status: RunStatus) {
        publish_if_latest(&self.shared, &self.latest, run, status);
    }
}

fn lock_status(shared: &Shared) -> std::sync::MutexGuard<'_, RunStatus> {
    shared
        .status
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn publish_if_latest(shared: &Shared, latest: &AtomicU64, run: RunId, status: RunStatus) {
    let mut guard = lock_status(shared);
    // Checked under the lock so a newer submit cannot interleave.
    if latest.load(Ordering::Acquire) != run {
        log::debug!("Discarding outcome of stale run {}", run);
        return;
    }
    *guard = status;
    shared.changed.notify_all();
}
