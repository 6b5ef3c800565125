//! Off-thread computation slot
//!
//! One background thread, one in-flight computation. Both channels are
//! bounded to a single slot so a busy worker exerts back-pressure instead
//! of queueing stale snapshots; the simulation thread never blocks on
//! submit, poll, or stop.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::culling::classify::ThresholdTable;
use crate::culling::compute::{ComputationResult, ComputeEngine};
use crate::culling::snapshot::Snapshot;

/// Simulation-thread view of the in-flight slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No computation in flight; a snapshot may be submitted
    Idle,
    /// A snapshot was submitted and its result has not been taken yet
    Computing,
}

struct Job {
    snapshot: Snapshot,
    table: Arc<ThresholdTable>,
}

/// Handle owned by the simulation thread
pub struct CullWorker {
    job_tx: Option<Sender<Job>>,
    result_rx: Receiver<ComputationResult>,
    state: WorkerState,
}

impl CullWorker {
    /// Spawn the worker thread; the engine (and its strategy) moves onto it
    pub fn spawn(mut engine: ComputeEngine) -> Self {
        let (job_tx, job_rx) = bounded::<Job>(1);
        let (result_tx, result_rx) = bounded::<ComputationResult>(1);

        let spawned = thread::Builder::new()
            .name("cull-worker".to_string())
            .spawn(move || {
                for job in job_rx.iter() {
                    let result = engine.compute(&job.snapshot, &job.table);
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
                tracing::debug!("Cull worker thread exiting");
            });
        if let Err(e) = spawned {
            // Out of threads; the slot stays permanently busy and the
            // service keeps running without culling
            tracing::error!("Failed to spawn cull worker thread: {e}");
            return Self {
                job_tx: None,
                result_rx,
                state: WorkerState::Computing,
            };
        }

        Self {
            job_tx: Some(job_tx),
            result_rx,
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Hand a snapshot to the worker. Returns `false` without blocking when
    /// a computation is already in flight or the worker is gone.
    pub fn submit(&mut self, snapshot: Snapshot, table: Arc<ThresholdTable>) -> bool {
        if self.state != WorkerState::Idle {
            return false;
        }
        let Some(tx) = &self.job_tx else {
            return false;
        };
        match tx.try_send(Job { snapshot, table }) {
            Ok(()) => {
                self.state = WorkerState::Computing;
                true
            }
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Cull worker thread is gone; disabling submissions");
                self.job_tx = None;
                false
            }
        }
    }

    /// Take the finished result if one is waiting; never blocks
    pub fn poll(&mut self) -> Option<ComputationResult> {
        if self.state != WorkerState::Computing {
            return None;
        }
        match self.result_rx.try_recv() {
            Ok(result) => {
                self.state = WorkerState::Idle;
                Some(result)
            }
            Err(_) => None,
        }
    }

    /// Best-effort shutdown: close the job channel and let the thread drain
    /// on its own. Never blocks the simulation thread.
    pub fn stop(&mut self) {
        self.job_tx = None;
    }
}

impl Drop for CullWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
