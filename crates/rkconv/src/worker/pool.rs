use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use super::progress::JobProgress;
use crate::error::SchedulerError;
use crate::executor::{ConversionExecutor, ConversionRequest};
use crate::job::JobStatus;
use crate::scheduler::dispatch::{Assignment, Wake};
use crate::scheduler::registry::Shared;

/// Fixed set of worker slots, one thread each.
pub struct WorkerPool {
    workers: Vec<(usize, JoinHandle<()>)>,
}

impl WorkerPool {
    pub(crate) fn spawn(
        count: usize,
        shared: &Arc<Shared>,
        executor: &Arc<dyn ConversionExecutor>,
        assignments: Receiver<Assignment>,
        wake: Sender<Wake>,
    ) -> Result<Self, SchedulerError> {
        let mut workers = Vec::with_capacity(count);

        for slot in 0..count {
            let name = format!("rkconv-slot-{}", slot);
            let rx = assignments.clone();
            let wake_tx = wake.clone();
            let worker_shared = Arc::clone(shared);
            let worker_executor = Arc::clone(executor);

            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_worker(slot, rx, wake_tx, worker_shared, worker_executor))
                .map_err(|e| SchedulerError::Spawn {
                    name,
                    reason: e.to_string(),
                })?;
            workers.push((slot, handle));
        }

        info!("Started {} worker slot(s)", count);
        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Joins every slot. The assignment channel must already be closed.
    pub fn wait(self) {
        for (slot, worker) in self.workers {
            join_slot(slot, worker);
        }
        info!("All worker slots have stopped");
    }

    /// Joins slots that already returned and detaches the ones still inside
    /// a conversion.
    pub fn release(self) {
        let mut detached = 0;
        for (slot, worker) in self.workers {
            if worker.is_finished() {
                join_slot(slot, worker);
            } else {
                detached += 1;
            }
        }
        if detached > 0 {
            warn!("Detached {} worker slot(s) still converting", detached);
        }
    }
}

fn join_slot(slot: usize, worker: JoinHandle<()>) {
    if let Err(e) = worker.join() {
        error!("Worker slot {} panicked: {:?}", slot, e);
    } else {
        debug!("Worker slot {} finished", slot);
    }
}

fn run_worker(
    slot: usize,
    assignments: Receiver<Assignment>,
    wake: Sender<Wake>,
    shared: Arc<Shared>,
    executor: Arc<dyn ConversionExecutor>,
) {
    debug!("Worker slot {} started", slot);

    // The sender side closes when the dispatcher exits.
    while let Ok(assignment) = assignments.recv() {
        execute(slot, &assignment, &shared, executor.as_ref());
        if wake.send(Wake::SlotFreed).is_err() {
            debug!("Worker slot {} has no dispatcher to report to", slot);
        }
    }

    debug!("Worker slot {} stopped", slot);
}

fn execute(
    slot: usize,
    assignment: &Assignment,
    shared: &Arc<Shared>,
    executor: &dyn ConversionExecutor,
) {
    let job = &assignment.job;
    let still_running = shared
        .lock()
        .jobs
        .get(&job.id)
        .is_some_and(|record| record.state.status == JobStatus::Running);
    if !still_running {
        debug!("Skipping job {}, it was abandoned before the slot picked it up", job.id);
        return;
    }

    let span = tracing::info_span!("job", job_id = %job.id, model = %job.model_name(), slot);
    let _entered = span.enter();

    info!("Converting {} ({})", job.id, job.bundle.kind);
    let sink = JobProgress::new(Arc::clone(shared), &job.id, Arc::clone(&assignment.cancel));

    let outcome = prepare_output(&assignment.output_path).and_then(|()| {
        let request = ConversionRequest {
            job_id: &job.id,
            bundle: &job.bundle,
            config: &job.config,
            output_path: &assignment.output_path,
        };
        match panic::catch_unwind(AssertUnwindSafe(|| executor.convert(&request, &sink))) {
            Ok(Ok(())) => Ok(assignment.output_path.clone()),
            Ok(Err(e)) => Err(e.message().to_string()),
            Err(payload) => Err(format!("conversion panicked: {}", panic_message(&*payload))),
        }
    });

    match &outcome {
        Ok(path) => info!("Job {} produced {}", job.id, path.display()),
        Err(message) => warn!("Job {} failed: {}", job.id, message),
    }
    shared.finish(&job.id, outcome);
}

fn prepare_output(output_path: &Path) -> Result<(), String> {
    match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create output directory '{}': {}", parent.display(), e)),
        _ => Ok(()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
