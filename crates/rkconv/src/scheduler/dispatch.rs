//! Hands pending jobs to free worker slots.
//!
//! The dispatcher owns the count of idle slots. It only claims a job when
//! a slot is free, so a job stays Pending until execution can begin.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error};

use super::registry::Shared;
use crate::broadcast::JobEvent;
use crate::job::{Job, JobStatus};

/// A claimed job on its way to a worker slot.
pub(crate) struct Assignment {
    pub(crate) job: Arc<Job>,
    pub(crate) output_path: PathBuf,
    pub(crate) cancel: Arc<AtomicBool>,
}

pub(crate) enum Wake {
    Submitted,
    SlotFreed,
    Stop,
}

pub(crate) fn run_dispatcher(
    shared: Arc<Shared>,
    slots: Sender<Assignment>,
    wake: Receiver<Wake>,
    slot_count: usize,
) {
    debug!("Dispatcher started with {} slot(s)", slot_count);
    let mut idle = slot_count;

    loop {
        while idle > 0 {
            let Some(assignment) = claim_next(&shared) else {
                break;
            };
            idle -= 1;
            if let Err(unsent) = slots.send(assignment) {
                let job_id = unsent.into_inner().job.id.clone();
                error!("No worker slot accepted job {}", job_id);
                shared.finish(&job_id, Err("worker slots are unavailable".to_string()));
                break;
            }
        }

        match wake.recv() {
            Ok(Wake::Submitted) => {}
            Ok(Wake::SlotFreed) => idle = (idle + 1).min(slot_count),
            Ok(Wake::Stop) | Err(_) => break,
        }
    }

    debug!("Dispatcher stopped");
}

/// Moves the next pending job to Running. Ids whose job was cancelled while
/// queued are dropped.
pub(crate) fn claim_next(shared: &Shared) -> Option<Assignment> {
    let (assignment, event) = {
        let mut guard = shared.lock();
        let registry = &mut *guard;
        if !registry.accepting {
            return None;
        }

        loop {
            let job_id = registry.queue.pop()?;
            let Some(record) = registry.jobs.get_mut(&job_id) else {
                continue;
            };
            if record.state.status != JobStatus::Pending {
                continue;
            }

            let output_path = record.job.resolve_output_path(&registry.output_root);
            if !record.state.start(output_path.clone()) {
                continue;
            }
            registry.running += 1;

            let event = JobEvent::from_state(&record.state, "Conversion started");
            break (
                Assignment {
                    job: Arc::clone(&record.job),
                    output_path,
                    cancel: Arc::clone(&record.cancel),
                },
                event,
            );
        }
    };

    shared.events.send(event);
    Some(assignment)
}
