use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

use crate::broadcast::JobEvent;
use crate::scheduler::registry::Shared;

/// Channel from a running conversion back to its job record.
pub trait ProgressSink: Send + Sync {
    /// Reports a completion percentage. Out-of-range values are clamped.
    fn progress(&self, percent: i64);

    /// Appends a line to the job's log.
    fn log(&self, line: &str);

    /// True once someone asked for the job to stop.
    fn is_cancel_requested(&self) -> bool {
        false
    }
}

/// Sink that discards everything.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn progress(&self, _percent: i64) {}

    fn log(&self, _line: &str) {}
}

/// Writes reports into the live registry and broadcasts progress events.
pub(crate) struct JobProgress {
    shared: Arc<Shared>,
    job_id: String,
    cancel: Arc<AtomicBool>,
}

impl JobProgress {
    pub(crate) fn new(shared: Arc<Shared>, job_id: &str, cancel: Arc<AtomicBool>) -> Self {
        Self {
            shared,
            job_id: job_id.to_string(),
            cancel,
        }
    }
}

impl ProgressSink for JobProgress {
    fn progress(&self, percent: i64) {
        let event = {
            let mut registry = self.shared.lock();
            let Some(record) = registry.jobs.get_mut(&self.job_id) else {
                return;
            };
            match record.state.set_progress(percent) {
                Some(clamped) => {
                    JobEvent::from_state(&record.state, format!("Conversion progress: {}%", clamped))
                }
                None => return,
            }
        };

        info!("Job {} progress: {}%", self.job_id, event.progress);
        self.shared.events.send(event);
    }

    fn log(&self, line: &str) {
        let mut registry = self.shared.lock();
        if let Some(record) = registry.jobs.get_mut(&self.job_id) {
            record.state.append_log(line);
        }
    }

    fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}
