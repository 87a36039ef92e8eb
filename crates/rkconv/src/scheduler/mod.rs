//! Owns the job registry and runs admitted jobs on a fixed set of slots.
//!
//! A `Scheduler` is constructed explicitly, started once against an output
//! root and stopped once. Queries never wait for a conversion.

pub(crate) mod dispatch;
pub mod queue;
pub(crate) mod registry;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::config::{DrainConfig, DrainPolicy, ServiceConfig};
use crate::db::Database;
use crate::error::{AdmissionError, SchedulerError};
use crate::executor::ConversionExecutor;
use crate::history::HistoryStore;
use crate::job::{validate_job_id, Job, JobState, JobStatus};
use crate::notify::{CallbackNotifier, NoopNotifier};
use crate::worker::WorkerPool;

use dispatch::{run_dispatcher, Wake};
use registry::{JobRecord, Shared};

pub use queue::JobQueue;

const STOPPED_BEFORE_START: &str = "scheduler stopped before the job started";

pub struct SchedulerOptions {
    pub max_workers: usize,
    pub drain: DrainConfig,
    /// Output root used until `start` supplies one.
    pub output_root: PathBuf,
    pub journal: Option<Database>,
    pub notifier: Option<Arc<dyn CallbackNotifier>>,
    pub event_capacity: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().max(1),
            drain: DrainConfig::default(),
            output_root: PathBuf::from("output"),
            journal: None,
            notifier: None,
            event_capacity: 256,
        }
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            drain: config.drain.clone(),
            output_root: config.output_directory.clone(),
            ..Self::default()
        }
    }

    pub fn with_journal(mut self, journal: Database) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CallbackNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub historical: usize,
}

struct Runtime {
    dispatcher: JoinHandle<()>,
    pool: WorkerPool,
}

enum Lifecycle {
    Idle,
    Running(Runtime),
    Stopped,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    executor: Arc<dyn ConversionExecutor>,
    max_workers: usize,
    drain: DrainConfig,
    wake_tx: Sender<Wake>,
    /// Cloned into the dispatcher at start, so a failed start can be retried.
    wake_rx: Receiver<Wake>,
    lifecycle: Mutex<Lifecycle>,
}

impl Scheduler {
    pub fn new(executor: Arc<dyn ConversionExecutor>, options: SchedulerOptions) -> Self {
        let notifier = options
            .notifier
            .unwrap_or_else(|| Arc::new(NoopNotifier));
        let shared = Shared::new(
            options.output_root,
            JobEventBroadcaster::new(options.event_capacity.max(1)),
            options.journal,
            notifier,
        );
        let (wake_tx, wake_rx) = unbounded();

        Self {
            shared: Arc::new(shared),
            executor,
            max_workers: options.max_workers.max(1),
            drain: options.drain,
            wake_tx,
            wake_rx,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|poisoned| {
            warn!("Scheduler lifecycle lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Loads history from `output_root` and starts the dispatcher and the
    /// worker slots. Jobs submitted earlier begin running now.
    pub fn start(&self, output_root: &Path) -> Result<(), SchedulerError> {
        let mut lifecycle = self.lifecycle();
        match *lifecycle {
            Lifecycle::Running(_) => return Err(SchedulerError::AlreadyStarted),
            Lifecycle::Stopped => return Err(SchedulerError::Stopped),
            Lifecycle::Idle => {}
        }

        std::fs::create_dir_all(output_root).map_err(|e| SchedulerError::OutputDirectory {
            path: output_root.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut history = HistoryStore::load(output_root, self.shared.journal.as_ref());
        {
            let mut registry = self.shared.lock();
            let live: Vec<String> = registry.jobs.keys().cloned().collect();
            history.retain(|id| !live.iter().any(|known| known == id));
            registry.history = history;
            registry.output_root = output_root.to_path_buf();
        }

        let (slot_tx, slot_rx) = bounded(self.max_workers);
        let pool = WorkerPool::spawn(
            self.max_workers,
            &self.shared,
            &self.executor,
            slot_rx,
            self.wake_tx.clone(),
        )?;

        let shared = Arc::clone(&self.shared);
        let wake_rx = self.wake_rx.clone();
        let slot_count = self.max_workers;
        let dispatcher = thread::Builder::new()
            .name("rkconv-dispatcher".to_string())
            .spawn(move || run_dispatcher(shared, slot_tx, wake_rx, slot_count))
            .map_err(|e| SchedulerError::Spawn {
                name: "rkconv-dispatcher".to_string(),
                reason: e.to_string(),
            })?;

        info!(
            "Scheduler started with {} slot(s), output root {}",
            self.max_workers,
            output_root.display()
        );
        *lifecycle = Lifecycle::Running(Runtime { dispatcher, pool });
        Ok(())
    }

    /// Admits a job and returns its id. The job is Pending when this returns.
    pub fn submit(&self, job: Job) -> Result<String, AdmissionError> {
        validate_job_id(&job.id)?;
        let (id, event) = {
            let mut registry = self.shared.lock();
            if !registry.accepting {
                return Err(AdmissionError::ShuttingDown);
            }
            if registry.contains(&job.id) {
                return Err(AdmissionError::DuplicateId(job.id));
            }

            let id = job.id.clone();
            let priority = job.priority;
            let record = JobRecord::new(job);
            let event = JobEvent::from_state(&record.state, "Job queued");
            registry.jobs.insert(id.clone(), record);
            registry.queue.push(&id, priority);
            (id, event)
        };

        debug!("Queued job {}", id);
        self.shared.events.send(event);
        if self.wake_tx.send(Wake::Submitted).is_err() {
            debug!("Dispatcher is not running; job {} waits for start", id);
        }
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<JobState, SchedulerError> {
        self.shared
            .lock()
            .state(id)
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))
    }

    /// Live and historical jobs in no particular order.
    pub fn list(&self) -> Vec<JobState> {
        let registry = self.shared.lock();
        registry
            .jobs
            .values()
            .map(|record| record.state.clone())
            .chain(registry.history.iter().cloned())
            .collect()
    }

    /// Cancels a pending job, or flags a running one. Returns false when
    /// nothing changed.
    pub fn cancel(&self, id: &str) -> bool {
        let mut registry = self.shared.lock();
        let Some(record) = registry.jobs.get_mut(id) else {
            return false;
        };

        match record.state.status {
            JobStatus::Pending => {
                if !record.state.cancel("cancelled by request") {
                    return false;
                }
                record.cancel.store(true, Ordering::SeqCst);
                let state = record.state.clone();
                let callback_url = record.job.callback_url.clone();
                drop(registry);

                info!("Cancelled pending job {}", id);
                self.shared.publish_terminal(&state, callback_url.as_deref());
                true
            }
            JobStatus::Running if !record.state.cancel_requested => {
                record.state.cancel_requested = true;
                record.cancel.store(true, Ordering::SeqCst);
                record.state.append_log("Cancellation requested");
                let event = JobEvent::from_state(&record.state, "Cancellation requested");
                drop(registry);

                info!("Cancellation requested for running job {}", id);
                self.shared.events.send(event);
                true
            }
            _ => false,
        }
    }

    pub fn logs(&self, id: &str) -> Result<Vec<String>, SchedulerError> {
        self.shared
            .lock()
            .state(id)
            .map(|state| state.log_lines.clone())
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.events.subscribe()
    }

    pub fn output_root(&self) -> PathBuf {
        self.shared.lock().output_root.clone()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn stats(&self) -> SchedulerStats {
        let registry = self.shared.lock();
        SchedulerStats {
            pending: registry.count(JobStatus::Pending),
            running: registry.count(JobStatus::Running),
            completed: registry.count(JobStatus::Completed),
            failed: registry.count(JobStatus::Failed),
            cancelled: registry.count(JobStatus::Cancelled),
            historical: registry.history.len(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Running(_))
    }

    /// Stops accepting jobs, cancels pending ones and applies the drain
    /// policy to running ones. A stopped scheduler cannot be restarted.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle(), Lifecycle::Stopped);

        let cancelled: Vec<(JobState, Option<String>)> = {
            let mut guard = self.shared.lock();
            let registry = &mut *guard;
            registry.accepting = false;
            registry.queue.clear();
            registry
                .jobs
                .values_mut()
                .filter_map(|record| {
                    if !record.state.cancel(STOPPED_BEFORE_START) {
                        return None;
                    }
                    record.cancel.store(true, Ordering::SeqCst);
                    Some((record.state.clone(), record.job.callback_url.clone()))
                })
                .collect()
        };
        for (state, callback_url) in &cancelled {
            self.shared.publish_terminal(state, callback_url.as_deref());
        }
        if !cancelled.is_empty() {
            info!("Cancelled {} pending job(s) at stop", cancelled.len());
        }

        let Lifecycle::Running(runtime) = previous else {
            debug!("Scheduler stopped without having started");
            return;
        };

        let _ = self.wake_tx.send(Wake::Stop);
        if runtime.dispatcher.join().is_err() {
            error!("Dispatcher thread panicked");
        }

        if self.drain.policy == DrainPolicy::Wait {
            info!("Waiting for running conversions to finish");
            if !self.shared.wait_until_idle(self.drain.timeout()) {
                warn!("Drain timeout elapsed with conversions still running");
            }
        }

        let abandoned = self.shared.abandon_running();
        if abandoned == 0 {
            runtime.pool.wait();
        } else {
            runtime.pool.release();
        }
        info!("Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}
