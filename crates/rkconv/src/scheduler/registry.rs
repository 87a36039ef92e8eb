//! State shared by the scheduler, the dispatcher and the worker slots.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};

use super::queue::JobQueue;
use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::db::{job_repo, Database};
use crate::history::HistoryStore;
use crate::job::{Job, JobState, JobStatus};
use crate::notify::{CallbackNotifier, CallbackQueue};

/// Reason recorded on running jobs that a stop abandons.
pub(crate) const SHUTDOWN_MESSAGE: &str =
    "shutdown: conversion abandoned while the service was stopping";

/// A live job: what to run, its lifecycle record and its cancel flag.
pub(crate) struct JobRecord {
    pub(crate) job: Arc<Job>,
    pub(crate) state: JobState,
    pub(crate) cancel: Arc<AtomicBool>,
}

impl JobRecord {
    pub(crate) fn new(job: Job) -> Self {
        let state = JobState::pending(&job);
        Self {
            job: Arc::new(job),
            state,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub(crate) struct Registry {
    pub(crate) jobs: HashMap<String, JobRecord>,
    pub(crate) history: HistoryStore,
    pub(crate) queue: JobQueue,
    pub(crate) accepting: bool,
    pub(crate) running: usize,
    pub(crate) output_root: PathBuf,
}

impl Registry {
    pub(crate) fn new(output_root: PathBuf) -> Self {
        Self {
            jobs: HashMap::new(),
            history: HistoryStore::new(),
            queue: JobQueue::new(),
            accepting: true,
            running: 0,
            output_root,
        }
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.jobs.contains_key(id) || self.history.contains(id)
    }

    pub(crate) fn state(&self, id: &str) -> Option<&JobState> {
        self.jobs
            .get(id)
            .map(|record| &record.state)
            .or_else(|| self.history.get(id))
    }

    pub(crate) fn count(&self, status: JobStatus) -> usize {
        self.jobs
            .values()
            .filter(|record| record.state.status == status)
            .count()
    }
}

pub(crate) struct Shared {
    registry: Mutex<Registry>,
    /// Signalled whenever a running job leaves the running state.
    settled: Condvar,
    pub(crate) events: JobEventBroadcaster,
    pub(crate) journal: Option<Database>,
    callbacks: CallbackQueue,
}

impl Shared {
    pub(crate) fn new(
        output_root: PathBuf,
        events: JobEventBroadcaster,
        journal: Option<Database>,
        notifier: Arc<dyn CallbackNotifier>,
    ) -> Self {
        Self {
            registry: Mutex::new(Registry::new(output_root)),
            settled: Condvar::new(),
            events,
            journal,
            callbacks: CallbackQueue::spawn(notifier),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| {
            warn!("Job registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Applies the outcome of a conversion. Results for jobs that are no
    /// longer running (abandoned at stop) are discarded.
    pub(crate) fn finish(&self, job_id: &str, outcome: Result<PathBuf, String>) {
        let (state, callback_url) = {
            let mut guard = self.lock();
            let registry = &mut *guard;
            let Some(record) = registry.jobs.get_mut(job_id) else {
                warn!("Result for unknown job {}", job_id);
                return;
            };

            let applied = match outcome {
                Ok(result_path) => record.state.complete(result_path),
                Err(message) => record.state.fail(message),
            };
            if !applied {
                debug!(
                    "Discarding late result for job {} ({})",
                    job_id, record.state.status
                );
                return;
            }

            registry.running = registry.running.saturating_sub(1);
            self.settled.notify_all();
            (record.state.clone(), record.job.callback_url.clone())
        };

        self.publish_terminal(&state, callback_url.as_deref());
    }

    /// Fails every running job with the shutdown reason and raises its
    /// cancel flag. Returns how many jobs were abandoned.
    pub(crate) fn abandon_running(&self) -> usize {
        let abandoned: Vec<(JobState, Option<String>)> = {
            let mut guard = self.lock();
            let registry = &mut *guard;
            let mut abandoned = Vec::new();
            for record in registry.jobs.values_mut() {
                if record.state.status != JobStatus::Running {
                    continue;
                }
                record.cancel.store(true, Ordering::SeqCst);
                if record.state.fail(SHUTDOWN_MESSAGE) {
                    abandoned.push((record.state.clone(), record.job.callback_url.clone()));
                }
            }
            registry.running = registry.running.saturating_sub(abandoned.len());
            self.settled.notify_all();
            abandoned
        };

        for (state, callback_url) in &abandoned {
            warn!("Abandoned running job {}", state.id());
            self.publish_terminal(state, callback_url.as_deref());
        }
        abandoned.len()
    }

    /// Blocks until no job is running or `timeout` elapses. Returns true
    /// when nothing is running any more.
    pub(crate) fn wait_until_idle(&self, timeout: Option<Duration>) -> bool {
        let guard = self.lock();
        match timeout {
            Some(limit) => {
                let (guard, _) = self
                    .settled
                    .wait_timeout_while(guard, limit, |registry| registry.running > 0)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                guard.running == 0
            }
            None => {
                let guard = self
                    .settled
                    .wait_while(guard, |registry| registry.running > 0)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                guard.running == 0
            }
        }
    }

    /// Broadcasts, journals and queues the callback for a job that just
    /// reached a terminal state. Must be called without the registry lock
    /// held. Never waits on the callback endpoint.
    pub(crate) fn publish_terminal(&self, state: &JobState, callback_url: Option<&str>) {
        let message = match state.status {
            JobStatus::Completed => "Conversion completed",
            JobStatus::Failed => "Conversion failed",
            JobStatus::Cancelled => "Job cancelled",
            JobStatus::Pending | JobStatus::Running => "Job updated",
        };
        self.events.send(JobEvent::from_state(state, message));

        if let Some(db) = &self.journal {
            if let Err(e) = job_repo::record_state(db, state) {
                warn!("Failed to journal job {}: {}", state.id(), e);
            }
        }

        if let Some(url) = callback_url {
            self.callbacks.push(url, state);
        }
    }
}
