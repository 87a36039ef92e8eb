//! Executors that convert nothing but behave like the real one from the
//! scheduler's point of view.

#![allow(dead_code)]

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use rkconv::{ConversionError, ConversionExecutor, ConversionRequest, ProgressSink};

fn write_artifact(request: &ConversionRequest<'_>) -> Result<(), ConversionError> {
    std::fs::write(request.output_path, format!("rknn:{}", request.job_id))
        .map_err(|e| ConversionError::new(e.to_string()))
}

/// Writes the artifact immediately.
pub fn instant_success() -> impl ConversionExecutor {
    |request: &ConversionRequest<'_>, _: &dyn ProgressSink| -> Result<(), ConversionError> {
        write_artifact(request)
    }
}

/// Fails every job with `message`.
pub fn failing(message: &'static str) -> impl ConversionExecutor {
    move |_: &ConversionRequest<'_>, _: &dyn ProgressSink| -> Result<(), ConversionError> {
        Err(ConversionError::new(message))
    }
}

/// Panics inside every job.
pub fn panicking(message: &'static str) -> impl ConversionExecutor {
    move |_: &ConversionRequest<'_>, _: &dyn ProgressSink| -> Result<(), ConversionError> {
        panic!("{}", message)
    }
}

/// Reports each percentage in `steps`, then writes the artifact.
pub fn reporting(steps: &'static [i64]) -> impl ConversionExecutor {
    move |request: &ConversionRequest<'_>, progress: &dyn ProgressSink| -> Result<(), ConversionError> {
        for step in steps {
            progress.progress(*step);
        }
        progress.log("export done");
        write_artifact(request)
    }
}

#[derive(Default)]
struct GateState {
    open: bool,
    active: usize,
    max_active: usize,
    started: Vec<String>,
}

/// Holds every conversion until the gate opens. A job whose cancellation
/// is requested while it waits fails with "cancelled by request".
pub struct GatedExecutor {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl GatedExecutor {
    pub fn closed() -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
        }
    }

    pub fn open() -> Self {
        let gate = Self::closed();
        gate.release();
        gate
    }

    pub fn release(&self) {
        self.state.lock().unwrap().open = true;
        self.changed.notify_all();
    }

    /// Job ids in the order their conversions began.
    pub fn started(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn max_active(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    pub fn wait_for_started(&self, count: usize, timeout: Duration) -> bool {
        let guard = self.state.lock().unwrap();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |s| s.started.len() < count)
            .unwrap();
        guard.started.len() >= count
    }
}

impl ConversionExecutor for GatedExecutor {
    fn convert(
        &self,
        request: &ConversionRequest<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<(), ConversionError> {
        {
            let mut state = self.state.lock().unwrap();
            state.started.push(request.job_id.to_string());
            state.active += 1;
            state.max_active = state.max_active.max(state.active);
        }
        self.changed.notify_all();

        let deadline = Instant::now() + Duration::from_secs(30);
        let mut cancelled = false;
        let mut state = self.state.lock().unwrap();
        while !state.open && Instant::now() < deadline {
            if progress.is_cancel_requested() {
                cancelled = true;
                break;
            }
            state = self
                .changed
                .wait_timeout(state, Duration::from_millis(10))
                .unwrap()
                .0;
        }
        state.active -= 1;
        drop(state);

        if cancelled {
            return Err(ConversionError::new("cancelled by request"));
        }
        write_artifact(request)
    }
}
