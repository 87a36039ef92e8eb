//! Callback notifiers that record deliveries instead of posting them.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use rkconv::notify::CallbackNotifier;
use rkconv::{JobState, JobStatus};

/// Holds every notification until `release` is called, like an endpoint
/// that accepts the connection and never answers.
pub struct StallingNotifier {
    release_tx: Sender<()>,
    release_rx: Receiver<()>,
    delivered: Mutex<Vec<(String, String, JobStatus)>>,
}

impl StallingNotifier {
    pub fn new() -> Self {
        let (release_tx, release_rx) = unbounded();
        Self {
            release_tx,
            release_rx,
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Lets `count` held notifications through.
    pub fn release(&self, count: usize) {
        for _ in 0..count {
            let _ = self.release_tx.send(());
        }
    }

    /// `(url, job id, status)` of every completed delivery.
    pub fn delivered(&self) -> Vec<(String, String, JobStatus)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn wait_for_deliveries(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.delivered.lock().unwrap().len() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl CallbackNotifier for StallingNotifier {
    fn notify(&self, url: &str, state: &JobState) {
        let _ = self.release_rx.recv_timeout(Duration::from_secs(30));
        self.delivered
            .lock()
            .unwrap()
            .push((url.to_string(), state.id().to_string(), state.status));
    }
}
