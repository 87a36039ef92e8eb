//! Background delivery of completion callbacks.
//!
//! Terminal states are published from slot threads and from callers of
//! `cancel`/`stop`; none of them may block on a client endpoint, so each
//! callback is queued here and posted from a single delivery thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, warn};

use super::CallbackNotifier;
use crate::job::JobState;

const THREAD_NAME: &str = "rkconv-callbacks";

struct Delivery {
    url: String,
    state: JobState,
}

pub(crate) struct CallbackQueue {
    tx: Option<Sender<Delivery>>,
}

impl CallbackQueue {
    /// Starts the delivery thread. It exits once the queue is dropped and
    /// every queued callback has been attempted.
    pub(crate) fn spawn(notifier: Arc<dyn CallbackNotifier>) -> Self {
        let (tx, rx) = unbounded();
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || deliver_all(notifier, rx));

        match spawned {
            Ok(_) => Self { tx: Some(tx) },
            Err(e) => {
                error!("Cannot start {}: {}; callbacks are disabled", THREAD_NAME, e);
                Self { tx: None }
            }
        }
    }

    /// Queues a callback and returns immediately.
    pub(crate) fn push(&self, url: &str, state: &JobState) {
        let delivery = Delivery {
            url: url.to_string(),
            state: state.clone(),
        };
        let queued = self
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send(delivery).is_ok());
        if !queued {
            warn!("Dropping callback for job {} to {}", state.id(), url);
        }
    }
}

fn deliver_all(notifier: Arc<dyn CallbackNotifier>, rx: Receiver<Delivery>) {
    for delivery in rx.iter() {
        let sent = catch_unwind(AssertUnwindSafe(|| {
            notifier.notify(&delivery.url, &delivery.state)
        }));
        if sent.is_err() {
            warn!(
                "Callback notifier panicked for job {}",
                delivery.state.id()
            );
        }
    }
    debug!("Callback delivery thread finished");
}
