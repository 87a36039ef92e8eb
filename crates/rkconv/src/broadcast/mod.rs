//! Broadcasting of job lifecycle events.
//!
//! Any front end (HTTP streaming, a CLI watcher) can subscribe; the
//! scheduler never blocks on slow or absent listeners.

pub mod job_events;

pub use job_events::{JobEvent, JobEventBroadcaster};
