//! Jobs and their lifecycle records.

#[allow(clippy::module_inception)]
pub mod job;
pub mod state;

pub use job::{artifact_file_name, validate_job_id, Job, SubmitOptions, OUTPUT_EXTENSION};
pub use state::{JobInfo, JobState, JobStatus};
