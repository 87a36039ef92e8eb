//! Isolated directories and a scheduler wired to them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use rkconv::{
    ArtifactBundle, ArtifactFile, ConversionConfig, ConversionExecutor, Job, JobState, JobStatus,
    ModelKind, Scheduler, SchedulerOptions, ServiceConfig, SubmitOptions, UploadedFile,
};

pub const WAIT: Duration = Duration::from_secs(10);

pub struct TestHarness {
    temp_dir: TempDir,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let upload_dir = temp_dir.path().join("uploads");
        let output_dir = temp_dir.path().join("outputs");
        std::fs::create_dir_all(&upload_dir).expect("Failed to create upload dir");

        Self {
            temp_dir,
            upload_dir,
            output_dir,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` under the upload directory as the web layer would.
    pub fn upload(&self, original_name: &str, contents: &[u8]) -> UploadedFile {
        let saved_path = self.upload_dir.join(original_name);
        std::fs::write(&saved_path, contents).expect("Failed to write upload");
        UploadedFile::new(original_name, saved_path, contents.len() as u64)
    }

    pub fn artifact(&self, name: &str) -> ArtifactFile {
        let upload = self.upload(name, b"model");
        ArtifactFile::from(&upload)
    }

    /// Places an artifact in the output directory as an earlier run would
    /// have left it.
    pub fn leave_output(&self, file_name: &str) -> PathBuf {
        std::fs::create_dir_all(&self.output_dir).expect("Failed to create output dir");
        let path = self.output_dir.join(file_name);
        std::fs::write(&path, b"rknn").expect("Failed to write artifact");
        path
    }

    pub fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.max_workers = 1;
        config.upload_directory = self.upload_dir.clone();
        config.output_directory = self.output_dir.clone();
        config.temp_directory = self.root().join("temp");
        config
    }

    pub fn options(&self, max_workers: usize) -> SchedulerOptions {
        SchedulerOptions {
            max_workers,
            output_root: self.output_dir.clone(),
            ..SchedulerOptions::default()
        }
    }

    pub fn scheduler<E>(&self, executor: E, options: SchedulerOptions) -> Scheduler
    where
        E: ConversionExecutor + 'static,
    {
        Scheduler::new(Arc::new(executor), options)
    }

    /// Starts `scheduler` against this harness's output directory.
    pub fn start(&self, scheduler: &Scheduler) {
        scheduler
            .start(&self.output_dir)
            .expect("Failed to start scheduler");
    }

    /// An ONNX job backed by a real uploaded file.
    pub fn onnx_job(&self, model: &str, task_id: &str, priority: i32) -> Job {
        let file = self.artifact(&format!("{}.onnx", model));
        Job::with_options(
            ArtifactBundle::single(ModelKind::Onnx, file),
            ConversionConfig::default(),
            SubmitOptions {
                task_id: Some(task_id.to_string()),
                priority,
                ..SubmitOptions::default()
            },
        )
    }
}

/// Polls until the job reaches `status`.
pub fn wait_for_status(scheduler: &Scheduler, id: &str, status: JobStatus) -> JobState {
    let deadline = Instant::now() + WAIT;
    loop {
        let state = scheduler.get(id).expect("job must exist");
        if state.status == status {
            return state;
        }
        assert!(
            Instant::now() < deadline,
            "job {} stuck in {} waiting for {}",
            id,
            state.status,
            status
        );
        thread::sleep(Duration::from_millis(10));
    }
}

/// Polls until the job is terminal.
pub fn wait_for_terminal(scheduler: &Scheduler, id: &str) -> JobState {
    let deadline = Instant::now() + WAIT;
    loop {
        let state = scheduler.get(id).expect("job must exist");
        if state.is_terminal() {
            return state;
        }
        assert!(Instant::now() < deadline, "job {} never finished", id);
        thread::sleep(Duration::from_millis(10));
    }
}
