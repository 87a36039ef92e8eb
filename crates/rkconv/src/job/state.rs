use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::job::Job;
use crate::artifact::ModelKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive part of a job, shared by live and historical records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub model_name: String,
    /// Unknown for artifacts recovered from the output directory.
    pub model_kind: Option<ModelKind>,
    pub primary_file: Option<String>,
    pub priority: i32,
    pub callback_url: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub output_path: Option<PathBuf>,
}

/// Lifecycle record of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub job: JobInfo,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: u8,
    pub error_message: Option<String>,
    pub result_path: Option<PathBuf>,
    #[serde(default)]
    pub log_lines: Vec<String>,
    #[serde(default)]
    pub is_historical: bool,
    #[serde(default)]
    pub cancel_requested: bool,
}

impl JobState {
    pub fn pending(job: &Job) -> Self {
        Self {
            job: job.info(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0,
            error_message: None,
            result_path: None,
            log_lines: Vec::new(),
            is_historical: false,
            cancel_requested: false,
        }
    }

    /// A completed job known only from a previous run.
    pub fn historical(job: JobInfo, completed_at: DateTime<Utc>, result_path: PathBuf) -> Self {
        Self {
            job,
            status: JobStatus::Completed,
            created_at: completed_at,
            started_at: None,
            completed_at: Some(completed_at),
            progress: 100,
            error_message: None,
            result_path: Some(result_path),
            log_lines: Vec::new(),
            is_historical: true,
            cancel_requested: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.job.id
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if self.is_historical || !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    pub(crate) fn start(&mut self, output_path: PathBuf) -> bool {
        if !self.transition(JobStatus::Running) {
            return false;
        }
        self.started_at = Some(Utc::now());
        self.job.output_path = Some(output_path);
        self.append_log("Conversion started");
        true
    }

    pub(crate) fn complete(&mut self, result_path: PathBuf) -> bool {
        if !self.transition(JobStatus::Completed) {
            return false;
        }
        self.progress = 100;
        self.completed_at = Some(Utc::now());
        self.push_line(format!("Conversion completed: {}", result_path.display()));
        self.result_path = Some(result_path);
        true
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.transition(JobStatus::Failed) {
            return false;
        }
        let message = message.into();
        self.completed_at = Some(Utc::now());
        self.push_line(format!("Conversion failed: {}", message));
        self.error_message = Some(message);
        true
    }

    pub(crate) fn cancel(&mut self, reason: &str) -> bool {
        if !self.transition(JobStatus::Cancelled) {
            return false;
        }
        self.completed_at = Some(Utc::now());
        self.push_line(format!("Cancelled: {}", reason));
        true
    }

    /// Records a progress report, clamped to 0..=100. Ignored unless the
    /// job is running.
    pub(crate) fn set_progress(&mut self, percent: i64) -> Option<u8> {
        if self.status != JobStatus::Running {
            return None;
        }
        let clamped = percent.clamp(0, 100) as u8;
        self.progress = clamped;
        self.push_line(format!("Conversion progress: {}%", clamped));
        Some(clamped)
    }

    /// Appends a log line. Terminal records are read-only.
    pub(crate) fn append_log(&mut self, line: &str) {
        if self.is_terminal() || self.is_historical {
            return;
        }
        self.push_line(line.to_string());
    }

    fn push_line(&mut self, line: String) {
        self.log_lines.push(format!(
            "[{}] {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            line
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactBundle, ArtifactFile};
    use crate::config::ConversionConfig;

    fn pending() -> JobState {
        let job = Job::new(
            ArtifactBundle::single(ModelKind::Onnx, ArtifactFile::new("m.onnx", "/u/m.onnx", 1)),
            ConversionConfig::default(),
        );
        JobState::pending(&job)
    }

    #[test]
    fn test_transition_table() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Cancelled.can_transition_to(Running));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut state = pending();
        assert!(state.start(PathBuf::from("/out/m_x.rknn")));
        assert!(state.complete(PathBuf::from("/out/m_x.rknn")));

        assert!(!state.fail("late error"));
        assert_eq!(state.status, JobStatus::Completed);
        assert!(state.error_message.is_none());
        assert_eq!(state.progress, 100);
    }

    #[test]
    fn test_progress_is_clamped_and_logged() {
        let mut state = pending();
        assert_eq!(state.set_progress(50), None);

        state.start(PathBuf::from("/out/m.rknn"));
        assert_eq!(state.set_progress(140), Some(100));
        assert_eq!(state.set_progress(-3), Some(0));
        assert_eq!(state.progress, 0);
        assert!(state
            .log_lines
            .iter()
            .any(|l| l.ends_with("Conversion progress: 100%")));
    }

    #[test]
    fn test_logs_frozen_after_terminal() {
        let mut state = pending();
        state.cancel("by request");
        let count = state.log_lines.len();
        state.append_log("ignored");
        assert_eq!(state.log_lines.len(), count);
    }

    #[test]
    fn test_historical_never_transitions() {
        let mut state = JobState::historical(
            pending().job,
            Utc::now(),
            PathBuf::from("/out/m_1.rknn"),
        );
        assert!(!state.fail("nope"));
        assert!(state.is_historical);
        assert_eq!(state.status, JobStatus::Completed);
    }
}
