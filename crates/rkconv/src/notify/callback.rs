use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::job::{JobState, JobStatus};

/// Delivers the final state of a job to the URL the client registered.
pub trait CallbackNotifier: Send + Sync {
    fn notify(&self, url: &str, state: &JobState);
}

/// Drops all notifications.
pub struct NoopNotifier;

impl CallbackNotifier for NoopNotifier {
    fn notify(&self, _url: &str, _state: &JobState) {}
}

/// Body POSTed to callback URLs.
#[derive(Debug, Serialize)]
pub struct CallbackPayload<'a> {
    pub task_id: &'a str,
    pub status: JobStatus,
    pub progress: u8,
    pub model_name: &'a str,
    pub error_message: Option<&'a str>,
    pub result_path: Option<&'a Path>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: &'a Map<String, Value>,
}

impl<'a> From<&'a JobState> for CallbackPayload<'a> {
    fn from(state: &'a JobState) -> Self {
        Self {
            task_id: state.id(),
            status: state.status,
            progress: state.progress,
            model_name: &state.job.model_name,
            error_message: state.error_message.as_deref(),
            result_path: state.result_path.as_deref(),
            completed_at: state.completed_at,
            metadata: &state.job.metadata,
        }
    }
}

pub struct HttpCallbackNotifier {
    client: reqwest::blocking::Client,
}

impl HttpCallbackNotifier {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl CallbackNotifier for HttpCallbackNotifier {
    fn notify(&self, url: &str, state: &JobState) {
        let payload = CallbackPayload::from(state);
        match self.client.post(url).json(&payload).send() {
            Ok(response) if response.status().is_success() => {
                debug!("Callback for job {} delivered to {}", state.id(), url);
            }
            Ok(response) => warn!(
                "Callback for job {} to {} returned {}",
                state.id(),
                url,
                response.status()
            ),
            Err(e) => warn!("Callback for job {} to {} failed: {}", state.id(), url, e),
        }
    }
}
