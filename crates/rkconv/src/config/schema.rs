use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::artifact::DEFAULT_ALLOWED_EXTENSIONS;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_upload_directory")]
    pub upload_directory: PathBuf,
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    #[serde(default = "default_temp_directory")]
    pub temp_directory: PathBuf,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub drain: DrainConfig,
    /// Job journal location. No journal is kept when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Partial conversion config applied before each request's own payload.
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            max_workers: default_max_workers(),
            upload_directory: default_upload_directory(),
            output_directory: default_output_directory(),
            temp_directory: default_temp_directory(),
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
            drain: DrainConfig::default(),
            database_path: None,
            executor: ExecutorConfig::default(),
            logging: LoggingConfig::default(),
            defaults: Map::new(),
        }
    }
}

impl ServiceConfig {
    /// True when `extension` (with leading dot) may be uploaded.
    pub fn allows_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

fn default_max_workers() -> usize {
    num_cpus::get()
}

fn default_max_file_size() -> u64 {
    500 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// Base directory for uploads, outputs and scratch files.
pub fn default_data_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rkconv")
}

fn default_upload_directory() -> PathBuf {
    default_data_directory().join("uploads")
}

fn default_output_directory() -> PathBuf {
    default_data_directory().join("outputs")
}

fn default_temp_directory() -> PathBuf {
    default_data_directory().join("temp")
}

/// What happens to running conversions when the service stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainPolicy {
    /// Let running jobs finish, up to the drain timeout.
    #[default]
    Wait,
    /// Stop immediately and fail running jobs.
    Abandon,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrainConfig {
    #[serde(default)]
    pub policy: DrainPolicy,
    /// Upper bound for `wait`. Unbounded when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl DrainConfig {
    pub fn wait() -> Self {
        Self::default()
    }

    pub fn wait_for(timeout: Duration) -> Self {
        Self {
            policy: DrainPolicy::Wait,
            timeout_secs: Some(timeout.as_secs()),
        }
    }

    pub fn abandon() -> Self {
        Self {
            policy: DrainPolicy::Abandon,
            timeout_secs: None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// External converter invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments with `{input}`, `{output}`, `{config}` and `{dataset}`
    /// placeholders.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_progress_prefix")]
    pub progress_prefix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            progress_prefix: default_progress_prefix(),
        }
    }
}

fn default_program() -> String {
    "rknn-convert".to_string()
}

fn default_args() -> Vec<String> {
    ["--input", "{input}", "--output", "{output}", "--config", "{config}", "--dataset", "{dataset}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_progress_prefix() -> String {
    "PROGRESS ".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
