use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RkconvError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Admission rejected: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid progress prefix '{prefix}': {reason}")]
    InvalidProgressPrefix { prefix: String, reason: String },
}

/// Rejections raised synchronously while admitting a job. No job exists
/// when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Cannot identify a valid model in the uploaded files")]
    NoValidModel,

    #[error("Model files are incomplete: {0}")]
    IncompleteBundle(String),

    #[error("Job id already exists: {0}")]
    DuplicateId(String),

    #[error("Job id '{id}' cannot be used: {reason}")]
    InvalidTaskId { id: String, reason: &'static str },

    #[error("Invalid value for config field '{field}': {reason}")]
    InvalidConfigField { field: String, reason: String },

    #[error("Unsupported file type '{extension}' for '{name}'")]
    UnsupportedFile { name: String, extension: String },

    #[error("File '{name}' is {size} bytes, above the {limit} byte limit")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    #[error("No files were uploaded")]
    NoFiles,

    #[error("Scheduler is shutting down")]
    ShuttingDown,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Scheduler is already running")]
    AlreadyStarted,

    #[error("Scheduler has been stopped")]
    Stopped,

    #[error("Failed to prepare output directory '{path}': {reason}")]
    OutputDirectory { path: PathBuf, reason: String },

    #[error("Failed to spawn thread '{name}': {reason}")]
    Spawn { name: String, reason: String },

    #[error("No artifact available for job {id}: {reason}")]
    ResultUnavailable { id: String, reason: String },
}

/// Failure reported by a conversion executor. The message is kept verbatim
/// as the job's error message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ConversionError {
    message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

pub type Result<T> = std::result::Result<T, RkconvError>;
