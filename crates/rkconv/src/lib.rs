pub mod artifact;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod history;
pub mod job;
pub mod logging;
pub mod notify;
pub mod scheduler;
pub mod service;
pub mod worker;

pub use artifact::{ArtifactBundle, ArtifactClassifier, ArtifactFile, ModelKind};
pub use broadcast::{JobEvent, JobEventBroadcaster};
pub use config::{load_config, ConversionConfig, DrainPolicy, ServiceConfig};
pub use error::{
    AdmissionError, ConfigError, ConversionError, LoggingError, Result, RkconvError,
    SchedulerError,
};
pub use executor::{CommandExecutor, ConversionExecutor, ConversionRequest};
pub use history::HistoryStore;
pub use job::{Job, JobInfo, JobState, JobStatus, SubmitOptions};
pub use scheduler::{Scheduler, SchedulerOptions, SchedulerStats};
pub use service::{ConversionService, SubmitReceipt, UploadedFile};
pub use worker::{NoopProgress, ProgressSink};
