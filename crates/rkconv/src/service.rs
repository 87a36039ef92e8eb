//! Entry point for the upload layer: checks uploaded files, identifies the
//! model, builds the job and hands it to the scheduler.

use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::artifact::{ArtifactBundle, ArtifactClassifier, ArtifactFile};
use crate::broadcast::JobEvent;
use crate::config::{ConversionConfig, ServiceConfig};
use crate::error::{AdmissionError, SchedulerError};
use crate::job::{Job, JobState, JobStatus, SubmitOptions};
use crate::scheduler::Scheduler;

/// TensorFlow checkpoint index files carry no extension.
const CHECKPOINT_FILE: &str = "checkpoint";

/// A file the upload layer has already written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Name as sent by the client.
    pub original_name: String,
    pub saved_path: PathBuf,
    pub size: u64,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, saved_path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            original_name: original_name.into(),
            saved_path: saved_path.into(),
            size,
        }
    }
}

impl From<&UploadedFile> for ArtifactFile {
    fn from(upload: &UploadedFile) -> Self {
        ArtifactFile::new(&upload.original_name, &upload.saved_path, upload.size)
    }
}

/// What the client gets back after a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitReceipt {
    pub job_id: String,
    pub model_type: String,
    pub primary_file: String,
    pub secondary_files: Vec<String>,
    pub total_files: usize,
    pub output_path: PathBuf,
}

pub struct ConversionService {
    config: Arc<ServiceConfig>,
    classifier: ArtifactClassifier,
    scheduler: Arc<Scheduler>,
}

impl ConversionService {
    pub fn new(config: Arc<ServiceConfig>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            config,
            classifier: ArtifactClassifier::default(),
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Rejects uploads with a disallowed extension or above the size limit.
    pub fn check_upload(&self, files: &[UploadedFile]) -> Result<(), AdmissionError> {
        if files.is_empty() {
            return Err(AdmissionError::NoFiles);
        }

        for upload in files {
            let file = ArtifactFile::from(upload);
            let allowed = self.config.allows_extension(file.extension())
                || file.name().eq_ignore_ascii_case(CHECKPOINT_FILE);
            if !allowed {
                return Err(AdmissionError::UnsupportedFile {
                    name: upload.original_name.clone(),
                    extension: file.extension().to_string(),
                });
            }
            if upload.size > self.config.max_file_size {
                return Err(AdmissionError::FileTooLarge {
                    name: upload.original_name.clone(),
                    size: upload.size,
                    limit: self.config.max_file_size,
                });
            }
        }
        Ok(())
    }

    pub fn classify_and_validate(
        &self,
        files: &[UploadedFile],
    ) -> Result<ArtifactBundle, AdmissionError> {
        let files: Vec<ArtifactFile> = files.iter().map(ArtifactFile::from).collect();
        self.classifier.classify_and_validate(&files)
    }

    pub fn submit(
        &self,
        bundle: ArtifactBundle,
        config: ConversionConfig,
        options: SubmitOptions,
    ) -> Result<String, AdmissionError> {
        self.scheduler
            .submit(Job::with_options(bundle, config, options))
    }

    /// Checks, classifies and submits one upload. `payload` is a partial
    /// conversion config applied over the service defaults.
    pub fn submit_upload(
        &self,
        files: &[UploadedFile],
        payload: &Map<String, Value>,
        mut options: SubmitOptions,
    ) -> Result<SubmitReceipt, AdmissionError> {
        self.check_upload(files)?;
        let bundle = self.classify_and_validate(files)?;
        let config = ConversionConfig::from_layers(&self.config.defaults, payload)?;

        for (key, value) in upload_metadata(&bundle, files.len()) {
            options.metadata.entry(key).or_insert(value);
        }

        let job = Job::with_options(bundle, config, options);
        let output_path = job.resolve_output_path(&self.scheduler.output_root());
        let receipt = SubmitReceipt {
            job_id: job.id.clone(),
            model_type: job.bundle.kind.to_string(),
            primary_file: job.bundle.primary_file.name().to_string(),
            secondary_files: job
                .bundle
                .secondary_files
                .iter()
                .map(|f| f.name().to_string())
                .collect(),
            total_files: job.bundle.file_count(),
            output_path,
        };

        self.scheduler.submit(job)?;
        info!(
            "Accepted {} model '{}' as job {}",
            receipt.model_type, receipt.primary_file, receipt.job_id
        );
        Ok(receipt)
    }

    pub fn get(&self, id: &str) -> Result<JobState, SchedulerError> {
        self.scheduler.get(id)
    }

    pub fn list(&self) -> Vec<JobState> {
        self.scheduler.list()
    }

    pub fn cancel(&self, id: &str) -> bool {
        self.scheduler.cancel(id)
    }

    pub fn logs(&self, id: &str) -> Result<Vec<String>, SchedulerError> {
        self.scheduler.logs(id)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.scheduler.subscribe()
    }

    /// Location of a finished artifact, for download.
    pub fn result_path(&self, id: &str) -> Result<PathBuf, SchedulerError> {
        let state = self.scheduler.get(id)?;
        if state.status != JobStatus::Completed {
            return Err(SchedulerError::ResultUnavailable {
                id: id.to_string(),
                reason: format!("job is {}", state.status),
            });
        }

        match state.result_path {
            Some(path) if path.is_file() => Ok(path),
            Some(path) => Err(SchedulerError::ResultUnavailable {
                id: id.to_string(),
                reason: format!("artifact '{}' no longer exists", path.display()),
            }),
            None => Err(SchedulerError::ResultUnavailable {
                id: id.to_string(),
                reason: "no artifact was recorded".to_string(),
            }),
        }
    }
}

fn upload_metadata(bundle: &ArtifactBundle, uploaded: usize) -> Map<String, Value> {
    let names = |files: &[ArtifactFile]| -> Vec<String> {
        files.iter().map(|f| f.name().to_string()).collect()
    };

    let mut metadata = Map::new();
    metadata.insert("model_type".to_string(), json!(bundle.kind.as_str()));
    metadata.insert("uploaded_files_count".to_string(), json!(uploaded));
    metadata.insert("primary_file".to_string(), json!(bundle.primary_file.name()));
    metadata.insert(
        "secondary_files".to_string(),
        json!(names(&bundle.secondary_files)),
    );
    metadata.insert(
        "additional_files".to_string(),
        json!(names(&bundle.extra_files)),
    );
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ModelKind;

    #[test]
    fn test_upload_metadata_lists_files() {
        let bundle = ArtifactBundle::single(
            ModelKind::Caffe,
            ArtifactFile::new("net.prototxt", "/u/1", 1),
        )
        .with_secondary(vec![ArtifactFile::new("net.caffemodel", "/u/2", 1)]);

        let metadata = upload_metadata(&bundle, 2);

        assert_eq!(metadata["model_type"], "caffe");
        assert_eq!(metadata["uploaded_files_count"], 2);
        assert_eq!(metadata["secondary_files"], json!(["net.caffemodel"]));
        assert_eq!(metadata["additional_files"], json!([]));
    }

    #[test]
    fn test_uploaded_file_keeps_original_name() {
        let upload = UploadedFile::new("ResNet50.ONNX", "/uploads/9a7e.onnx", 42);
        let file = ArtifactFile::from(&upload);

        assert_eq!(file.name(), "ResNet50.ONNX");
        assert_eq!(file.extension(), ".onnx");
        assert_eq!(file.path(), upload.saved_path.as_path());
    }
}
