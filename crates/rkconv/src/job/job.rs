use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::state::JobInfo;
use crate::artifact::ArtifactBundle;
use crate::config::ConversionConfig;
use crate::error::AdmissionError;

/// Extension of converted artifacts, without the dot.
pub const OUTPUT_EXTENSION: &str = "rknn";

/// File name of a job's artifact under the output root.
pub fn artifact_file_name(model_name: &str, job_id: &str) -> String {
    format!("{}_{}.{}", model_name, job_id, OUTPUT_EXTENSION)
}

/// Checks that `id` can be embedded in artifact and temp file names
/// without leaving the directory they are created in.
pub fn validate_job_id(id: &str) -> Result<(), AdmissionError> {
    let reason = if id.trim().is_empty() {
        Some("id is blank")
    } else if id.contains(['/', '\\']) {
        Some("id contains a path separator")
    } else if id.contains("..") {
        Some("id contains '..'")
    } else if id.contains('\0') {
        Some("id contains a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(AdmissionError::InvalidTaskId {
            id: id.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Caller-controlled parts of a submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Job id to use instead of a generated one.
    pub task_id: Option<String>,
    pub callback_url: Option<String>,
    pub priority: i32,
    pub metadata: Map<String, Value>,
    pub output_path: Option<PathBuf>,
}

/// An admitted unit of work. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub bundle: ArtifactBundle,
    pub config: ConversionConfig,
    /// Explicit artifact location. Derived from the output root when unset.
    pub output_path: Option<PathBuf>,
    /// Higher runs first.
    pub priority: i32,
    pub callback_url: Option<String>,
    pub metadata: Map<String, Value>,
}

impl Job {
    pub fn new(bundle: ArtifactBundle, config: ConversionConfig) -> Self {
        Self::with_options(bundle, config, SubmitOptions::default())
    }

    pub fn with_options(
        bundle: ArtifactBundle,
        config: ConversionConfig,
        options: SubmitOptions,
    ) -> Self {
        let id = options
            .task_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            id,
            bundle,
            config,
            output_path: options.output_path,
            priority: options.priority,
            callback_url: options.callback_url,
            metadata: options.metadata,
        }
    }

    pub fn model_name(&self) -> &str {
        self.bundle.model_name()
    }

    pub fn resolve_output_path(&self, output_root: &Path) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| output_root.join(artifact_file_name(self.model_name(), &self.id)))
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id.clone(),
            model_name: self.model_name().to_string(),
            model_kind: Some(self.bundle.kind),
            primary_file: Some(self.bundle.primary_file.name().to_string()),
            priority: self.priority,
            callback_url: self.callback_url.clone(),
            metadata: self.metadata.clone(),
            output_path: self.output_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactFile, ModelKind};

    fn onnx_bundle() -> ArtifactBundle {
        ArtifactBundle::single(
            ModelKind::Onnx,
            ArtifactFile::new("model.onnx", "/uploads/a1.onnx", 3),
        )
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Job::new(onnx_bundle(), ConversionConfig::default());
        let b = Job::new(onnx_bundle(), ConversionConfig::default());
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 36);
    }

    #[test]
    fn test_blank_task_id_is_replaced() {
        let job = Job::with_options(
            onnx_bundle(),
            ConversionConfig::default(),
            SubmitOptions {
                task_id: Some("  ".to_string()),
                ..SubmitOptions::default()
            },
        );
        assert!(!job.id.trim().is_empty());
    }

    #[test]
    fn test_output_path_derived_from_model_name() {
        let job = Job::with_options(
            onnx_bundle(),
            ConversionConfig::default(),
            SubmitOptions {
                task_id: Some("job42".to_string()),
                ..SubmitOptions::default()
            },
        );
        assert_eq!(
            job.resolve_output_path(Path::new("/out")),
            PathBuf::from("/out/model_job42.rknn")
        );
    }

    #[test]
    fn test_job_ids_that_escape_the_output_root_are_rejected() {
        for id in ["/../../escaped", "a/b", "..", "up..", "win\\dir", "nul\0id", " "] {
            assert!(
                matches!(
                    validate_job_id(id),
                    Err(AdmissionError::InvalidTaskId { .. })
                ),
                "{:?} should be rejected",
                id
            );
        }
        for id in ["job42", "a.b", "2026-10-15_run-1", "550e8400-e29b-41d4-a716-446655440000"] {
            assert_eq!(validate_job_id(id), Ok(()));
        }
    }

    #[test]
    fn test_explicit_output_path_wins() {
        let job = Job::with_options(
            onnx_bundle(),
            ConversionConfig::default(),
            SubmitOptions {
                output_path: Some(PathBuf::from("/tmp/custom.rknn")),
                ..SubmitOptions::default()
            },
        );
        assert_eq!(
            job.resolve_output_path(Path::new("/out")),
            PathBuf::from("/tmp/custom.rknn")
        );
    }
}
