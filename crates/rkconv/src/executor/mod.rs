//! The boundary to the actual model conversion.
//!
//! The scheduler treats conversion as opaque: it hands an executor the
//! bundle, the merged configuration and the target path, and records
//! whatever comes back.

use std::path::Path;

use crate::artifact::ArtifactBundle;
use crate::config::ConversionConfig;
use crate::error::ConversionError;
use crate::worker::ProgressSink;

pub mod command;

pub use command::CommandExecutor;

/// Everything an executor needs to convert one job.
#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
    pub job_id: &'a str,
    pub bundle: &'a ArtifactBundle,
    pub config: &'a ConversionConfig,
    pub output_path: &'a Path,
}

/// Converts a bundle into an `.rknn` artifact at `request.output_path`.
///
/// Runs on a worker slot thread and may block for a long time. Executors
/// that want to honour cancellation poll `progress.is_cancel_requested()`.
pub trait ConversionExecutor: Send + Sync {
    fn convert(
        &self,
        request: &ConversionRequest<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<(), ConversionError>;
}

impl<F> ConversionExecutor for F
where
    F: Fn(&ConversionRequest<'_>, &dyn ProgressSink) -> Result<(), ConversionError> + Send + Sync,
{
    fn convert(
        &self,
        request: &ConversionRequest<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<(), ConversionError> {
        self(request, progress)
    }
}
