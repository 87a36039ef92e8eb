//! Executor that shells out to an external converter program.
//!
//! The converter receives its parameters through a JSON file and reports
//! progress on stdout with lines such as `PROGRESS 40`.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use log::{debug, warn};
use regex::Regex;
use serde_json::json;

use super::{ConversionExecutor, ConversionRequest};
use crate::config::{ExecutorConfig, ServiceConfig};
use crate::error::{ConfigError, ConversionError};
use crate::worker::ProgressSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

struct OutputLine {
    stream: Stream,
    text: String,
}

pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    progress_pattern: Regex,
    temp_directory: PathBuf,
    poll_interval: Duration,
}

impl CommandExecutor {
    pub fn new(
        config: &ExecutorConfig,
        temp_directory: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let pattern = format!(r"^{}\s*(-?\d+)", regex::escape(&config.progress_prefix));
        let progress_pattern =
            Regex::new(&pattern).map_err(|e| ConfigError::InvalidProgressPrefix {
                prefix: config.progress_prefix.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
            progress_pattern,
            temp_directory: temp_directory.into(),
            poll_interval: Duration::from_millis(100),
        })
    }

    pub fn from_service_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        Self::new(&config.executor, config.temp_directory.clone())
    }

    fn parse_progress(&self, line: &str) -> Option<i64> {
        self.progress_pattern
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn build_args(&self, request: &ConversionRequest<'_>, config_path: &Path) -> Vec<String> {
        let input = request.bundle.primary_file.path().to_string_lossy();
        let output = request.output_path.to_string_lossy();
        let config = config_path.to_string_lossy();
        let dataset = request.config.dataset_path();

        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{output}", &output)
                    .replace("{config}", &config)
                    .replace("{dataset}", dataset)
            })
            .collect();

        for file in &request.bundle.secondary_files {
            args.push("--secondary".to_string());
            args.push(file.path().to_string_lossy().to_string());
        }
        for file in &request.bundle.extra_files {
            args.push("--extra".to_string());
            args.push(file.path().to_string_lossy().to_string());
        }
        args
    }

    fn write_config_file(&self, request: &ConversionRequest<'_>) -> Result<PathBuf, ConversionError> {
        std::fs::create_dir_all(&self.temp_directory).map_err(|e| {
            ConversionError::new(format!(
                "failed to create temp directory {}: {}",
                self.temp_directory.display(),
                e
            ))
        })?;

        let bundle = request.bundle;
        let paths = |files: &[crate::artifact::ArtifactFile]| -> Vec<String> {
            files
                .iter()
                .map(|f| f.path().to_string_lossy().to_string())
                .collect()
        };
        let document = json!({
            "job_id": request.job_id,
            "model_type": bundle.kind,
            "model_name": bundle.model_name(),
            "primary_file": bundle.primary_file.path(),
            "secondary_files": paths(&bundle.secondary_files),
            "extra_files": paths(&bundle.extra_files),
            "output_path": request.output_path,
            "config": request.config.toolkit_config(),
            "build": request.config.build_config(),
            "torch": request.config.torch_config(),
        });

        let path = self
            .temp_directory
            .join(format!("{}.config.json", request.job_id));
        let content = serde_json::to_vec_pretty(&document)
            .map_err(|e| ConversionError::new(format!("failed to encode config: {}", e)))?;
        std::fs::write(&path, content).map_err(|e| {
            ConversionError::new(format!("failed to write {}: {}", path.display(), e))
        })?;
        Ok(path)
    }

    fn run(
        &self,
        request: &ConversionRequest<'_>,
        config_path: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<(), ConversionError> {
        let args = self.build_args(request, config_path);
        debug!("Running {} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ConversionError::new(format!(
                    "failed to start converter '{}': {}",
                    self.program, e
                ))
            })?;

        let (line_tx, line_rx) = unbounded::<OutputLine>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Stream::Stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, Stream::Stderr, line_tx.clone()));
        }
        drop(line_tx);

        let mut last_stderr: Option<String> = None;
        let mut killed = false;
        loop {
            match line_rx.recv_timeout(self.poll_interval) {
                Ok(line) => match line.stream {
                    Stream::Stdout => match self.parse_progress(&line.text) {
                        Some(percent) => progress.progress(percent),
                        None => progress.log(&line.text),
                    },
                    Stream::Stderr => {
                        progress.log(&format!("stderr: {}", line.text));
                        if !line.text.trim().is_empty() {
                            last_stderr = Some(line.text);
                        }
                    }
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if !killed && progress.is_cancel_requested() {
                warn!("Cancel requested, stopping converter for job {}", request.job_id);
                if let Err(e) = child.kill() {
                    warn!("Failed to kill converter for job {}: {}", request.job_id, e);
                }
                killed = true;
            }
        }

        for reader in readers {
            if reader.join().is_err() {
                warn!("Output reader for job {} panicked", request.job_id);
            }
        }

        let status = child
            .wait()
            .map_err(|e| ConversionError::new(format!("failed to wait for converter: {}", e)))?;

        if killed {
            return Err(ConversionError::new(
                "conversion cancelled: converter process was terminated",
            ));
        }
        if !status.success() {
            return Err(ConversionError::new(
                last_stderr.unwrap_or_else(|| format!("converter exited with {}", status)),
            ));
        }
        if !request.output_path.exists() {
            return Err(ConversionError::new(format!(
                "converter finished without producing {}",
                request.output_path.display()
            )));
        }
        Ok(())
    }
}

impl ConversionExecutor for CommandExecutor {
    fn convert(
        &self,
        request: &ConversionRequest<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<(), ConversionError> {
        let config_path = self.write_config_file(request)?;
        let result = self.run(request, &config_path, progress);
        if let Err(e) = std::fs::remove_file(&config_path) {
            debug!("Could not remove {}: {}", config_path.display(), e);
        }
        result
    }
}

fn spawn_reader<R>(source: R, stream: Stream, sender: Sender<OutputLine>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        for text in BufReader::new(source).lines().map_while(Result::ok) {
            if sender.send(OutputLine { stream, text }).is_err() {
                break;
            }
        }
    })
}
