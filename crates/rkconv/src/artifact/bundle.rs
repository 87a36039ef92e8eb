use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::kind::ModelKind;

/// One uploaded file. `name` is the name the client sent, `path` is where
/// the upload layer stored it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    name: String,
    path: PathBuf,
    extension: String,
    size: u64,
}

impl ArtifactFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, size: u64) -> Self {
        let name = name.into();
        let extension = extension_of(&name);
        Self {
            name,
            path: path.into(),
            extension,
            size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lower-cased extension including the leading dot, or empty.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Name without its last extension.
    pub fn stem(&self) -> &str {
        stem_of(&self.name)
    }
}

/// Extension of a file name: text after the last dot, lower-cased, with the
/// dot. A leading dot alone (".profile") does not start an extension.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx..].to_lowercase(),
        _ => String::new(),
    }
}

pub(crate) fn stem_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// A self-consistent set of files that together form one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub kind: ModelKind,
    pub primary_file: ArtifactFile,
    #[serde(default)]
    pub secondary_files: Vec<ArtifactFile>,
    #[serde(default)]
    pub extra_files: Vec<ArtifactFile>,
}

impl ArtifactBundle {
    pub fn single(kind: ModelKind, primary_file: ArtifactFile) -> Self {
        Self {
            kind,
            primary_file,
            secondary_files: Vec::new(),
            extra_files: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, files: Vec<ArtifactFile>) -> Self {
        self.secondary_files = files;
        self
    }

    pub fn with_extra(mut self, files: Vec<ArtifactFile>) -> Self {
        self.extra_files = files;
        self
    }

    /// Name of the model, taken from the primary file's original name.
    pub fn model_name(&self) -> &str {
        self.primary_file.stem()
    }

    /// Primary file followed by the secondary files.
    pub fn all_files(&self) -> impl Iterator<Item = &ArtifactFile> {
        std::iter::once(&self.primary_file).chain(self.secondary_files.iter())
    }

    pub fn file_count(&self) -> usize {
        1 + self.secondary_files.len() + self.extra_files.len()
    }
}
