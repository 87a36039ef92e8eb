//! Recognition of uploaded model files.
//!
//! A client uploads a flat list of files; the classifier groups them into
//! bundles (graph plus weights) and validates that the bundle it picks is
//! complete before a job is created.

pub mod bundle;
pub mod classifier;
pub mod kind;

pub use bundle::{extension_of, ArtifactBundle, ArtifactFile};
pub use classifier::ArtifactClassifier;
pub use kind::{single_file_kind, ModelKind, DEFAULT_ALLOWED_EXTENSIONS, MODEL_KEYWORDS};
