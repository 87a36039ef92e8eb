//! Model families and the file extension rules that identify them.

use serde::{Deserialize, Serialize};

/// Source framework of an uploaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Onnx,
    Tflite,
    Caffe,
    Pytorch,
    Tensorflow,
    Darknet,
}

impl ModelKind {
    pub const ALL: [ModelKind; 6] = [
        ModelKind::Onnx,
        ModelKind::Tflite,
        ModelKind::Caffe,
        ModelKind::Pytorch,
        ModelKind::Tensorflow,
        ModelKind::Darknet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Onnx => "onnx",
            ModelKind::Tflite => "tflite",
            ModelKind::Caffe => "caffe",
            ModelKind::Pytorch => "pytorch",
            ModelKind::Tensorflow => "tensorflow",
            ModelKind::Darknet => "darknet",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the files of a multi-file family are recognised.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MatchRule {
    /// One primary file paired with one weight file.
    Pair {
        primary: &'static str,
        secondary: &'static str,
    },
    /// Files clustered by a shared base name; one of them is the graph.
    Group {
        fragments: &'static [&'static str],
        primary: &'static [&'static str],
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct MultiFileFamily {
    pub kind: ModelKind,
    pub rule: MatchRule,
}

/// Multi-file families in the order the classifier applies them.
pub(crate) const MULTI_FILE_FAMILIES: &[MultiFileFamily] = &[
    MultiFileFamily {
        kind: ModelKind::Caffe,
        rule: MatchRule::Pair {
            primary: ".prototxt",
            secondary: ".caffemodel",
        },
    },
    MultiFileFamily {
        kind: ModelKind::Darknet,
        rule: MatchRule::Pair {
            primary: ".cfg",
            secondary: ".weights",
        },
    },
    MultiFileFamily {
        kind: ModelKind::Tensorflow,
        rule: MatchRule::Group {
            fragments: &["checkpoint", ".meta", ".data", ".index"],
            primary: &[".meta", ".pb"],
        },
    },
];

const SINGLE_FILE_KINDS: &[(ModelKind, &[&str])] = &[
    (ModelKind::Onnx, &[".onnx"]),
    (ModelKind::Tflite, &[".tflite"]),
    (ModelKind::Pytorch, &[".pt", ".pth", ".pytorch"]),
];

/// The fixed three-file TensorFlow export.
pub(crate) const TRIPLE_GRAPH: &str = ".pb";
pub(crate) const TRIPLE_INDEX: &str = ".index";
pub(crate) const TRIPLE_SHARD: &str = ".data-00000-of-00001";

/// Suffixes stripped, in order, when clustering TensorFlow checkpoint files.
pub(crate) const GROUP_SUFFIXES: &[&str] = &["-00000-of-00001", ".data", ".index", ".meta"];

/// Well-known architecture names used to pair differently named files.
pub const MODEL_KEYWORDS: &[&str] = &[
    "googlenet",
    "resnet",
    "vgg",
    "alexnet",
    "mobilenet",
    "squeezenet",
    "densenet",
    "inception",
    "yolo",
    "ssd",
];

/// Extensions accepted by the upload layer unless configured otherwise.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    ".onnx",
    ".tflite",
    ".pt",
    ".pth",
    ".pytorch",
    ".prototxt",
    ".caffemodel",
    ".pb",
    ".meta",
    ".index",
    ".data-00000-of-00001",
    ".cfg",
    ".weights",
];

/// Returns the kind of a self-contained model file.
pub fn single_file_kind(extension: &str) -> Option<ModelKind> {
    SINGLE_FILE_KINDS
        .iter()
        .find(|(_, exts)| exts.contains(&extension))
        .map(|(kind, _)| *kind)
}

/// Returns the kind whose paired rule uses `extension` as its primary.
pub(crate) fn paired_primary_kind(extension: &str) -> Option<ModelKind> {
    MULTI_FILE_FAMILIES.iter().find_map(|family| match family.rule {
        MatchRule::Pair { primary, .. } if primary == extension => Some(family.kind),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(ModelKind::parse("ONNX"), Some(ModelKind::Onnx));
        assert_eq!(ModelKind::parse("darknet"), Some(ModelKind::Darknet));
        assert_eq!(ModelKind::parse("keras"), None);
    }

    #[test]
    fn test_single_file_kind() {
        assert_eq!(single_file_kind(".pth"), Some(ModelKind::Pytorch));
        assert_eq!(single_file_kind(".tflite"), Some(ModelKind::Tflite));
        assert_eq!(single_file_kind(".caffemodel"), None);
    }

    #[test]
    fn test_paired_primary_kind() {
        assert_eq!(paired_primary_kind(".prototxt"), Some(ModelKind::Caffe));
        assert_eq!(paired_primary_kind(".cfg"), Some(ModelKind::Darknet));
        assert_eq!(paired_primary_kind(".meta"), None);
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ModelKind::Tensorflow).unwrap();
        assert_eq!(json, "\"tensorflow\"");
    }
}
