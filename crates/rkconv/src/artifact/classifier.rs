use std::collections::BTreeMap;

use log::debug;

use super::bundle::{stem_of, ArtifactBundle, ArtifactFile};
use super::kind::{
    paired_primary_kind, single_file_kind, MatchRule, ModelKind, GROUP_SUFFIXES,
    MODEL_KEYWORDS, MULTI_FILE_FAMILIES, TRIPLE_GRAPH, TRIPLE_INDEX, TRIPLE_SHARD,
};
use crate::error::AdmissionError;

/// Shortest common substring that counts as a name match.
const MIN_SHARED_SUBSTRING: usize = 3;

/// Groups uploaded files into model bundles.
///
/// Classification is pure: it looks only at names and extensions. Disk
/// access happens in [`ArtifactClassifier::validate`].
pub struct ArtifactClassifier {
    keywords: Vec<String>,
}

impl Default for ArtifactClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactClassifier {
    pub fn new() -> Self {
        Self::with_keywords(MODEL_KEYWORDS.iter().map(|k| k.to_string()).collect())
    }

    fn with_keywords(keywords: Vec<String>) -> Self {
        let keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        Self { keywords }
    }

    /// Splits `files` into bundles. Files that fit no rule are dropped.
    pub fn classify(&self, files: &[ArtifactFile]) -> Vec<ArtifactBundle> {
        if let Some(bundle) = match_triple(files) {
            return vec![bundle];
        }

        let mut used = vec![false; files.len()];
        let mut bundles = Vec::new();

        for family in MULTI_FILE_FAMILIES {
            match family.rule {
                MatchRule::Pair { primary, secondary } => self.match_pairs(
                    files,
                    &mut used,
                    family.kind,
                    (primary, secondary),
                    &mut bundles,
                ),
                MatchRule::Group { fragments, primary } => match_groups(
                    files,
                    &mut used,
                    family.kind,
                    (fragments, primary),
                    &mut bundles,
                ),
            }
        }

        for (idx, file) in files.iter().enumerate() {
            if used[idx] {
                continue;
            }
            if let Some(kind) = single_file_kind(file.extension()) {
                used[idx] = true;
                bundles.push(ArtifactBundle::single(kind, file.clone()));
            }
        }

        // Primaries that found no weights still surface, so validation can
        // report what is missing instead of "no model".
        for (idx, file) in files.iter().enumerate() {
            if used[idx] {
                continue;
            }
            if let Some(kind) = paired_primary_kind(file.extension()) {
                used[idx] = true;
                bundles.push(ArtifactBundle::single(kind, file.clone()));
            }
        }

        for (idx, file) in files.iter().enumerate() {
            if !used[idx] {
                debug!("Ignoring unrecognised upload: {}", file.name());
            }
        }

        bundles
    }

    /// Checks that every file of the bundle exists and that the weights its
    /// kind requires are present.
    pub fn validate(&self, bundle: &ArtifactBundle) -> Result<(), String> {
        let primary = &bundle.primary_file;
        if !primary.path().exists() {
            return Err(format!("primary file {} does not exist", primary.name()));
        }
        for file in &bundle.secondary_files {
            if !file.path().exists() {
                return Err(format!("secondary file {} does not exist", file.name()));
            }
        }

        let has_secondary =
            |ext: &str| bundle.secondary_files.iter().any(|f| f.extension() == ext);

        match bundle.kind {
            ModelKind::Caffe
                if primary.extension() == ".prototxt" && !has_secondary(".caffemodel") =>
            {
                Err("missing .caffemodel weight file".to_string())
            }
            ModelKind::Darknet if primary.extension() == ".cfg" && !has_secondary(".weights") => {
                Err("missing .weights weight file".to_string())
            }
            ModelKind::Tensorflow
                if !bundle
                    .all_files()
                    .any(|f| matches!(f.extension(), ".pb" | ".meta")) =>
            {
                Err("missing graph definition file (.pb or .meta)".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Classifies and validates, returning the first bundle found.
    pub fn classify_and_validate(
        &self,
        files: &[ArtifactFile],
    ) -> Result<ArtifactBundle, AdmissionError> {
        let bundle = self
            .classify(files)
            .into_iter()
            .next()
            .ok_or(AdmissionError::NoValidModel)?;

        self.validate(&bundle)
            .map_err(AdmissionError::IncompleteBundle)?;

        debug!(
            "Identified {} model '{}' with {} file(s)",
            bundle.kind,
            bundle.model_name(),
            bundle.file_count()
        );
        Ok(bundle)
    }

    fn match_pairs(
        &self,
        files: &[ArtifactFile],
        used: &mut [bool],
        kind: ModelKind,
        (primary_ext, secondary_ext): (&str, &str),
        bundles: &mut Vec<ArtifactBundle>,
    ) {
        for p in sorted_unused(files, used, |f| f.extension() == primary_ext) {
            let primary = &files[p];
            let exact = sorted_unused(files, used, |f| {
                f.extension() == secondary_ext && f.stem() == primary.stem()
            });

            let matched = if exact.is_empty() {
                self.fuzzy_match(primary, files, used, secondary_ext)
                    .into_iter()
                    .collect()
            } else {
                exact
            };

            if matched.is_empty() {
                debug!("No {} file found for {}", secondary_ext, primary.name());
                continue;
            }

            used[p] = true;
            for &m in &matched {
                used[m] = true;
            }
            bundles.push(
                ArtifactBundle::single(kind, primary.clone())
                    .with_secondary(matched.iter().map(|&m| files[m].clone()).collect()),
            );
        }
    }

    /// Picks a secondary file for `primary` when no base name matches
    /// exactly. Strategies run in order over name-sorted candidates.
    fn fuzzy_match(
        &self,
        primary: &ArtifactFile,
        files: &[ArtifactFile],
        used: &[bool],
        secondary_ext: &str,
    ) -> Option<usize> {
        let candidates = sorted_unused(files, used, |f| f.extension() == secondary_ext);
        let primary_base = primary.stem().to_lowercase();
        let bases: Vec<(usize, String)> = candidates
            .iter()
            .map(|&idx| (idx, files[idx].stem().to_lowercase()))
            .collect();

        bases
            .iter()
            .find(|(_, base)| self.shares_keyword(&primary_base, base))
            .or_else(|| {
                bases.iter().find(|(_, base)| {
                    primary_base.contains(base.as_str()) || base.contains(primary_base.as_str())
                })
            })
            .or_else(|| {
                bases
                    .iter()
                    .find(|(_, base)| shares_substring(&primary_base, base, MIN_SHARED_SUBSTRING))
            })
            .map(|(idx, _)| *idx)
            .or_else(|| match candidates.as_slice() {
                [only] => Some(*only),
                _ => None,
            })
    }

    fn shares_keyword(&self, a: &str, b: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| a.contains(k.as_str()) && b.contains(k.as_str()))
    }
}

fn match_triple(files: &[ArtifactFile]) -> Option<ArtifactBundle> {
    if files.len() != 3 {
        return None;
    }
    let find = |ext: &str| files.iter().find(|f| f.extension() == ext);
    let graph = find(TRIPLE_GRAPH)?;
    let index = find(TRIPLE_INDEX)?;
    let shard = find(TRIPLE_SHARD)?;

    Some(
        ArtifactBundle::single(ModelKind::Tensorflow, graph.clone())
            .with_secondary(vec![shard.clone()])
            .with_extra(vec![index.clone()]),
    )
}

fn match_groups(
    files: &[ArtifactFile],
    used: &mut [bool],
    kind: ModelKind,
    (fragments, primary_exts): (&[&str], &[&str]),
    bundles: &mut Vec<ArtifactBundle>,
) {
    let mut clusters: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for idx in sorted_unused(files, used, |f| belongs_to_group(f, fragments)) {
        clusters
            .entry(group_base_name(files[idx].name()))
            .or_default()
            .push(idx);
    }

    for (base, members) in clusters {
        if members.len() < 2 {
            continue;
        }
        let Some(primary) = members
            .iter()
            .copied()
            .find(|&i| primary_exts.contains(&files[i].extension()))
        else {
            debug!("Checkpoint group '{}' has no graph file", base);
            continue;
        };

        let secondary = members
            .iter()
            .filter(|&&i| i != primary)
            .map(|&i| files[i].clone())
            .collect();
        for &i in &members {
            used[i] = true;
        }
        bundles.push(ArtifactBundle::single(kind, files[primary].clone()).with_secondary(secondary));
    }
}

fn belongs_to_group(file: &ArtifactFile, fragments: &[&str]) -> bool {
    fragments
        .iter()
        .any(|frag| file.name().contains(frag) || frag.contains(file.extension()))
}

fn group_base_name(name: &str) -> String {
    let mut base = stem_of(name).to_string();
    for suffix in GROUP_SUFFIXES {
        if let Some(stripped) = base.strip_suffix(suffix) {
            base = stripped.to_string();
        }
    }
    base
}

/// Indices of unused files matching `pred`, ordered by name then path.
fn sorted_unused<F>(files: &[ArtifactFile], used: &[bool], pred: F) -> Vec<usize>
where
    F: Fn(&ArtifactFile) -> bool,
{
    let mut indices: Vec<usize> = (0..files.len())
        .filter(|&i| !used[i] && pred(&files[i]))
        .collect();
    indices.sort_by(|&a, &b| {
        files[a]
            .name()
            .cmp(files[b].name())
            .then_with(|| files[a].path().cmp(files[b].path()))
    });
    indices
}

fn shares_substring(a: &str, b: &str, len: usize) -> bool {
    let chars: Vec<char> = a.chars().collect();
    chars
        .windows(len)
        .any(|window| b.contains(window.iter().collect::<String>().as_str()))
}
