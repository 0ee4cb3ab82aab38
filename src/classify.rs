use std::collections::BTreeSet;

use tracing::{debug, instrument};

use crate::github::{GitHubApi, GitHubError, PullRequestRef};

/// Files under this prefix belong to the ESPHome package.
pub const ROOT_PREFIX: &str = "esphome/";
/// Files under this prefix belong to an individual component.
pub const COMPONENT_PREFIX: &str = "esphome/components/";

/// Which parts of the monorepo a pull request touches.
///
/// Sets are sorted so rendering from them is deterministic regardless of
/// the order the file listing came back in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeClassification {
    /// First path segment below `esphome/` (e.g. `components`, `core`, `const.py`)
    pub top_level_dirs: BTreeSet<String>,
    /// Component directory names below `esphome/components/`
    pub component_dirs: BTreeSet<String>,
}

impl ChangeClassification {
    pub fn has_component_changes(&self) -> bool {
        !self.component_dirs.is_empty()
    }

    /// True when every change below `esphome/` is inside one top-level entry.
    pub fn is_single_top_level(&self) -> bool {
        self.top_level_dirs.len() == 1
    }
}

/// Segment right after `prefix`, up to the next `/` or the end of the path.
fn segment_after<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    let segment = rest.split('/').next()?;
    (!segment.is_empty()).then_some(segment)
}

/// Component directory named by a path. A file sitting directly in
/// `esphome/components/` names no component.
fn component_of(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(COMPONENT_PREFIX)?;
    let (segment, _) = rest.split_once('/')?;
    (!segment.is_empty()).then_some(segment)
}

/// Classify a list of changed file paths.
pub fn classify_paths<'a, I>(paths: I) -> ChangeClassification
where
    I: IntoIterator<Item = &'a str>,
{
    let mut classification = ChangeClassification::default();
    for path in paths {
        if let Some(top) = segment_after(path, ROOT_PREFIX) {
            classification.top_level_dirs.insert(top.to_string());
        }
        if let Some(component) = component_of(path) {
            classification.component_dirs.insert(component.to_string());
        }
    }
    if classification.top_level_dirs.is_empty() {
        return ChangeClassification::default();
    }
    classification
}

/// Fetch the complete file listing of a pull request and classify it.
///
/// Any failure while listing aborts classification; no partial result is
/// ever returned.
#[instrument(skip_all, fields(pr = %pr))]
pub async fn classify(
    api: &dyn GitHubApi,
    pr: &PullRequestRef,
) -> Result<ChangeClassification, GitHubError> {
    let files = api.list_pull_request_files(pr).await?;
    let classification = classify_paths(files.iter().map(|f| f.filename.as_str()));
    debug!(
        files = files.len(),
        top_level = ?classification.top_level_dirs,
        components = ?classification.component_dirs,
        "classified changes"
    );
    Ok(classification)
}
