//! # Common Types
//!
//! This module contains the types shared by the mining pipeline: commit
//! metadata read from history, the refactoring report produced by the
//! detector, size measurements, and the records persisted as JSON artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// A read-only view of a cloned working tree.
///
/// The working tree itself is owned by
/// [`WorkingTree`](crate::analysis::worktree::WorkingTree); this is the
/// identifying information other components may copy around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    /// Filesystem root of the working tree
    pub root: PathBuf,
    /// Remote URL the tree was cloned from, already redacted
    pub remote: String,
    /// The reference currently checked out (branch name or commit hash)
    pub current_ref: Option<String>,
}

/// Metadata for one commit, read from version-control history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Full hexadecimal commit hash
    pub hash: String,
    /// First parent hash, `None` for root commits
    pub parent_hash: Option<String>,
    /// Number of parents; anything above one is a merge measured against its first parent
    pub parent_count: usize,
    /// Author name, falling back to the email when the name is not valid UTF-8
    pub author: String,
    /// Author timestamp
    pub timestamp: DateTime<Utc>,
    /// Full commit message
    pub message: String,
}

impl CommitRecord {
    pub fn is_merge(&self) -> bool {
        self.parent_count > 1
    }
}

/// A source location attached to a detected refactoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeLocation {
    pub file_path: String,
    #[serde(default)]
    pub start_line: u64,
    #[serde(default)]
    pub end_line: u64,
    /// Fields the detector emits that the pipeline does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One refactoring event detected in a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefactoringEvent {
    /// Refactoring type, e.g. "Extract Method"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub left_side_locations: Vec<CodeLocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub right_side_locations: Vec<CodeLocation>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The refactorings detected in a single commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCommit {
    pub sha1: String,
    #[serde(default)]
    pub refactorings: Vec<RefactoringEvent>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The refactoring detector's output for a whole repository.
///
/// Commits are kept in the order the detector emitted them; every downstream
/// pass iterates in this order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefactoringReport {
    pub commits: Vec<ReportCommit>,
}

impl RefactoringReport {
    /// Commit hashes in report order, duplicates removed (first occurrence wins)
    pub fn target_hashes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.commits
            .iter()
            .map(|c| c.sha1.as_str())
            .filter(|sha| seen.insert(*sha))
            .collect()
    }

    /// Refactorings recorded for a commit, across duplicate entries
    pub fn refactorings_for<'a>(
        &'a self,
        hash: &'a str,
    ) -> impl Iterator<Item = &'a RefactoringEvent> + 'a {
        self.commits
            .iter()
            .filter(move |c| c.sha1 == hash)
            .flat_map(|c| c.refactorings.iter())
    }

    /// Distinct refactoring types recorded for a commit
    pub fn refactoring_types_for(&self, hash: &str) -> Vec<String> {
        let mut types: Vec<String> = self
            .refactorings_for(hash)
            .map(|r| r.kind.clone())
            .collect();
        types.sort();
        types.dedup();
        types
    }
}

/// Lines of code for one working-tree state, restricted to recognized languages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeMetric {
    /// Sum of `by_language`
    pub total: u64,
    /// Code lines per recognized language, as named by the line counter
    pub by_language: BTreeMap<String, u64>,
}

impl SizeMetric {
    pub fn add(&mut self, language: &str, lines: u64) {
        *self.by_language.entry(language.to_string()).or_insert(0) += lines;
        self.total += lines;
    }
}

/// The effort attributed to one commit: the change in recognized lines of
/// code between its first parent and itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffortRecord {
    pub commit_hash: String,
    pub previous_commit_hash: String,
    pub developer: String,
    pub loc_before: u64,
    pub loc_after: u64,
    pub delta: u64,
}

impl EffortRecord {
    pub fn new(commit: &CommitRecord, previous: &str, loc_before: u64, loc_after: u64) -> Self {
        Self {
            commit_hash: commit.hash.clone(),
            previous_commit_hash: previous.to_string(),
            developer: commit.author.clone(),
            loc_before,
            loc_after,
            delta: loc_after.abs_diff(loc_before),
        }
    }
}

/// How a file changed in a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    TypeChange,
    Other,
}

/// Insertions and deletions for one file of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiffStat {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub change_type: ChangeType,
    pub insertions: usize,
    pub deletions: usize,
    #[serde(default)]
    pub binary: bool,
}

/// Aggregated diff statistics for one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
    pub files: Vec<FileDiffStat>,
}

/// One entry of `diff_analysis.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub commit_hash: String,
    /// `None` when the commit is a root commit (diffed against the empty tree)
    pub previous_commit_hash: Option<String>,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub diff_stats: DiffStats,
    /// Unified patch text keyed by file path
    pub diff_content: BTreeMap<String, String>,
}

/// Which correlation step a skipped commit failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    CommitNotFound,
    NoParent,
    ParentCheckoutFailed,
    CommitCheckoutFailed,
    MeasurementFailed,
}

/// A per-commit problem that caused the commit to be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitWarning {
    pub commit_hash: String,
    pub reason: SkipReason,
    pub detail: String,
}

/// Effort totals for one developer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperEffort {
    pub commits: usize,
    pub total_delta: u64,
}

/// Effort totals for the commits containing one refactoring type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactoringTypeEffort {
    pub commits: usize,
    pub total_delta: u64,
}

/// Contents of `summary.json`, one per successfully mined repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub repository: String,
    pub default_branch: String,
    pub head_commit: String,
    /// Size of the default branch head
    pub head_size: SizeMetric,
    pub commits_in_report: usize,
    pub diff_records: usize,
    pub effort_records: usize,
    pub effort_by_developer: BTreeMap<String, DeveloperEffort>,
    pub effort_by_refactoring_type: BTreeMap<String, RefactoringTypeEffort>,
    pub warnings: Vec<CommitWarning>,
    pub output_dir: PathBuf,
}
