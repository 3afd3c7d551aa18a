use chrono::{DateTime, Utc};
use git2::{Commit, Delta, DiffFlags, DiffOptions, Patch, Repository};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::analysis::walker::CommitWalker;
use crate::error::{MineError, Result};
use crate::types::{
    ChangeType, CommitRecord, DiffRecord, DiffStats, FileDiffStat, RefactoringReport,
};

/// Build a [`CommitRecord`] from a commit object
pub fn commit_record(commit: &Commit) -> CommitRecord {
    let author = commit.author();
    let name = author
        .name()
        .filter(|n| !n.trim().is_empty())
        .or_else(|| author.email())
        .unwrap_or("Unknown")
        .to_string();

    // Use safe timestamp conversion
    let timestamp = DateTime::<Utc>::from_timestamp(author.when().seconds(), 0).unwrap_or_default();

    CommitRecord {
        hash: commit.id().to_string(),
        parent_hash: commit.parent_id(0).ok().map(|id| id.to_string()),
        parent_count: commit.parent_count(),
        author: name,
        timestamp,
        message: commit.message().unwrap_or("").trim_end().to_string(),
    }
}

/// Look up a commit by (possibly abbreviated) hash
pub fn find_commit_record(repo: &Repository, repository: &str, hash: &str) -> Result<CommitRecord> {
    let not_found = || MineError::CommitNotFound {
        repository: repository.to_string(),
        hash: hash.to_string(),
    };

    let object = repo.revparse_single(hash).map_err(|_| not_found())?;
    let commit = object.peel_to_commit().map_err(|_| not_found())?;
    Ok(commit_record(&commit))
}

fn change_type(status: Delta) -> ChangeType {
    match status {
        Delta::Added | Delta::Untracked => ChangeType::Added,
        Delta::Deleted => ChangeType::Deleted,
        Delta::Modified => ChangeType::Modified,
        Delta::Renamed => ChangeType::Renamed,
        Delta::Copied => ChangeType::Copied,
        Delta::Typechange => ChangeType::TypeChange,
        _ => ChangeType::Other,
    }
}

/// Diff a commit against its first parent (or the empty tree for a root commit)
pub fn diff_commit(repo: &Repository, commit: &Commit) -> Result<DiffRecord> {
    let record = commit_record(commit);

    let mut diff_opts = DiffOptions::new();
    diff_opts.include_untracked(false).context_lines(3);

    let tree = commit.tree()?;
    let parent_tree = match commit.parent_count() {
        0 => None,
        _ => Some(commit.parent(0)?.tree()?),
    };

    let mut diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;
    diff.find_similar(None)?;

    let mut stats = DiffStats::default();
    let mut content: BTreeMap<String, String> = BTreeMap::new();

    for idx in 0..diff.deltas().len() {
        let Some(delta) = diff.get_delta(idx) else {
            continue;
        };
        let new_path = delta.new_file().path().map(|p| p.to_string_lossy().into_owned());
        let old_path = delta.old_file().path().map(|p| p.to_string_lossy().into_owned());
        let path = match delta.status() {
            Delta::Deleted => old_path.clone(),
            _ => new_path.clone().or_else(|| old_path.clone()),
        }
        .unwrap_or_default();

        let mut patch = Patch::from_diff(&diff, idx)?;
        let (insertions, deletions) = match patch.as_ref() {
            Some(p) => {
                let (_, added, deleted) = p.line_stats()?;
                (added, deleted)
            }
            None => (0, 0),
        };
        let binary = delta.flags().contains(DiffFlags::BINARY);

        if let Some(p) = patch.as_mut() {
            let buf = p.to_buf()?;
            content
                .entry(path.clone())
                .or_default()
                .push_str(&String::from_utf8_lossy(&buf));
        }

        stats.insertions += insertions;
        stats.deletions += deletions;
        stats.files.push(FileDiffStat {
            old_path: old_path.filter(|old| *old != path),
            path,
            change_type: change_type(delta.status()),
            insertions,
            deletions,
            binary,
        });
    }
    stats.files_changed = stats.files.len();

    Ok(DiffRecord {
        commit_hash: record.hash,
        previous_commit_hash: record.parent_hash,
        author: record.author,
        timestamp: record.timestamp,
        message: record.message,
        diff_stats: stats,
        diff_content: content,
    })
}

/// Build the diff analysis for every commit in the report, in report order.
///
/// Commits missing from history are logged and left out; any other git
/// failure aborts the pass.
pub fn analyze_diffs(walker: &CommitWalker, report: &RefactoringReport) -> Result<Vec<DiffRecord>> {
    let mut records = Vec::with_capacity(report.commits.len());

    for target in walker.targets(report) {
        let commit = match target {
            Ok(commit) => commit,
            Err(e @ MineError::CommitNotFound { .. }) => {
                warn!("skipping diff analysis: {}", e);
                continue;
            }
            Err(e) => return Err(e),
        };

        let oid = git2::Oid::from_str(&commit.hash)?;
        let git_commit = walker.repository().find_commit(oid)?;
        let record = diff_commit(walker.repository(), &git_commit)?;
        debug!(
            commit = %record.commit_hash,
            files = record.diff_stats.files_changed,
            insertions = record.diff_stats.insertions,
            deletions = record.diff_stats.deletions,
            "diffed commit"
        );
        records.push(record);
    }

    // Optimize memory usage by shrinking vectors if they're much larger than needed
    if records.capacity() > records.len() * 2 {
        records.shrink_to_fit();
    }

    Ok(records)
}
