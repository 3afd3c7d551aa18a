//! Walking the commits named by a refactoring report.
//!
//! The walker holds its own read-only [`Repository`] so that history lookups
//! never contend with the working tree being checked out elsewhere.
//!
//! Only the first parent of a commit is treated as its predecessor. Merge
//! commits are therefore measured against their first parent only.

use git2::{Repository, Sort};
use std::path::Path;

use crate::analysis::git::{commit_record, find_commit_record};
use crate::error::Result;
use crate::types::{CommitRecord, RefactoringReport};

pub struct CommitWalker {
    repo: Repository,
    name: String,
}

impl CommitWalker {
    /// Open a walker over the repository at `path`
    pub fn open(path: &Path, name: &str) -> Result<Self> {
        Ok(Self::from_repository(Repository::open(path)?, name))
    }

    pub fn from_repository(repo: Repository, name: &str) -> Self {
        Self {
            repo,
            name: name.to_string(),
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lazily resolve the report's commits in report order.
    ///
    /// Each call starts a fresh walk. A hash missing from history yields
    /// `Err(MineError::CommitNotFound)` for that item only.
    pub fn targets<'a>(&'a self, report: &'a RefactoringReport) -> Targets<'a> {
        Targets {
            walker: self,
            hashes: report.target_hashes().into_iter(),
        }
    }

    /// Resolve a single commit
    pub fn resolve(&self, hash: &str) -> Result<CommitRecord> {
        find_commit_record(&self.repo, &self.name, hash)
    }

    /// Full history reachable from HEAD, oldest first
    pub fn history(&self) -> Result<Vec<CommitRecord>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;

        revwalk
            .map(|oid| -> Result<CommitRecord> {
                let commit = self.repo.find_commit(oid?)?;
                Ok(commit_record(&commit))
            })
            .collect()
    }
}

/// Iterator returned by [`CommitWalker::targets`]
pub struct Targets<'a> {
    walker: &'a CommitWalker,
    hashes: std::vec::IntoIter<&'a str>,
}

impl Iterator for Targets<'_> {
    type Item = Result<CommitRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.hashes.next().map(|hash| self.walker.resolve(hash))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.hashes.size_hint()
    }
}

impl ExactSizeIterator for Targets<'_> {}
