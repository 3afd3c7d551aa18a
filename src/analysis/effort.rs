//! # Effort Correlation
//!
//! For each commit named by the refactoring report, measure recognized lines
//! of code at its first parent and at the commit itself, and attribute the
//! absolute difference to the commit's author.
//!
//! A measurement is only recorded when the working tree was verified to be at
//! the expected commit. Anything else skips the commit with a warning; no
//! record is zero-filled.

use tracing::{debug, info, warn};

use crate::analysis::tools::SizeMeter;
use crate::analysis::walker::CommitWalker;
use crate::analysis::worktree::Checkout;
use crate::types::{CommitRecord, CommitWarning, EffortRecord, RefactoringReport, SkipReason};

/// Records and warnings produced by one correlation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffortOutcome {
    /// In report order
    pub records: Vec<EffortRecord>,
    pub warnings: Vec<CommitWarning>,
    /// Whether the tree was put back on the default branch afterwards
    pub restored: bool,
}

pub struct EffortCorrelator<'a> {
    tree: &'a mut dyn Checkout,
    meter: &'a dyn SizeMeter,
}

impl<'a> EffortCorrelator<'a> {
    pub fn new(tree: &'a mut dyn Checkout, meter: &'a dyn SizeMeter) -> Self {
        Self { tree, meter }
    }

    /// Correlate every target commit, then restore `default_branch` if given
    pub fn correlate(
        &mut self,
        walker: &CommitWalker,
        report: &RefactoringReport,
        default_branch: Option<&str>,
    ) -> EffortOutcome {
        let mut outcome = EffortOutcome::default();

        for (hash, target) in report.target_hashes().into_iter().zip(walker.targets(report)) {
            let result = match target {
                Ok(commit) => self.correlate_commit(&commit),
                Err(e) => Err(CommitWarning {
                    commit_hash: hash.to_string(),
                    reason: SkipReason::CommitNotFound,
                    detail: e.to_string(),
                }),
            };

            match result {
                Ok(record) => {
                    info!(
                        commit = %record.commit_hash,
                        developer = %record.developer,
                        loc_before = record.loc_before,
                        loc_after = record.loc_after,
                        delta = record.delta,
                        "measured effort"
                    );
                    outcome.records.push(record);
                }
                Err(warning) => {
                    warn!(
                        repository = %walker.name(),
                        commit = %warning.commit_hash,
                        reason = ?warning.reason,
                        "skipping commit: {}",
                        warning.detail
                    );
                    outcome.warnings.push(warning);
                }
            }
        }

        if let Some(branch) = default_branch {
            outcome.restored = self.tree.checkout(branch);
            if !outcome.restored {
                warn!(repository = %walker.name(), branch, "could not restore default branch");
            }
        }

        outcome
    }

    /// Measure one commit against its first parent
    pub fn correlate_commit(&mut self, commit: &CommitRecord) -> Result<EffortRecord, CommitWarning> {
        let Some(parent) = commit.parent_hash.as_deref() else {
            return Err(CommitWarning {
                commit_hash: commit.hash.clone(),
                reason: SkipReason::NoParent,
                detail: "root commit has no parent to measure against".to_string(),
            });
        };

        if commit.is_merge() {
            debug!(
                commit = %commit.hash,
                parents = commit.parent_count,
                first_parent = %parent,
                "merge measured against its first parent"
            );
        }

        let loc_before = self.measure_at(&commit.hash, parent, SkipReason::ParentCheckoutFailed)?;
        let loc_after = self.measure_at(&commit.hash, &commit.hash, SkipReason::CommitCheckoutFailed)?;

        Ok(EffortRecord::new(commit, parent, loc_before, loc_after))
    }

    fn measure_at(
        &mut self,
        target: &str,
        reference: &str,
        on_checkout_failure: SkipReason,
    ) -> Result<u64, CommitWarning> {
        let warning = |reason: SkipReason, detail: String| CommitWarning {
            commit_hash: target.to_string(),
            reason,
            detail,
        };

        if !self.tree.checkout(reference) {
            return Err(warning(
                on_checkout_failure,
                format!("checkout of {reference} failed"),
            ));
        }

        match self.tree.head_commit_hash() {
            Some(head) if head == reference => {}
            head => {
                return Err(warning(
                    on_checkout_failure,
                    format!(
                        "working tree is at {} instead of {reference}",
                        head.unwrap_or_else(|| "nothing".to_string())
                    ),
                ))
            }
        }

        self.meter
            .measure_size(self.tree.path())
            .map(|metric| metric.total)
            .map_err(|e| warning(SkipReason::MeasurementFailed, e.to_string()))
    }
}
