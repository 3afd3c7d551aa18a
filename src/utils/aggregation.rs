use std::collections::BTreeMap;

use crate::types::{DeveloperEffort, EffortRecord, RefactoringReport, RefactoringTypeEffort};

/// Sum measured effort per developer
pub fn effort_by_developer(records: &[EffortRecord]) -> BTreeMap<String, DeveloperEffort> {
    let mut totals: BTreeMap<String, DeveloperEffort> = BTreeMap::new();
    for record in records {
        let entry = totals.entry(record.developer.clone()).or_default();
        entry.commits += 1;
        entry.total_delta += record.delta;
    }
    totals
}

/// Sum measured effort per refactoring type.
///
/// A commit contributes its whole delta to every distinct type it contains.
/// Totals across types therefore overlap and must not be summed.
pub fn effort_by_refactoring_type(
    records: &[EffortRecord],
    report: &RefactoringReport,
) -> BTreeMap<String, RefactoringTypeEffort> {
    let mut totals: BTreeMap<String, RefactoringTypeEffort> = BTreeMap::new();
    for record in records {
        for kind in report.refactoring_types_for(&record.commit_hash) {
            let entry = totals.entry(kind).or_default();
            entry.commits += 1;
            entry.total_delta += record.delta;
        }
    }
    totals
}
