/// Benchmarks for history walking, diff analysis, and effort aggregation.
use criterion::{criterion_group, criterion_main, Criterion};
use git2::{Repository, Signature};
use repominer::analysis::{analyze_diffs, CommitWalker};
use repominer::types::{EffortRecord, RefactoringEvent, RefactoringReport, ReportCommit};
use repominer::utils::aggregation::{effort_by_developer, effort_by_refactoring_type};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const REFACTORING_TYPES: &[&str] = &["Extract Method", "Rename Method", "Move Class"];

/// Build a repository with 100 commits, each growing one of ten Java files
fn setup_large_test_repo() -> (TempDir, Repository) {
    let temp_dir = TempDir::new().unwrap();
    let repo = Repository::init(temp_dir.path()).unwrap();

    for i in 0..100 {
        let file_name = format!("src/File{}.java", i % 10);
        let file_path = temp_dir.path().join(&file_name);
        fs::create_dir_all(file_path.parent().unwrap()).unwrap();
        let mut content = fs::read_to_string(&file_path).unwrap_or_default();
        content.push_str(&format!("    int field{i};\n"));
        fs::write(&file_path, content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(&file_name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();

        // Alternate between different authors
        let author = if i % 2 == 0 {
            Signature::now("Test User", "test@example.com").unwrap()
        } else {
            Signature::now("Another User", "another@example.com").unwrap()
        };

        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        {
            let tree = repo.find_tree(tree_id).unwrap();
            repo.commit(
                Some("HEAD"),
                &author,
                &author,
                &format!("Grow {}", file_name),
                &tree,
                &parents,
            )
            .unwrap();
        }
    }

    (temp_dir, repo)
}

fn report_for(walker: &CommitWalker) -> RefactoringReport {
    RefactoringReport {
        commits: walker
            .history()
            .unwrap()
            .into_iter()
            .rev()
            .enumerate()
            .map(|(i, c)| ReportCommit {
                sha1: c.hash,
                refactorings: vec![RefactoringEvent {
                    kind: REFACTORING_TYPES[i % REFACTORING_TYPES.len()].to_string(),
                    description: None,
                    left_side_locations: vec![],
                    right_side_locations: vec![],
                    extra: Default::default(),
                }],
                extra: Default::default(),
            })
            .collect(),
    }
}

fn bench_history(c: &mut Criterion) {
    let (temp_dir, _repo) = setup_large_test_repo();
    let walker = CommitWalker::open(temp_dir.path(), "bench").unwrap();
    let report = report_for(&walker);
    let mut group = c.benchmark_group("history");

    group.bench_function("walk_full_history", |b| {
        b.iter(|| walker.history().unwrap().len())
    });

    group.bench_function("resolve_report_targets", |b| {
        b.iter(|| walker.targets(&report).filter(|t| t.is_ok()).count())
    });

    group.bench_function("analyze_diffs", |b| {
        b.iter(|| analyze_diffs(&walker, &report).unwrap().len())
    });

    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let (temp_dir, _repo) = setup_large_test_repo();
    let walker = CommitWalker::open(temp_dir.path(), "bench").unwrap();
    let report = report_for(&walker);
    let records: Vec<EffortRecord> = walker
        .targets(&report)
        .filter_map(|t| t.ok())
        .filter_map(|commit| {
            let parent = commit.parent_hash.clone()?;
            Some(EffortRecord::new(&commit, &parent, 100, 101))
        })
        .collect();
    let mut group = c.benchmark_group("aggregation");

    group.bench_function("effort_by_developer", |b| {
        b.iter(|| effort_by_developer(&records))
    });

    group.bench_function("effort_by_refactoring_type", |b| {
        b.iter(|| effort_by_refactoring_type(&records, &report))
    });

    group.finish();
}

criterion_group!(benches, bench_history, bench_aggregation);
criterion_main!(benches);
