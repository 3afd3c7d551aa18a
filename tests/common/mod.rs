#![allow(dead_code)]

use git2::{IndexAddOption, Repository, Signature, Sort};
use repominer::analysis::{RefactoringDetector, SizeMeter};
use repominer::config::MinerConfig;
use repominer::error::{MineError, Result};
use repominer::pipeline::artifacts::write_json;
use repominer::retry::RetryPolicy;
use repominer::types::{RefactoringEvent, RefactoringReport, ReportCommit, SizeMetric};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const FOO_A: &str = "class Foo {\n}\n";
pub const FOO_B: &str = "class Foo {\n    int a;\n    int b;\n    int c;\n}\n";
pub const FOO_C: &str = "class Foo {\n    int a;\n}\n";
pub const BAR_C: &str = "class Bar {\n    int x;\n    int y;\n}\n";

/// A git repository built commit by commit on `main`
pub struct SourceRepo {
    pub path: PathBuf,
    pub repo: Repository,
}

impl SourceRepo {
    pub fn init(path: &Path) -> Self {
        fs::create_dir_all(path).unwrap();
        let repo = Repository::init(path).unwrap();
        repo.set_head("refs/heads/main").unwrap();
        Self {
            path: path.to_path_buf(),
            repo,
        }
    }

    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn commit(&self, author: &str, files: &[(&str, &str)], message: &str) -> String {
        for (name, content) in files {
            let path = self.path.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
        }

        let mut index = self.repo.index().unwrap();
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None).unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();

        let email = format!("{}@example.com", author.to_lowercase());
        let signature = Signature::now(author, &email).unwrap();
        let parents: Vec<git2::Commit> = self
            .repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        self.repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parent_refs)
            .unwrap()
            .to_string()
    }
}

/// Hashes of the three-commit history built by [`build_history`]
pub struct History {
    pub a: String,
    pub b: String,
    pub c: String,
}

/// A -> B -> C, where Java LOC goes 2 -> 5 -> 7
pub fn build_history(source: &SourceRepo) -> History {
    let a = source.commit(
        "Ada",
        &[("src/Foo.java", FOO_A), ("README.md", "hi\n")],
        "Initial commit",
    );
    let b = source.commit("Grace", &[("src/Foo.java", FOO_B)], "Add fields");
    let c = source.commit(
        "Ada",
        &[("src/Foo.java", FOO_C), ("src/Bar.java", BAR_C)],
        "Extract Bar",
    );
    History { a, b, c }
}

pub fn test_config(root: &Path) -> MinerConfig {
    MinerConfig {
        token: None,
        work_root: root.join("clones"),
        output_root: root.join("results"),
        workers: 2,
        retry: RetryPolicy::none(),
        ..MinerConfig::default()
    }
}

pub fn event(kind: &str) -> RefactoringEvent {
    RefactoringEvent {
        kind: kind.to_string(),
        description: Some(format!("{kind} in Foo")),
        left_side_locations: vec![],
        right_side_locations: vec![],
        extra: Default::default(),
    }
}

/// Reports every commit in history, newest first, with one "Rename Method"
/// each. Fails for repositories whose directory is named in `broken`.
pub struct HistoryDetector {
    pub broken: Vec<String>,
}

impl HistoryDetector {
    pub fn new() -> Self {
        Self { broken: Vec::new() }
    }

    pub fn failing_for(name: &str) -> Self {
        Self {
            broken: vec![name.to_string()],
        }
    }
}

impl RefactoringDetector for HistoryDetector {
    fn detect_refactorings(&self, repo_root: &Path, output: &Path) -> Result<RefactoringReport> {
        let name = repo_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.broken.contains(&name) {
            // Leave a partial file behind, like a crashed run would
            fs::write(output, "{\"commits\": [")?;
            return Err(MineError::ToolInvocationFailure {
                tool: "RefactoringMiner".to_string(),
                reason: "exit status: 1".to_string(),
            });
        }

        let repo = Repository::open(repo_root)?;
        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            commits.push(ReportCommit {
                sha1: oid?.to_string(),
                refactorings: vec![event("Rename Method")],
                extra: Default::default(),
            });
        }
        let report = RefactoringReport { commits };
        write_json(output, &report)?;
        Ok(report)
    }
}

/// Counts lines of `.java` files, skipping `.git`
pub struct JavaLineMeter;

impl SizeMeter for JavaLineMeter {
    fn measure_size(&self, root: &Path) -> Result<SizeMetric> {
        let mut metric = SizeMetric::default();
        count_java(root, &mut metric)?;
        Ok(metric)
    }
}

fn count_java(dir: &Path, metric: &mut SizeMetric) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.file_name().is_some_and(|n| n == ".git") {
            continue;
        }
        if path.is_dir() {
            count_java(&path, metric)?;
        } else if path.extension().is_some_and(|e| e == "java") {
            let lines = fs::read_to_string(&path)?.lines().count() as u64;
            metric.add("Java", lines);
        }
    }
    Ok(())
}

pub fn workspace() -> TempDir {
    TempDir::new().unwrap()
}
