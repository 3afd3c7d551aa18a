//! # Pipeline Orchestrator
//!
//! Runs the whole mining pipeline for one repository:
//!
//! 1. Clone (or reuse) the working tree
//! 2. Resolve and check out the default branch
//! 3. Detect refactorings over the full history
//! 4. Build the diff analysis for the reported commits
//! 5. Correlate per-commit effort
//! 6. Persist the artifacts and remove the working tree
//!
//! Steps 1 to 3 are fatal for the repository. In a batch, each repository
//! runs on its own blocking worker, bounded by a semaphore, and one
//! repository's failure never affects another's output.

use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;
use tracing::{error, info, info_span, warn};
use url::Url;

use crate::analysis::effort::EffortCorrelator;
use crate::analysis::git::analyze_diffs;
use crate::analysis::tools::{ExternalToolAdapter, RefactoringDetector, SizeMeter};
use crate::analysis::walker::CommitWalker;
use crate::analysis::worktree::{Checkout, TreeOptions, WorkingTree};
use crate::config::MinerConfig;
use crate::error::{MineError, Result};
use crate::pipeline::artifacts::{
    clear_artifacts, write_json, DIFF_ANALYSIS_FILE, EFFORT_ANALYSIS_FILE, REFACTORINGS_FILE,
    SUMMARY_FILE,
};
use crate::types::{RepositorySummary, SizeMetric};
use crate::utils::aggregation::{effort_by_developer, effort_by_refactoring_type};
use crate::utils::redact;

/// Pipeline stage a repository failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Clone,
    ResolveDefaultBranch,
    DetectRefactorings,
    DiffAnalysis,
    Persist,
    Worker,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::Clone => "clone",
            PipelineStep::ResolveDefaultBranch => "default branch resolution",
            PipelineStep::DetectRefactorings => "refactoring detection",
            PipelineStep::DiffAnalysis => "diff analysis",
            PipelineStep::Persist => "persisting results",
            PipelineStep::Worker => "worker",
        };
        f.write_str(name)
    }
}

/// A repository whose pipeline stopped at a fatal step
#[derive(Debug, Error)]
#[error("{repository}: {step} failed: {error}")]
pub struct PipelineFailure {
    pub repository: String,
    pub step: PipelineStep,
    #[source]
    pub error: MineError,
}

/// Result of processing one repository in a batch
#[derive(Debug)]
pub enum RepositoryOutcome {
    Completed(RepositorySummary),
    Failed(PipelineFailure),
}

impl RepositoryOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RepositoryOutcome::Completed(_))
    }

    pub fn repository(&self) -> &str {
        match self {
            RepositoryOutcome::Completed(summary) => &summary.repository,
            RepositoryOutcome::Failed(failure) => &failure.repository,
        }
    }
}

/// Destroys the working tree when it goes out of scope, on every exit path
struct ScopedTree(Option<WorkingTree>);

impl ScopedTree {
    fn finish(mut self) {
        if let Some(tree) = self.0.take() {
            destroy_tree(tree);
        }
    }
}

impl Deref for ScopedTree {
    type Target = WorkingTree;

    fn deref(&self) -> &WorkingTree {
        self.0.as_ref().expect("working tree already released")
    }
}

impl DerefMut for ScopedTree {
    fn deref_mut(&mut self) -> &mut WorkingTree {
        self.0.as_mut().expect("working tree already released")
    }
}

impl Drop for ScopedTree {
    fn drop(&mut self) {
        if let Some(tree) = self.0.take() {
            destroy_tree(tree);
        }
    }
}

fn destroy_tree(tree: WorkingTree) {
    let name = tree.name().to_string();
    if let Err(e) = tree.destroy() {
        warn!(repository = %name, "{}", e);
    }
}

/// Derive `<owner>_<repo>` from a remote URL, or the directory name of a local path
pub fn repository_name(remote: &str) -> String {
    let remote = remote.trim();
    let (segments, hosted): (Vec<String>, bool) = match Url::parse(remote) {
        Ok(url) if url.scheme() == "file" => (url_segments(&url), false),
        Ok(url) if url.has_host() => (url_segments(&url), true),
        _ => match scp_path(remote) {
            Some(path) => (split_path(path), true),
            None => (split_path(remote), false),
        },
    };

    let mut parts = segments.iter().rev().map(String::as_str).filter(|p| !p.is_empty());
    let repo = parts
        .next()
        .map(|r| r.strip_suffix(".git").unwrap_or(r))
        .unwrap_or("repository");
    let raw = match (hosted, parts.next()) {
        (true, Some(owner)) => format!("{owner}_{repo}"),
        _ => repo.to_string(),
    };

    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn url_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|segments| segments.map(str::to_string).collect())
        .unwrap_or_default()
}

/// Path of an scp-like remote such as `git@host:owner/repo.git`
fn scp_path(remote: &str) -> Option<&str> {
    let (host, path) = remote.split_once(':')?;
    // A single letter before the colon is a drive, not a host
    (host.len() > 1 && !host.contains(['/', '\\'])).then_some(path)
}

fn split_path(path: &str) -> Vec<String> {
    path.split(['/', '\\']).map(str::to_string).collect()
}

/// Read repository URLs, one per line; blank lines and `#` comments are skipped
pub fn read_repository_list(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[derive(Clone)]
pub struct PipelineOrchestrator {
    config: Arc<MinerConfig>,
    detector: Arc<dyn RefactoringDetector>,
    meter: Arc<dyn SizeMeter>,
}

impl PipelineOrchestrator {
    /// Build an orchestrator around the real external tools, locating them now
    pub fn new(config: MinerConfig) -> Result<Self> {
        config.validate()?;
        let tools = Arc::new(ExternalToolAdapter::locate(&config)?);
        Self::with_tools(config, tools.clone(), tools)
    }

    /// Build an orchestrator around any detector and size meter
    pub fn with_tools(
        config: MinerConfig,
        detector: Arc<dyn RefactoringDetector>,
        meter: Arc<dyn SizeMeter>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            detector,
            meter,
        })
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Run the full pipeline for one repository
    pub fn run_repository(&self, remote: &str) -> std::result::Result<RepositorySummary, PipelineFailure> {
        let name = repository_name(remote);
        let span = info_span!("repo", repo = %name);
        let _enter = span.enter();

        let result = self.mine(remote, &name);
        match &result {
            Ok(summary) => info!(
                effort_records = summary.effort_records,
                skipped = summary.warnings.len(),
                output = %summary.output_dir.display(),
                "repository complete"
            ),
            Err(failure) => error!("{}", failure),
        }
        result
    }

    fn mine(&self, remote: &str, name: &str) -> std::result::Result<RepositorySummary, PipelineFailure> {
        let token = self.config.token.as_deref();
        let fail = |step: PipelineStep| {
            move |error: MineError| PipelineFailure {
                repository: name.to_string(),
                step,
                error: match error {
                    MineError::ToolInvocationFailure { tool, reason } => {
                        MineError::ToolInvocationFailure {
                            tool,
                            reason: redact(&reason, token),
                        }
                    }
                    other => other,
                },
            }
        };

        info!(remote = %redact(remote, token), "processing repository");
        let clone_dir = self.config.clone_dir(name);
        let result_dir = self.config.result_dir(name);

        let tree = WorkingTree::clone_repository(remote, &clone_dir, &TreeOptions::from(&*self.config))
            .map_err(fail(PipelineStep::Clone))?;
        let mut tree = ScopedTree(Some(tree));

        let default_branch = tree
            .resolve_default_branch()
            .map_err(fail(PipelineStep::ResolveDefaultBranch))?;
        let head_commit = tree.head_commit_hash().unwrap_or_default();
        let head_size = match self.meter.measure_size(tree.path()) {
            Ok(size) => size,
            Err(e) => {
                warn!("could not measure default branch: {}", e);
                SizeMetric::default()
            }
        };

        fs::create_dir_all(&result_dir)
            .map_err(MineError::from)
            .and_then(|_| clear_artifacts(&result_dir))
            .map_err(fail(PipelineStep::Persist))?;

        let refactorings_path = result_dir.join(REFACTORINGS_FILE);
        let report = match self.detector.detect_refactorings(tree.path(), &refactorings_path) {
            Ok(report) => report,
            Err(e) => {
                let _ = fs::remove_file(&refactorings_path);
                return Err(fail(PipelineStep::DetectRefactorings)(e));
            }
        };
        // The detector owns the raw file; make sure one exists for pass-through.
        if !refactorings_path.exists() {
            write_json(&refactorings_path, &report).map_err(fail(PipelineStep::Persist))?;
        }

        let walker = CommitWalker::open(tree.path(), name).map_err(fail(PipelineStep::DiffAnalysis))?;
        let diffs = analyze_diffs(&walker, &report).map_err(fail(PipelineStep::DiffAnalysis))?;
        write_json(&result_dir.join(DIFF_ANALYSIS_FILE), &diffs).map_err(fail(PipelineStep::Persist))?;

        let effort = EffortCorrelator::new(&mut *tree, self.meter.as_ref()).correlate(
            &walker,
            &report,
            Some(&default_branch),
        );
        write_json(&result_dir.join(EFFORT_ANALYSIS_FILE), &effort.records)
            .map_err(fail(PipelineStep::Persist))?;

        let summary = RepositorySummary {
            repository: name.to_string(),
            default_branch,
            head_commit,
            head_size,
            commits_in_report: report.target_hashes().len(),
            diff_records: diffs.len(),
            effort_records: effort.records.len(),
            effort_by_developer: effort_by_developer(&effort.records),
            effort_by_refactoring_type: effort_by_refactoring_type(&effort.records, &report),
            warnings: effort.warnings,
            output_dir: result_dir.clone(),
        };
        write_json(&result_dir.join(SUMMARY_FILE), &summary).map_err(fail(PipelineStep::Persist))?;

        drop(walker);
        tree.finish();
        Ok(summary)
    }

    /// Process many repositories on a bounded pool of blocking workers.
    ///
    /// Outcomes come back in input order.
    pub async fn run_batch(&self, remotes: Vec<String>) -> Vec<RepositoryOutcome> {
        let workers = self.config.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut names = Vec::with_capacity(remotes.len());
        let mut handles = Vec::with_capacity(remotes.len());

        info!(repositories = remotes.len(), workers, "starting batch");

        for remote in remotes {
            let name = repository_name(&remote);
            let permit = semaphore.clone().acquire_owned().await;
            let orchestrator = self.clone();
            let worker_name = name.clone();

            handles.push(spawn_blocking(move || {
                let _permit = permit.map_err(|e| PipelineFailure {
                    repository: worker_name,
                    step: PipelineStep::Worker,
                    error: MineError::Io(std::io::Error::other(e.to_string())),
                })?;
                orchestrator.run_repository(&remote)
            }));
            names.push(name);
        }

        let outcomes: Vec<RepositoryOutcome> = names
            .into_iter()
            .zip(join_all(handles).await)
            .map(|(name, result)| match result {
                Ok(Ok(summary)) => RepositoryOutcome::Completed(summary),
                Ok(Err(failure)) => RepositoryOutcome::Failed(failure),
                Err(join_error) => RepositoryOutcome::Failed(PipelineFailure {
                    repository: name,
                    step: PipelineStep::Worker,
                    error: MineError::Io(std::io::Error::other(format!(
                        "worker did not finish: {join_error}"
                    ))),
                }),
            })
            .collect();

        let completed = outcomes.iter().filter(|o| o.is_completed()).count();
        info!(
            completed,
            failed = outcomes.len() - completed,
            "batch finished"
        );
        outcomes
    }
}
