//! # Configuration
//!
//! Everything the pipeline needs to know about its environment is carried by
//! [`MinerConfig`], which is built once by the caller and handed to the
//! orchestrator. Nothing here is read from globals.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MineError, Result};
use crate::retry::RetryPolicy;

pub const DEFAULT_REFACTORING_TOOL: &str = "RefactoringMiner";
pub const DEFAULT_LINE_COUNTER: &str = "scc";

/// Language names counted toward the size metric. A line-counter category is
/// recognized when its name contains one of these, ignoring case.
pub const DEFAULT_LANGUAGES: &[&str] = &[
    "Java",
    "Kotlin",
    "Scala",
    "Groovy",
    "Python",
    "JavaScript",
    "TypeScript",
    "C++",
    "C#",
    "Objective C",
    "Go",
    "Rust",
    "Ruby",
    "PHP",
    "Swift",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Access token injected into https clone URLs
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Directory under which repositories are cloned
    pub work_root: PathBuf,
    /// Directory under which per-repository results are written
    pub output_root: PathBuf,
    /// Number of repositories processed concurrently
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Name of the refactoring detector binary
    pub refactoring_tool: String,
    /// Explicit path to the refactoring detector, skipping lookup
    pub refactoring_tool_path: Option<PathBuf>,
    /// Name of the line counter binary
    pub line_counter: String,
    /// Explicit path to the line counter, skipping lookup
    pub line_counter_path: Option<PathBuf>,
    pub languages: Vec<String>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            token: None,
            work_root: default_work_root(),
            output_root: PathBuf::from("results"),
            workers: default_workers(),
            retry: RetryPolicy::default(),
            refactoring_tool: DEFAULT_REFACTORING_TOOL.to_string(),
            refactoring_tool_path: None,
            line_counter: DEFAULT_LINE_COUNTER.to_string(),
            line_counter_path: None,
            languages: DEFAULT_LANGUAGES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MinerConfig {
    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: MinerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(MineError::Config("workers must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(MineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(MineError::Config(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.languages.iter().all(|l| l.trim().is_empty()) {
            return Err(MineError::Config(
                "at least one recognized language is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Where a repository with the given name is cloned
    pub fn clone_dir(&self, repo_name: &str) -> PathBuf {
        self.work_root.join(repo_name)
    }

    /// Where a repository's artifacts are written
    pub fn result_dir(&self, repo_name: &str) -> PathBuf {
        self.output_root.join(repo_name)
    }
}

fn default_work_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("repominer")
        .join("repos")
}

/// Half the CPUs, but never more than four concurrent clones
fn default_workers() -> usize {
    (num_cpus::get() / 2).clamp(1, 4)
}
