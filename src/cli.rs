use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;

use repominer::config::MinerConfig;
use repominer::pipeline::read_repository_list;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mine refactorings and per-commit effort from git repositories", long_about = None)]
pub struct Args {
    /// Repository URLs or local paths to process
    pub repos: Vec<String>,

    /// File with one repository URL per line
    #[arg(short, long)]
    pub urls: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for per-repository results
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory repositories are cloned into
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Number of repositories processed concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Access token for https clones
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to the RefactoringMiner executable
    #[arg(long)]
    pub refactoring_miner: Option<PathBuf>,

    /// Path to the scc executable
    #[arg(long)]
    pub scc: Option<PathBuf>,
}

impl Args {
    /// Merge the configuration file with command-line overrides
    pub fn to_config(&self) -> anyhow::Result<MinerConfig> {
        let mut config = match &self.config {
            Some(path) => MinerConfig::from_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => MinerConfig::default(),
        };

        if let Some(output) = &self.output {
            config.output_root = output.clone();
        }
        if let Some(work_dir) = &self.work_dir {
            config.work_root = work_dir.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(token) = self.token.as_ref().filter(|t| !t.trim().is_empty()) {
            config.token = Some(token.trim().to_string());
        }
        if let Some(path) = &self.refactoring_miner {
            config.refactoring_tool_path = Some(path.clone());
        }
        if let Some(path) = &self.scc {
            config.line_counter_path = Some(path.clone());
        }

        config.validate()?;
        Ok(config)
    }

    /// Positional repositories first, then those from `--urls`
    pub fn repositories(&self) -> anyhow::Result<Vec<String>> {
        let mut repos = self.repos.clone();
        if let Some(path) = &self.urls {
            let listed = read_repository_list(path)
                .with_context(|| format!("reading repository list {}", path.display()))?;
            repos.extend(listed);
        }
        if repos.is_empty() {
            bail!("no repositories given; pass URLs or --urls <file>");
        }
        Ok(repos)
    }
}
