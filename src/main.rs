//! Repository mining tool
//!
//! Clones each repository, detects refactorings, and writes diff and effort
//! analyses under the output directory.

mod cli;

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::Args;
use repominer::{PipelineOrchestrator, RepositoryOutcome};

#[cfg(feature = "dev")]
const DEFAULT_FILTER: &str = "debug";
#[cfg(not(feature = "dev"))]
const DEFAULT_FILTER: &str = "info";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> anyhow::Result<Vec<RepositoryOutcome>> {
    let config = args.to_config()?;
    let repos = args.repositories()?;
    let orchestrator = PipelineOrchestrator::new(config).context("setting up the pipeline")?;

    let rt = Runtime::new().context("starting the runtime")?;
    Ok(rt.block_on(orchestrator.run_batch(repos)))
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let start_time = Instant::now();

    match run(args) {
        Ok(outcomes) => {
            for outcome in &outcomes {
                match outcome {
                    RepositoryOutcome::Completed(summary) => info!(
                        repository = %summary.repository,
                        output = %summary.output_dir.display(),
                        "completed"
                    ),
                    RepositoryOutcome::Failed(failure) => error!("{}", failure),
                }
            }
            info!("total time: {:.2?}", start_time.elapsed());
            if outcomes.iter().all(RepositoryOutcome::is_completed) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
