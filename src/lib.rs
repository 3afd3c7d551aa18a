//! # Repository Mining Library
//!
//! `repominer` clones git repositories, runs a refactoring detector over their
//! history, and correlates the detected refactorings with diff statistics and
//! lines-of-code effort per developer.
//!
//! ## Features
//!
//! - Safe, idempotent clone and forced checkout of any commit or branch
//! - Default branch resolution with `main`/`master` fallback
//! - Refactoring detection and line counting through external tools
//! - Per-commit diff statistics and patch text from history
//! - Effort attribution: lines of code before and after each commit
//! - Bounded concurrent processing of many repositories
//!
//! ## Example
//!
//! ```no_run
//! use repominer::{MinerConfig, PipelineOrchestrator};
//!
//! let config = MinerConfig {
//!     workers: 2,
//!     ..MinerConfig::default()
//! };
//! let orchestrator = PipelineOrchestrator::new(config)?;
//!
//! let rt = tokio::runtime::Runtime::new()?;
//! let outcomes = rt.block_on(orchestrator.run_batch(vec![
//!     "https://github.com/acme/widgets".to_string(),
//! ]));
//! for outcome in outcomes {
//!     println!("{}: completed = {}", outcome.repository(), outcome.is_completed());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use config::MinerConfig;
pub use error::{MineError, Result};
pub use pipeline::{PipelineOrchestrator, RepositoryOutcome};
pub use types::{CommitRecord, DiffRecord, EffortRecord, RefactoringReport, SizeMetric};
