//! # Errors
//!
//! A single error type for the mining pipeline. Each variant belongs to one of
//! three severity classes which decide how far a failure propagates.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = MineError> = std::result::Result<T, E>;

/// How far a failure propagates through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort this repository's pipeline; other repositories continue.
    FatalToRepository,
    /// Skip the affected commit and keep walking.
    RecoverablePerCommit,
    /// Log and carry on; persisted artifacts are unaffected.
    NonFatalCleanup,
}

#[derive(Debug, Error)]
pub enum MineError {
    #[error("failed to clone {remote} into {}: {reason}", .destination.display())]
    CloneFailure {
        remote: String,
        destination: PathBuf,
        reason: String,
    },

    #[error("no usable default branch in {repository} (tried {})", .tried.join(", "))]
    BranchResolutionFailure {
        repository: String,
        tried: Vec<String>,
    },

    #[error("{tool} not found; searched {}", .searched.join(", "))]
    ToolNotFound { tool: String, searched: Vec<String> },

    #[error("{tool} failed: {reason}")]
    ToolInvocationFailure { tool: String, reason: String },

    #[error("commit {hash} not found in history of {repository}")]
    CommitNotFound { repository: String, hash: String },

    #[error("checkout of {reference} failed during {step}: {reason}")]
    CheckoutFailure {
        reference: String,
        step: &'static str,
        reason: String,
    },

    #[error("measuring {} failed: {reason}", .path.display())]
    MeasurementFailure { path: PathBuf, reason: String },

    #[error("cleanup of {} failed: {reason}", .path.display())]
    CleanupFailure { path: PathBuf, reason: String },

    #[error("working tree {} is already held by another controller", .0.display())]
    WorkingTreeBusy(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MineError {
    pub fn severity(&self) -> Severity {
        match self {
            MineError::CommitNotFound { .. }
            | MineError::CheckoutFailure { .. }
            | MineError::MeasurementFailure { .. } => Severity::RecoverablePerCommit,
            MineError::CleanupFailure { .. } => Severity::NonFatalCleanup,
            _ => Severity::FatalToRepository,
        }
    }

    /// Whether retrying the same operation could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            MineError::Git(e) => git_error_is_transient(e),
            MineError::Io(e) => io_error_is_transient(e),
            _ => false,
        }
    }
}

pub(crate) fn git_error_is_transient(e: &git2::Error) -> bool {
    use git2::{ErrorClass, ErrorCode};

    e.code() == ErrorCode::Locked
        || matches!(
            e.class(),
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl
        )
}

pub(crate) fn io_error_is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classes() {
        let not_found = MineError::CommitNotFound {
            repository: "acme_widgets".to_string(),
            hash: "abc123".to_string(),
        };
        assert_eq!(not_found.severity(), Severity::RecoverablePerCommit);

        let tool = MineError::ToolInvocationFailure {
            tool: "RefactoringMiner".to_string(),
            reason: "exit status 1".to_string(),
        };
        assert_eq!(tool.severity(), Severity::FatalToRepository);
    }

    #[test]
    fn test_transient_classification() {
        let net = MineError::Git(git2::Error::new(
            git2::ErrorCode::GenericError,
            git2::ErrorClass::Net,
            "connection reset",
        ));
        assert!(net.is_transient());

        let missing = MineError::Git(git2::Error::new(
            git2::ErrorCode::NotFound,
            git2::ErrorClass::Reference,
            "no such ref",
        ));
        assert!(!missing.is_transient());

        let interrupted = MineError::Io(io::Error::new(io::ErrorKind::Interrupted, "signal"));
        assert!(interrupted.is_transient());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = MineError::BranchResolutionFailure {
            repository: "acme_widgets".to_string(),
            tried: vec!["origin/HEAD".to_string(), "main".to_string(), "master".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("acme_widgets"));
        assert!(msg.contains("main, master"));
    }
}
