pub mod effort;
pub mod git;
pub mod tools;
pub mod walker;
pub mod worktree;


pub use effort::{EffortCorrelator, EffortOutcome};
pub use git::{analyze_diffs, diff_commit};
pub use tools::{ExternalToolAdapter, LanguageFilter, RefactoringDetector, SizeMeter, ToolLocator};
pub use walker::CommitWalker;
pub use worktree::{Checkout, TreeOptions, WorkingTree};
