pub mod artifacts;
pub mod orchestrator;

pub use orchestrator::{
    read_repository_list, repository_name, PipelineFailure, PipelineOrchestrator, PipelineStep,
    RepositoryOutcome,
};
