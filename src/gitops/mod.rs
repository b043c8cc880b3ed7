//! GitOps orchestration: the configuration repository and the Flux
//! controller that reconciles from it.

pub mod files;
mod flux;
pub mod flux_client;
#[cfg(test)]
mod flux_test;
pub mod git;
pub mod git_cli;
pub mod github;
pub mod validations;
mod working_copy;

pub use flux::{
    Flux, DELETE_COMMIT_MESSAGE, FLUX_PATH_REMEDIATION, FLUX_PATH_VALIDATION,
    INITIAL_COMMIT_MESSAGE, UPDATE_COMMIT_MESSAGE,
};
pub use flux_client::{FluxCli, GitOpsFluxClient};
pub use git::{CreateRepoOpts, GitClient, GitTools, Repository};
pub use git_cli::GitCli;
pub use validations::{run_validations, Validation, ValidationResult};
pub use working_copy::WorkingCopy;
