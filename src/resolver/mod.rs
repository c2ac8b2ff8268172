mod conda;

use std::path::PathBuf;

use log::debug;
use thiserror::Error;

use crate::model::{MatchSpec, ResolvedPackage, ResolvedSet};

pub use conda::CondaCli;

#[cfg(test)]
use mockall::automock;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Could not run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("`conda info` failed: {0}")]
    Info(String),
    #[error("Solver failed with {exception}: {message}")]
    Solver { exception: String, message: String },
    #[error("Unexpected solver output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("Solver did not report a download url for {0}")]
    MissingArtifact(String),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// The prefix packages are solved against and the channels it is configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondaEnvironment {
    pub prefix: PathBuf,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveDiff {
    /// Distribution names the solver would unlink from the prefix.
    pub to_remove: Vec<String>,
    pub to_add: Vec<ResolvedPackage>,
}

#[cfg_attr(test, automock)]
pub trait CondaSolver {
    /// Active prefix, or the base prefix when no environment is active.
    fn environment(&self) -> Result<CondaEnvironment, ResolveError>;

    fn solve_for_diff(
        &self,
        environment: &CondaEnvironment,
        specs: &[MatchSpec],
    ) -> Result<SolveDiff, ResolveError>;
}

/// Resolves conda specifiers into the packages that need to be downloaded.
pub fn resolve_conda_packages(
    solver: &dyn CondaSolver,
    specifiers: &[String],
) -> Result<ResolvedSet, ResolveError> {
    let environment = solver.environment()?;
    debug!(
        "Solving against prefix {} with channels {:?}",
        environment.prefix.display(),
        environment.channels
    );

    let specs = specifiers
        .iter()
        .map(|s| MatchSpec::new(s.as_str()))
        .collect::<Vec<_>>();
    let diff = solver.solve_for_diff(&environment, &specs)?;

    if !diff.to_remove.is_empty() {
        debug!(
            "Ignoring {} packages the solver would remove: {:?}",
            diff.to_remove.len(),
            diff.to_remove
        );
    }

    Ok(ResolvedSet::new(diff.to_add))
}
