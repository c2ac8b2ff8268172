use thiserror::Error;

pub mod dependencies;
pub mod resolved;

pub use dependencies::{DependencySet, PackageSource};
pub use resolved::{MatchSpec, ResolvedPackage, ResolvedSet};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading environment file: {0}")]
    IO(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Missing YAML key `{0}` while parsing")]
    MissingKey(String),
    #[error("Expected `{key}` to be {expected}")]
    InvalidValue { key: String, expected: &'static str },
    #[error("Found more than one pip section in the dependency list")]
    MultiplePipSections,
    #[error("Unexpected entry in the dependency list: `{0}`")]
    UnexpectedEntry(String),
}
