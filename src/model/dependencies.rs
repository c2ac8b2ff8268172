use std::path::{Path, PathBuf};

use log::{debug, error};
use serde_yaml::Value;

use crate::model::ParseError;

const DEPENDENCIES_KEY: &str = "dependencies";
const PIP_KEY: &str = "pip";

/// Where the dependencies of a bundle come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Explicit conda and pip specifier lists.
    Lists {
        conda: Option<Vec<String>>,
        pip: Option<Vec<String>>,
    },
    /// A conda environment descriptor (`environment.yml`).
    EnvironmentFile(PathBuf),
}

impl PackageSource {
    pub fn load(&self) -> Result<DependencySet, ParseError> {
        match self {
            PackageSource::Lists { conda, pip } => {
                Ok(DependencySet::new(conda.clone(), pip.clone()))
            }
            PackageSource::EnvironmentFile(path) => DependencySet::from_environment_file(path),
        }
    }
}

/// Normalized conda and pip specifiers. An empty list is stored as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    pub conda: Option<Vec<String>>,
    pub pip: Option<Vec<String>>,
}

impl DependencySet {
    pub fn new(conda: Option<Vec<String>>, pip: Option<Vec<String>>) -> Self {
        DependencySet {
            conda: conda.filter(|specs| !specs.is_empty()),
            pip: pip.filter(|specs| !specs.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conda.is_none() && self.pip.is_none()
    }

    pub fn from_environment_file(path: &Path) -> Result<DependencySet, ParseError> {
        debug!("Attempting to read environment file {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let dependencies = DependencySet::from_environment_str(&contents);
        if let Err(err) = &dependencies {
            error!(
                "Could not read dependencies from {} due to err {err}",
                path.display()
            )
        }
        dependencies
    }

    /// Splits the `dependencies` list of an environment descriptor into conda
    /// specifiers (bare strings) and pip specifiers (the single `pip` mapping).
    pub fn from_environment_str(data: &str) -> Result<DependencySet, ParseError> {
        let document = serde_yaml::from_str::<Value>(data)?;

        let entries = document
            .get(DEPENDENCIES_KEY)
            .ok_or_else(|| ParseError::MissingKey(DEPENDENCIES_KEY.to_string()))?
            .as_sequence()
            .ok_or_else(|| ParseError::InvalidValue {
                key: DEPENDENCIES_KEY.to_string(),
                expected: "a list",
            })?;

        let mut conda = Vec::new();
        let mut pip: Option<Vec<String>> = None;
        for entry in entries {
            match entry {
                Value::String(spec) => conda.push(spec.clone()),
                Value::Mapping(_) => match entry.get(PIP_KEY) {
                    Some(_) if pip.is_some() => return Err(ParseError::MultiplePipSections),
                    Some(value) => pip = Some(string_list(PIP_KEY, value)?),
                    None => return Err(ParseError::UnexpectedEntry(describe(entry))),
                },
                other => return Err(ParseError::UnexpectedEntry(describe(other))),
            }
        }

        Ok(DependencySet::new(Some(conda), pip))
    }
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>, ParseError> {
    let invalid = || ParseError::InvalidValue {
        key: key.to_string(),
        expected: "a list of strings",
    };
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

fn describe(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().replace('\n', " "))
        .unwrap_or_else(|_| format!("{value:?}"))
}
