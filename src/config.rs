use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

pub struct CondafetchConfig {
    pub conda_executable: Option<PathBuf>,
    pub python_executable: Option<PathBuf>,
    pub workers: Option<usize>,
}

impl CondafetchConfig {
    /// Reads `file` if it exists, then `CONDAFETCH_*` environment variables.
    pub fn load(file: &Path) -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(Some(file), None)?;

        Ok(Self {
            conda_executable: raw_config.conda.executable,
            python_executable: raw_config.pip.python,
            workers: raw_config.fetch.workers,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    conda: CondaConfig,
    #[serde(default)]
    pip: PipConfig,
    #[serde(default)]
    fetch: FetchConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CondaConfig {
    executable: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct PipConfig {
    python: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct FetchConfig {
    workers: Option<usize>,
}

impl RawConfig {
    fn load(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(
                File::new(&file.to_string_lossy(), FileFormat::Toml).required(false),
            );
        }
        builder
            .add_source(
                Environment::with_prefix("CONDAFETCH")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
