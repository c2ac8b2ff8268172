use std::path::PathBuf;

use anyhow::bail;
use clap::{Args, Parser, Subcommand};

use crate::model::PackageSource;

/// Offline installation bundles for conda and pip dependencies.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Directory the bundle is created in
    #[clap(short = 'l', long, default_value = ".")]
    pub package_location: PathBuf,
    /// Name of the bundle directory and of its archive
    #[clap(short, long, default_value = "package")]
    pub name: String,
    /// Location of the condafetch configuration file
    #[clap(long, default_value = "condafetch.toml")]
    pub config: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolves and downloads the dependencies and writes the install script
    Bundle {
        #[clap(flatten)]
        input: InputArgs,
        /// Zips the bundle into <name>.zip next to it
        #[clap(long)]
        compress: bool,
        /// Fails if the bundle directory already exists
        #[clap(long)]
        fail_if_exists: bool,
        /// Text inserted verbatim before the install commands, e.g. an environment activation
        #[clap(long, conflicts_with = "preamble_file")]
        preamble: Option<String>,
        /// File whose content is inserted before the install commands
        #[clap(long)]
        preamble_file: Option<PathBuf>,
    },
    /// Prints the conda packages a bundle would download
    Resolve {
        #[clap(flatten)]
        input: InputArgs,
    },
    /// Deletes the bundle directory and its archive
    Clean,
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Conda environment file listing the dependencies
    #[clap(short, long, conflicts_with_all = ["conda", "pip"])]
    pub environment: Option<PathBuf>,
    /// Conda package specifier
    #[clap(long, value_name = "SPEC", num_args = 1..)]
    pub conda: Vec<String>,
    /// Pip package specifier
    #[clap(long, value_name = "SPEC", num_args = 1..)]
    pub pip: Vec<String>,
}

impl InputArgs {
    pub fn into_source(self) -> anyhow::Result<PackageSource> {
        match self.environment {
            Some(path) => Ok(PackageSource::EnvironmentFile(path)),
            None if self.conda.is_empty() && self.pip.is_empty() => {
                bail!("Nothing to bundle: pass --environment or at least one --conda or --pip specifier")
            }
            None => Ok(PackageSource::Lists {
                conda: Some(self.conda),
                pip: Some(self.pip),
            }),
        }
    }
}
