use std::{
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipError {
    #[error("Could not run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("pip download exited with {status}")]
    Failed { status: String },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Retrieves pip artifacts; resolution is left to pip itself.
pub trait PipDownloader {
    fn download(&self, specifiers: &[String], target: &Path) -> Result<(), PipError>;
}

/// Runs `<python> -m pip download`.
pub struct PipCli {
    python: PathBuf,
}

impl PipCli {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        PipCli {
            python: python.into(),
        }
    }

    fn command(&self, specifiers: &[String], target: &Path) -> Command {
        let mut command = Command::new(&self.python);
        command
            .args(["-m", "pip", "download"])
            .args(specifiers)
            .arg("-d")
            .arg(target);
        command
    }
}

impl Default for PipCli {
    fn default() -> Self {
        PipCli::new(if cfg!(windows) { "python" } else { "python3" })
    }
}

impl PipDownloader for PipCli {
    fn download(&self, specifiers: &[String], target: &Path) -> Result<(), PipError> {
        let mut command = self.command(specifiers, target);
        debug!("Running {:?}", command);

        let status = command.status().map_err(|source| PipError::Spawn {
            program: self.python.display().to_string(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(PipError::Failed {
                status: status.to_string(),
            })
        }
    }
}

/// Writes one specifier per line, in the given order.
pub fn write_requirements(path: &Path, specifiers: &[String]) -> Result<(), PipError> {
    let mut file = std::fs::File::create(path)?;
    for specifier in specifiers {
        writeln!(file, "{}", specifier)?;
    }
    Ok(())
}
