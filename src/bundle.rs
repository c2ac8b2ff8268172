use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::debug;
use thiserror::Error;

use crate::{
    archive::{compress_directory, ArchiveError},
    fetch::{fetch_packages, Downloader, FetchError, DEFAULT_WORKERS},
    model::DependencySet,
    pip::{write_requirements, PipDownloader, PipError},
    progress::BundleProgress,
    resolver::{resolve_conda_packages, CondaSolver, ResolveError},
    script::{ReplayScript, ScriptDialect},
};

pub const CONDA_DIRECTORY_NAME: &str = "conda";
pub const PIP_DIRECTORY_NAME: &str = "pip";
const PIP_DOWNLOADED_DIRECTORY_NAME: &str = "downloaded";
const REQUIREMENTS_FILE_NAME: &str = "requirements.txt";

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Directory {0} already exists")]
    AlreadyExists(String),
    #[error("Error while resolving conda packages: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Error while fetching conda packages: {0}")]
    Fetch(#[from] FetchError),
    #[error("Error while downloading pip packages: {0}")]
    Pip(#[from] PipError),
    #[error("Error while compressing the bundle: {0}")]
    Archive(#[from] ArchiveError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    /// Directory the bundle folder (and archive) is created in.
    pub package_location: PathBuf,
    /// Name of the bundle folder and of the archive.
    pub install_package_name: String,
    pub compress: bool,
    /// Tolerate directories left over from a previous run.
    pub exist_ok: bool,
    pub script_preamble: Option<String>,
    pub script_dialect: ScriptDialect,
    pub workers: usize,
}

impl Default for BundleOptions {
    fn default() -> Self {
        BundleOptions {
            package_location: PathBuf::from("."),
            install_package_name: "package".to_string(),
            compress: false,
            exist_ok: true,
            script_preamble: None,
            script_dialect: ScriptDialect::host(),
            workers: DEFAULT_WORKERS,
        }
    }
}

impl BundleOptions {
    pub fn install_path(&self) -> std::io::Result<PathBuf> {
        Ok(absolute(&self.package_location)?.join(&self.install_package_name))
    }

    pub fn archive_path(&self) -> std::io::Result<PathBuf> {
        Ok(absolute(&self.package_location)?.join(format!("{}.zip", self.install_package_name)))
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// What a successful run wrote to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub root: PathBuf,
    pub script: PathBuf,
    /// Conda artifacts relative to `root`, if conda dependencies were bundled.
    pub conda_packages: Option<Vec<String>>,
    pub pip_requirements: Option<PathBuf>,
    pub archive: Option<PathBuf>,
}

pub struct BundleWriter<'a> {
    solver: &'a dyn CondaSolver,
    pip: &'a dyn PipDownloader,
    downloader: Arc<dyn Downloader>,
    progress: Arc<dyn BundleProgress>,
    options: &'a BundleOptions,
}

impl<'a> BundleWriter<'a> {
    pub fn new(
        solver: &'a dyn CondaSolver,
        pip: &'a dyn PipDownloader,
        downloader: Arc<dyn Downloader>,
        progress: Arc<dyn BundleProgress>,
        options: &'a BundleOptions,
    ) -> Self {
        BundleWriter {
            solver,
            pip,
            downloader,
            progress,
            options,
        }
    }

    /// Runs the whole pipeline. The first failing step aborts the run and
    /// leaves whatever was already written in place.
    pub fn write(&self, dependencies: &DependencySet) -> Result<Bundle, BundleError> {
        self.progress.dependencies_loaded(dependencies);

        let root = self.options.install_path()?;
        self.create_dir(&root)?;

        let conda_packages = match &dependencies.conda {
            Some(specifiers) => Some(self.bundle_conda(&root, specifiers)?),
            None => None,
        };

        let pip_requirements = match &dependencies.pip {
            Some(specifiers) => Some(self.bundle_pip(&root, specifiers)?),
            None => None,
        };

        let script = self.write_script(
            &root,
            conda_packages.as_deref(),
            pip_requirements.is_some(),
        )?;

        let archive = if self.options.compress {
            let archive = self.options.archive_path()?;
            compress_directory(&root, &archive)?;
            self.progress.archive_written(&archive);
            Some(archive)
        } else {
            None
        };

        self.progress.bundle_completed(&root);

        Ok(Bundle {
            root,
            script,
            conda_packages,
            pip_requirements,
            archive,
        })
    }

    fn bundle_conda(
        &self,
        root: &Path,
        specifiers: &[String],
    ) -> Result<Vec<String>, BundleError> {
        let directory = root.join(CONDA_DIRECTORY_NAME);
        self.create_dir(&directory)?;

        let resolved = resolve_conda_packages(self.solver, specifiers)?;
        self.progress.conda_resolved(&resolved);

        fetch_packages(
            self.downloader.clone(),
            self.progress.clone(),
            &resolved.fetch_map(),
            &directory,
            self.options.workers,
        )?
        .into_result()?;

        Ok(resolved.relative_paths(CONDA_DIRECTORY_NAME))
    }

    fn bundle_pip(&self, root: &Path, specifiers: &[String]) -> Result<PathBuf, BundleError> {
        let directory = root.join(PIP_DIRECTORY_NAME);
        self.create_dir(&directory)?;
        let downloaded = directory.join(PIP_DOWNLOADED_DIRECTORY_NAME);
        self.create_dir(&downloaded)?;

        self.progress.pip_download_started(specifiers);
        self.pip.download(specifiers, &downloaded)?;

        let requirements = directory.join(REQUIREMENTS_FILE_NAME);
        write_requirements(&requirements, specifiers)?;
        debug!("Wrote {}", requirements.display());

        Ok(requirements)
    }

    fn write_script(
        &self,
        root: &Path,
        conda_packages: Option<&[String]>,
        pip: bool,
    ) -> Result<PathBuf, BundleError> {
        let dialect = self.options.script_dialect;
        let script = ReplayScript {
            preamble: self.options.script_preamble.clone(),
            // `conda install --offline` without packages is an error
            conda_packages: conda_packages
                .filter(|packages| !packages.is_empty())
                .map(<[String]>::to_vec),
            pip,
        };

        let path = root.join(dialect.file_name());
        std::fs::write(&path, script.render(dialect))?;
        if dialect == ScriptDialect::Shell {
            make_executable(&path)?;
        }
        self.progress.script_written(&path);

        Ok(path)
    }

    fn create_dir(&self, path: &Path) -> Result<(), BundleError> {
        if !self.options.exist_ok && path.exists() {
            return Err(BundleError::AlreadyExists(path.display().to_string()));
        }
        std::fs::create_dir_all(path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
