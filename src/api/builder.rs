use std::{path::PathBuf, sync::Arc};

use anyhow::bail;

use crate::{
    bundle::BundleOptions,
    fetch::{Downloader, HttpDownloader, DEFAULT_WORKERS},
    pip::{PipCli, PipDownloader},
    progress::{BundleProgress, LogProgress},
    resolver::{CondaCli, CondaSolver},
    script::ScriptDialect,
    Condafetch,
};

#[derive(Default)]
pub struct CondafetchBuilder {
    package_location: Option<PathBuf>,
    install_package_name: Option<String>,
    compress: bool,
    exist_ok: Option<bool>,
    script_preamble: Option<String>,
    script_dialect: Option<ScriptDialect>,
    conda_executable: Option<PathBuf>,
    python_executable: Option<PathBuf>,
    workers: Option<usize>,

    solver: Option<Box<dyn CondaSolver>>,
    pip: Option<Box<dyn PipDownloader>>,
    downloader: Option<Arc<dyn Downloader>>,
    progress: Option<Arc<dyn BundleProgress>>,
}

impl CondafetchBuilder {
    /// Directory the bundle is created in.
    ///
    /// Defaults to the current directory.
    pub fn package_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.package_location = Some(path.into());
        self
    }

    /// Name of the bundle directory and of its archive.
    ///
    /// Defaults to `package`.
    pub fn install_package_name(mut self, name: impl Into<String>) -> Self {
        self.install_package_name = Some(name.into());
        self
    }

    /// Zip the bundle directory once it is complete.
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Whether existing bundle directories are reused.
    ///
    /// Defaults to `true`.
    pub fn exist_ok(mut self, exist_ok: bool) -> Self {
        self.exist_ok = Some(exist_ok);
        self
    }

    /// Text copied verbatim into the install script before the install commands.
    pub fn script_preamble(mut self, preamble: Option<String>) -> Self {
        self.script_preamble = preamble;
        self
    }

    /// Defaults to the script family of the current operating system.
    pub fn script_dialect(mut self, dialect: ScriptDialect) -> Self {
        self.script_dialect = Some(dialect);
        self
    }

    /// Defaults to `$CONDA_EXE`, then `conda`.
    pub fn conda_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.conda_executable = Some(path.into());
        self
    }

    /// Interpreter used to run `pip download`.
    pub fn python_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.python_executable = Some(path.into());
        self
    }

    /// Maximum number of concurrent conda downloads.
    ///
    /// Defaults to 10.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn solver(mut self, solver: Box<dyn CondaSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn pip(mut self, pip: Box<dyn PipDownloader>) -> Self {
        self.pip = Some(pip);
        self
    }

    pub fn downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn progress(mut self, progress: Arc<dyn BundleProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn try_build(self) -> anyhow::Result<Condafetch> {
        let Self {
            package_location,
            install_package_name,
            compress,
            exist_ok,
            script_preamble,
            script_dialect,
            conda_executable,
            python_executable,
            workers,
            solver,
            pip,
            downloader,
            progress,
        } = self;

        let install_package_name = install_package_name.unwrap_or_else(|| "package".to_string());
        if install_package_name.is_empty()
            || install_package_name.contains(['/', '\\'])
            || install_package_name == ".."
        {
            bail!("Invalid bundle name `{}`", install_package_name);
        }

        let workers = workers.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            bail!("At least one download worker is required");
        }

        let options = BundleOptions {
            package_location: package_location.unwrap_or_else(|| PathBuf::from(".")),
            install_package_name,
            compress,
            exist_ok: exist_ok.unwrap_or(true),
            script_preamble,
            script_dialect: script_dialect.unwrap_or_else(ScriptDialect::host),
            workers,
        };

        let solver: Box<dyn CondaSolver> = match (solver, conda_executable) {
            (Some(solver), _) => solver,
            (None, Some(path)) => Box::new(CondaCli::new(path)),
            (None, None) => Box::<CondaCli>::default(),
        };
        let pip: Box<dyn PipDownloader> = match (pip, python_executable) {
            (Some(pip), _) => pip,
            (None, Some(path)) => Box::new(PipCli::new(path)),
            (None, None) => Box::<PipCli>::default(),
        };

        let downloader: Arc<dyn Downloader> = match downloader {
            Some(downloader) => downloader,
            None => Arc::new(HttpDownloader::new()),
        };
        let progress: Arc<dyn BundleProgress> = match progress {
            Some(progress) => progress,
            None => Arc::new(LogProgress),
        };

        Ok(Condafetch {
            solver,
            pip,
            downloader,
            progress,
            options,
        })
    }
}
