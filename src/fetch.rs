use std::{
    collections::BTreeMap,
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use log::{debug, error};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::{
    runtime::Handle,
    sync::Semaphore,
    task::{JoinError, JoinSet},
};

use crate::progress::BundleProgress;

/// Number of artifacts downloaded at the same time unless configured otherwise.
pub const DEFAULT_WORKERS: usize = 10;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("{url} returned HTTP status {status}")]
    Status { url: String, status: u16 },
    #[error("Could not reach {url}: {message}")]
    Transport { url: String, message: String },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Bad output dir {0}")]
    BadOutputDir(String),
    #[error("Failed to fetch {failed} of {total} packages: {details}")]
    Incomplete {
        failed: usize,
        total: usize,
        details: String,
    },
    #[error("Download worker failed: {0}")]
    Worker(#[from] JoinError),
    #[error("Download pool was closed: {0}")]
    PoolClosed(#[from] tokio::sync::AcquireError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Blocking transport writing one artifact to disk.
pub trait Downloader: Send + Sync {
    /// Writes the whole response body to `destination`, replacing any existing
    /// file, and returns the number of bytes written.
    fn download(&self, url: &str, destination: &Path) -> Result<u64, DownloadError>;
}

pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl HttpDownloader {
    pub fn new() -> Self {
        HttpDownloader {
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, DownloadError> {
        let response = self.agent.get(url).call().map_err(|err| match err {
            ureq::Error::Status(status, _) => DownloadError::Status {
                url: url.to_string(),
                status,
            },
            ureq::Error::Transport(transport) => DownloadError::Transport {
                url: url.to_string(),
                message: transport.to_string(),
            },
        })?;

        Ok(write_atomically(&mut response.into_reader(), destination)?)
    }
}

/// Streams `reader` into a temporary file next to `destination` and moves it
/// into place once the whole body was read.
fn write_atomically(reader: &mut dyn Read, destination: &Path) -> std::io::Result<u64> {
    let directory = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(directory)?;
    let bytes = std::io::copy(reader, &mut file)?;
    file.persist(destination)?;
    Ok(bytes)
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub url: String,
    pub file_name: String,
    pub result: Result<u64, DownloadError>,
}

/// Per artifact results of one fetch, ordered by url.
#[derive(Debug, Default)]
pub struct FetchReport {
    outcomes: Vec<FetchOutcome>,
}

impl FetchReport {
    pub fn outcomes(&self) -> &[FetchOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &FetchOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.result.is_err())
    }

    /// Fails if any artifact could not be fetched.
    pub fn into_result(self) -> Result<FetchReport, FetchError> {
        let details = self
            .failures()
            .filter_map(|outcome| {
                outcome
                    .result
                    .as_ref()
                    .err()
                    .map(|err| format!("{} ({})", outcome.file_name, err))
            })
            .collect::<Vec<_>>();

        if details.is_empty() {
            Ok(self)
        } else {
            Err(FetchError::Incomplete {
                failed: details.len(),
                total: self.outcomes.len(),
                details: details.join(", "),
            })
        }
    }
}

/// Downloads every `url -> file name` entry into `directory` using at most
/// `workers` concurrent downloads. Returns once all downloads have finished;
/// a failed download does not stop the others.
pub fn fetch_packages(
    downloader: Arc<dyn Downloader>,
    progress: Arc<dyn BundleProgress>,
    packages: &BTreeMap<String, String>,
    directory: &Path,
    workers: usize,
) -> Result<FetchReport, FetchError> {
    if !directory.is_dir() {
        return Err(FetchError::BadOutputDir(directory.display().to_string()));
    }

    let workers = workers.max(1);
    debug!(
        "Fetching {} packages with {} workers",
        packages.len(),
        workers
    );

    let run = move || -> Result<FetchReport, FetchError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("condafetch-download")
            .build()?;

        runtime.block_on(download_all(
            downloader, progress, packages, directory, workers,
        ))
    };

    if Handle::try_current().is_ok() {
        // A runtime cannot be blocked on from one of its own threads.
        debug!("Called from an async context, driving downloads from a dedicated thread");
        thread::scope(|scope| {
            scope
                .spawn(run)
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })
    } else {
        run()
    }
}

async fn download_all(
    downloader: Arc<dyn Downloader>,
    progress: Arc<dyn BundleProgress>,
    packages: &BTreeMap<String, String>,
    directory: &Path,
    workers: usize,
) -> Result<FetchReport, FetchError> {
    let permits = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for (url, file_name) in packages {
        let permit = permits.clone().acquire_owned().await?;
        let downloader = downloader.clone();
        let progress = progress.clone();
        let url = url.clone();
        let file_name = file_name.clone();
        let directory = directory.to_path_buf();

        tasks.spawn_blocking(move || {
            let _permit = permit;
            download_one(downloader.as_ref(), progress.as_ref(), url, file_name, directory)
        });
    }

    let mut outcomes = Vec::with_capacity(packages.len());
    let mut worker_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                error!("Download worker stopped unexpectedly: {}", err);
                worker_error.get_or_insert(err);
            }
        }
    }

    if let Some(err) = worker_error {
        return Err(err.into());
    }

    outcomes.sort_by(|a, b| a.url.cmp(&b.url));
    Ok(FetchReport { outcomes })
}

fn download_one(
    downloader: &dyn Downloader,
    progress: &dyn BundleProgress,
    url: String,
    file_name: String,
    directory: PathBuf,
) -> FetchOutcome {
    progress.download_started(&url, &file_name);

    let result = downloader.download(&url, &directory.join(&file_name));
    match &result {
        Ok(bytes) => progress.download_finished(&file_name, &directory, *bytes),
        Err(err) => progress.download_failed(&file_name, &err.to_string()),
    }

    FetchOutcome {
        url,
        file_name,
        result,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use super::*;
    use crate::progress::LogProgress;

    use pretty_assertions::assert_eq;

    /// Writes the url as the file content; urls in `failing` error out.
    #[derive(Default)]
    struct FakeDownloader {
        failing: HashSet<String>,
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Downloader for FakeDownloader {
        fn download(&self, url: &str, destination: &Path) -> Result<u64, DownloadError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(url) {
                return Err(DownloadError::Transport {
                    url: url.to_string(),
                    message: "connection reset".to_string(),
                });
            }
            std::fs::write(destination, url)?;
            Ok(url.len() as u64)
        }
    }

    fn packages(names: &[&str]) -> BTreeMap<String, String> {
        names
            .iter()
            .map(|name| (format!("https://x/{name}"), name.to_string()))
            .collect()
    }

    #[test]
    fn fetches_every_package() {
        let dir = tempfile::tempdir().unwrap();
        let packages = packages(&["numpy-1.0.tar.bz2", "python-3.11.conda"]);

        let report = fetch_packages(
            Arc::new(FakeDownloader::default()),
            Arc::new(LogProgress),
            &packages,
            dir.path(),
            DEFAULT_WORKERS,
        )
        .unwrap()
        .into_result()
        .unwrap();

        assert_eq!(report.outcomes().len(), 2);
        for (url, file_name) in &packages {
            let content = std::fs::read_to_string(dir.path().join(file_name)).unwrap();
            assert_eq!(&content, url);
        }
    }

    #[test]
    fn failed_download_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let packages = packages(&["a-1.conda", "b-1.conda", "c-1.conda"]);
        let downloader = FakeDownloader {
            failing: HashSet::from(["https://x/b-1.conda".to_string()]),
            ..Default::default()
        };

        let report = fetch_packages(
            Arc::new(downloader),
            Arc::new(LogProgress),
            &packages,
            dir.path(),
            DEFAULT_WORKERS,
        )
        .unwrap();

        assert!(dir.path().join("a-1.conda").exists());
        assert!(!dir.path().join("b-1.conda").exists());
        assert!(dir.path().join("c-1.conda").exists());
        assert_eq!(
            report.failures().map(|o| o.file_name.as_str()).collect::<Vec<_>>(),
            vec!["b-1.conda"]
        );

        match report.into_result() {
            Err(FetchError::Incomplete { failed, total, .. }) => {
                assert_eq!((failed, total), (1, 3));
            }
            other => panic!("expected an incomplete fetch, got {other:?}"),
        }
    }

    #[test]
    fn concurrency_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let names = (0..8).map(|i| format!("pkg-{i}.conda")).collect::<Vec<_>>();
        let packages = packages(&names.iter().map(String::as_str).collect::<Vec<_>>());
        let downloader = Arc::new(FakeDownloader {
            delay: Duration::from_millis(30),
            ..Default::default()
        });

        fetch_packages(
            downloader.clone(),
            Arc::new(LogProgress),
            &packages,
            dir.path(),
            2,
        )
        .unwrap()
        .into_result()
        .unwrap();

        assert!(downloader.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn existing_files_are_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("numpy-1.0.tar.bz2"), "stale").unwrap();

        fetch_packages(
            Arc::new(FakeDownloader::default()),
            Arc::new(LogProgress),
            &packages(&["numpy-1.0.tar.bz2"]),
            dir.path(),
            DEFAULT_WORKERS,
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("numpy-1.0.tar.bz2")).unwrap(),
            "https://x/numpy-1.0.tar.bz2"
        );
    }

    #[test]
    fn fetches_from_inside_a_current_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let packages = packages(&["numpy-1.0.tar.bz2", "python-3.11.conda"]);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let report = runtime
            .block_on(async {
                fetch_packages(
                    Arc::new(FakeDownloader::default()),
                    Arc::new(LogProgress),
                    &packages,
                    dir.path(),
                    DEFAULT_WORKERS,
                )
            })
            .unwrap();

        assert_eq!(report.failures().count(), 0);
        assert!(dir.path().join("python-3.11.conda").is_file());
    }

    #[test]
    fn fetches_from_inside_a_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let packages = packages(&["numpy-1.0.tar.bz2"]);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .build()
            .unwrap();

        let report = runtime
            .block_on(async {
                fetch_packages(
                    Arc::new(FakeDownloader::default()),
                    Arc::new(LogProgress),
                    &packages,
                    dir.path(),
                    2,
                )
            })
            .unwrap();

        assert_eq!(report.outcomes().len(), 1);
        assert!(dir.path().join("numpy-1.0.tar.bz2").is_file());
    }

    /// Yields `prefix` and then fails like a connection dropped mid-body.
    struct BrokenBody {
        prefix: &'static [u8],
        sent: bool,
    }

    impl Read for BrokenBody {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ));
            }
            self.sent = true;
            let len = self.prefix.len().min(buf.len());
            buf[..len].copy_from_slice(&self.prefix[..len]);
            Ok(len)
        }
    }

    #[test]
    fn interrupted_body_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("numpy-1.0.tar.bz2");
        let mut body = BrokenBody {
            prefix: b"partial",
            sent: false,
        };

        assert!(write_atomically(&mut body, &destination).is_err());

        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn interrupted_body_keeps_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("numpy-1.0.tar.bz2");
        std::fs::write(&destination, "previous").unwrap();
        let mut body = BrokenBody {
            prefix: b"partial",
            sent: false,
        };

        assert!(write_atomically(&mut body, &destination).is_err());

        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "previous");
    }

    #[test]
    fn complete_body_replaces_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("numpy-1.0.tar.bz2");
        std::fs::write(&destination, "previous").unwrap();

        let bytes = write_atomically(&mut &b"complete body"[..], &destination).unwrap();

        assert_eq!(bytes, 13);
        assert_eq!(
            std::fs::read_to_string(&destination).unwrap(),
            "complete body"
        );
    }

    #[test]
    fn missing_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = fetch_packages(
            Arc::new(FakeDownloader::default()),
            Arc::new(LogProgress),
            &packages(&["numpy-1.0.tar.bz2"]),
            &dir.path().join("conda"),
            DEFAULT_WORKERS,
        );
        assert!(matches!(result, Err(FetchError::BadOutputDir(_))));
    }
}
