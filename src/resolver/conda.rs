use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use log::{debug, trace};
use serde::Deserialize;

use crate::model::{MatchSpec, ResolvedPackage};

use super::{CondaEnvironment, CondaSolver, ResolveError, SolveDiff};

const ARTIFACT_EXTENSIONS: [&str; 2] = [".conda", ".tar.bz2"];

/// Solver backed by the `conda` command line.
pub struct CondaCli {
    executable: PathBuf,
}

impl CondaCli {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        CondaCli {
            executable: executable.into(),
        }
    }

    fn run(&self, command: &mut Command) -> Result<Output, ResolveError> {
        trace!("Running {:?}", command);
        command.output().map_err(|source| ResolveError::Spawn {
            program: self.executable.display().to_string(),
            source,
        })
    }

    fn solve_command(
        &self,
        environment: &CondaEnvironment,
        specs: &[MatchSpec],
        package_cache: &Path,
    ) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .args(["install", "--dry-run", "--json", "--prefix"])
            .arg(&environment.prefix)
            .env("CONDA_PKGS_DIRS", package_cache);
        if !environment.channels.is_empty() {
            command.arg("--override-channels");
            for channel in &environment.channels {
                command.arg("-c").arg(channel);
            }
        }
        command.args(specs.iter().map(MatchSpec::as_str));
        command
    }
}

impl CondaSolver for CondaCli {
    fn environment(&self) -> Result<CondaEnvironment, ResolveError> {
        let output = self.run(Command::new(&self.executable).args(["info", "--json"]))?;
        if !output.status.success() {
            return Err(ResolveError::Info(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        parse_info(&output.stdout)
    }

    fn solve_for_diff(
        &self,
        environment: &CondaEnvironment,
        specs: &[MatchSpec],
    ) -> Result<SolveDiff, ResolveError> {
        // An empty package cache makes conda report every linked package under FETCH,
        // which is where the download urls live.
        let package_cache = tempfile::tempdir()?;
        let mut command = self.solve_command(environment, specs, package_cache.path());

        debug!(
            "Solving {} specs against {}",
            specs.len(),
            environment.prefix.display()
        );
        let output = self.run(&mut command)?;
        if !output.status.success() {
            return Err(parse_error(&output));
        }
        parse_dry_run(&output.stdout)
    }
}

#[derive(Deserialize)]
struct CondaInfo {
    active_prefix: Option<PathBuf>,
    conda_prefix: PathBuf,
    #[serde(default)]
    channels: Vec<String>,
    platform: Option<String>,
}

fn parse_info(data: &[u8]) -> Result<CondaEnvironment, ResolveError> {
    let info = serde_json::from_slice::<CondaInfo>(data)?;
    let prefix = info.active_prefix.unwrap_or(info.conda_prefix);

    let mut channels: Vec<String> = Vec::new();
    for channel in &info.channels {
        let channel = strip_subdir(channel, info.platform.as_deref());
        if !channels.iter().any(|c| c == channel) {
            channels.push(channel.to_string());
        }
    }

    Ok(CondaEnvironment { prefix, channels })
}

/// `conda info` lists one url per channel subdir; the solver wants the channel itself.
fn strip_subdir<'a>(channel: &'a str, platform: Option<&str>) -> &'a str {
    let channel = channel.trim_end_matches('/');
    for subdir in platform.into_iter().chain(["noarch"]) {
        if let Some(stripped) = channel.strip_suffix(subdir) {
            if let Some(stripped) = stripped.strip_suffix('/') {
                return stripped;
            }
        }
    }
    channel
}

#[derive(Deserialize, Default)]
struct DryRunReport {
    actions: Option<Actions>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
struct Actions {
    #[serde(default)]
    fetch: Vec<FetchRecord>,
    #[serde(default)]
    link: Vec<LinkRecord>,
    #[serde(default)]
    unlink: Vec<LinkRecord>,
}

#[derive(Deserialize)]
struct FetchRecord {
    url: String,
    #[serde(rename = "fn")]
    file_name: String,
}

#[derive(Deserialize)]
struct LinkRecord {
    dist_name: String,
}

fn parse_dry_run(data: &[u8]) -> Result<SolveDiff, ResolveError> {
    let report = serde_json::from_slice::<DryRunReport>(data)?;
    let Some(actions) = report.actions else {
        debug!("Solver reported nothing to do");
        return Ok(SolveDiff::default());
    };

    let mut fetched = actions
        .fetch
        .into_iter()
        .map(|record| (dist_name(&record.file_name).to_string(), record))
        .collect::<HashMap<_, _>>();

    let to_add = actions
        .link
        .into_iter()
        .map(|link| {
            fetched
                .remove(&link.dist_name)
                .map(|record| ResolvedPackage::new(record.url, record.file_name))
                .ok_or(ResolveError::MissingArtifact(link.dist_name))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let to_remove = actions
        .unlink
        .into_iter()
        .map(|record| record.dist_name)
        .collect();

    Ok(SolveDiff { to_remove, to_add })
}

fn dist_name(file_name: &str) -> &str {
    ARTIFACT_EXTENSIONS
        .iter()
        .find_map(|extension| file_name.strip_suffix(extension))
        .unwrap_or(file_name)
}

#[derive(Deserialize)]
struct ErrorReport {
    exception_name: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

fn parse_error(output: &Output) -> ResolveError {
    match serde_json::from_slice::<ErrorReport>(&output.stdout) {
        Ok(report) => ResolveError::Solver {
            exception: report
                .exception_name
                .unwrap_or_else(|| "CondaError".to_string()),
            message: report
                .message
                .or(report.error)
                .unwrap_or_default()
                .trim()
                .to_string(),
        },
        Err(_) => ResolveError::Solver {
            exception: format!("exit status {}", output.status),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        },
    }
}

impl Default for CondaCli {
    fn default() -> Self {
        let executable = std::env::var_os("CONDA_EXE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("conda"));
        CondaCli::new(executable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn info_uses_active_prefix() {
        let data = br#"{
            "active_prefix": "/opt/conda/envs/work",
            "conda_prefix": "/opt/conda",
            "platform": "linux-64",
            "channels": [
                "https://conda.anaconda.org/conda-forge/linux-64",
                "https://conda.anaconda.org/conda-forge/noarch",
                "https://repo.anaconda.com/pkgs/main/linux-64",
                "https://repo.anaconda.com/pkgs/main/noarch"
            ]
        }"#;
        assert_eq!(
            parse_info(data).unwrap(),
            CondaEnvironment {
                prefix: PathBuf::from("/opt/conda/envs/work"),
                channels: vec![
                    "https://conda.anaconda.org/conda-forge".to_string(),
                    "https://repo.anaconda.com/pkgs/main".to_string(),
                ],
            }
        );
    }

    #[test]
    fn info_falls_back_to_base_prefix() {
        let data = br#"{
            "active_prefix": null,
            "conda_prefix": "/opt/conda",
            "channels": ["conda-forge"]
        }"#;
        let environment = parse_info(data).unwrap();
        assert_eq!(environment.prefix, PathBuf::from("/opt/conda"));
        assert_eq!(environment.channels, vec!["conda-forge".to_string()]);
    }

    #[test]
    fn dry_run_joins_link_and_fetch() {
        let data = br#"{
            "actions": {
                "FETCH": [
                    {
                        "fn": "python-3.11.6-hab00c5b_0_cpython.conda",
                        "url": "https://conda.anaconda.org/conda-forge/linux-64/python-3.11.6-hab00c5b_0_cpython.conda",
                        "name": "python"
                    },
                    {
                        "fn": "numpy-1.26.0-py311h64a7726_0.tar.bz2",
                        "url": "https://conda.anaconda.org/conda-forge/linux-64/numpy-1.26.0-py311h64a7726_0.tar.bz2",
                        "name": "numpy"
                    }
                ],
                "LINK": [
                    {"dist_name": "numpy-1.26.0-py311h64a7726_0", "name": "numpy"},
                    {"dist_name": "python-3.11.6-hab00c5b_0_cpython", "name": "python"}
                ],
                "UNLINK": [
                    {"dist_name": "numpy-1.24.4-py311h64a7726_0", "name": "numpy"}
                ],
                "PREFIX": "/opt/conda"
            },
            "dry_run": true,
            "success": true
        }"#;
        assert_eq!(
            parse_dry_run(data).unwrap(),
            SolveDiff {
                to_remove: vec!["numpy-1.24.4-py311h64a7726_0".to_string()],
                to_add: vec![
                    ResolvedPackage::new(
                        "https://conda.anaconda.org/conda-forge/linux-64/numpy-1.26.0-py311h64a7726_0.tar.bz2",
                        "numpy-1.26.0-py311h64a7726_0.tar.bz2"
                    ),
                    ResolvedPackage::new(
                        "https://conda.anaconda.org/conda-forge/linux-64/python-3.11.6-hab00c5b_0_cpython.conda",
                        "python-3.11.6-hab00c5b_0_cpython.conda"
                    ),
                ],
            }
        );
    }

    #[test]
    fn dry_run_without_actions_is_empty() {
        let data = br#"{"message": "All requested packages already installed.", "success": true}"#;
        assert_eq!(parse_dry_run(data).unwrap(), SolveDiff::default());
    }

    #[test]
    fn dry_run_link_without_fetch_record() {
        let data = br#"{"actions": {"FETCH": [], "LINK": [{"dist_name": "zlib-1.3-h0"}]}}"#;
        let result = parse_dry_run(data);
        assert!(matches!(result, Err(ResolveError::MissingArtifact(name)) if name == "zlib-1.3-h0"));
    }

    #[test]
    fn solve_command_line() {
        let conda = CondaCli::new("/opt/conda/bin/conda");
        let environment = CondaEnvironment {
            prefix: PathBuf::from("/opt/conda/envs/work"),
            channels: vec![
                "https://conda.anaconda.org/conda-forge".to_string(),
                "defaults".to_string(),
            ],
        };
        let command = conda.solve_command(
            &environment,
            &[MatchSpec::from("numpy"), MatchSpec::from("scipy>=1.11")],
            Path::new("/tmp/empty-cache"),
        );

        assert_eq!(command.get_program(), "/opt/conda/bin/conda");
        assert_eq!(
            command.get_args().collect::<Vec<_>>(),
            vec![
                "install",
                "--dry-run",
                "--json",
                "--prefix",
                "/opt/conda/envs/work",
                "--override-channels",
                "-c",
                "https://conda.anaconda.org/conda-forge",
                "-c",
                "defaults",
                "numpy",
                "scipy>=1.11",
            ]
        );
        assert_eq!(
            command.get_envs().collect::<Vec<_>>(),
            vec![(
                std::ffi::OsStr::new("CONDA_PKGS_DIRS"),
                Some(std::ffi::OsStr::new("/tmp/empty-cache"))
            )]
        );
    }

    #[test]
    fn solve_command_without_channels_keeps_conda_defaults() {
        let conda = CondaCli::new("conda");
        let environment = CondaEnvironment {
            prefix: PathBuf::from("/opt/conda"),
            channels: vec![],
        };
        let command =
            conda.solve_command(&environment, &[MatchSpec::from("numpy")], Path::new("/tmp/c"));

        assert_eq!(
            command.get_args().collect::<Vec<_>>(),
            vec!["install", "--dry-run", "--json", "--prefix", "/opt/conda", "numpy"]
        );
    }

    #[test]
    fn subdir_is_only_stripped_as_a_path_segment() {
        assert_eq!(
            strip_subdir("https://example.com/my-noarch", Some("linux-64")),
            "https://example.com/my-noarch"
        );
        assert_eq!(
            strip_subdir("https://example.com/chan/linux-64/", Some("linux-64")),
            "https://example.com/chan"
        );
    }
}
