use std::{
    fs::{File, Metadata},
    path::Path,
};

use log::trace;
use thiserror::Error;
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Error while walking the bundle directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Bad archive entry {0}")]
    BadPath(String),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Zips the content of `source` into `archive`. Entry names are relative to
/// `source` and use `/` separators.
pub fn compress_directory(source: &Path, archive: &Path) -> Result<(), ArchiveError> {
    let mut zip = ZipWriter::new(File::create(archive)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let name = entry_name(source, entry.path())?;

        if entry.file_type().is_dir() {
            trace!("Adding directory {}", name);
            zip.add_directory(name, options)?;
        } else {
            trace!("Adding file {}", name);
            let metadata = entry.metadata()?;
            let options = options.large_file(needs_zip64(metadata.len()));
            let options = match file_mode(&metadata) {
                Some(mode) => options.unix_permissions(mode),
                None => options,
            };
            zip.start_file(name, options)?;
            std::io::copy(&mut File::open(entry.path())?, &mut zip)?;
        }
    }

    zip.finish()?;
    Ok(())
}

fn entry_name(source: &Path, path: &Path) -> Result<String, ArchiveError> {
    let relative = path
        .strip_prefix(source)
        .map_err(|_| ArchiveError::BadPath(path.display().to_string()))?;
    Ok(relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Entries past the 32-bit size limit need zip64 extra fields.
fn needs_zip64(len: u64) -> bool {
    len > u64::from(u32::MAX)
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_metadata: &Metadata) -> Option<u32> {
    None
}
