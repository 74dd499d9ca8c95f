//! Archive unpacking into installation directories.
//!
//! Archives are unpacked into a sibling temp directory first. When the
//! archive has a single top-level directory (as CodeQL bundles do, with
//! `codeql/`), its contents become the installation directory. The result
//! replaces any existing installation and the `.installedFrom` marker is
//! written last, so an interrupted install is never considered current.

use codeql_env_core::{Error, Result};
use flate2::read::GzDecoder;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, trace};

/// Marker file recording the URL an installation was unpacked from.
pub const INSTALLED_FROM: &str = ".installedFrom";

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Zip archive
    Zip,
    /// Gzip-compressed tarball
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from the archive's leading bytes.
    #[must_use]
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06") {
            Some(Self::Zip)
        } else if data.starts_with(&[0x1f, 0x8b]) {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// Whether `dir` holds an installation unpacked from `url`.
#[must_use]
pub fn is_up_to_date(dir: &Path, url: &str) -> bool {
    std::fs::read_to_string(dir.join(INSTALLED_FROM)).is_ok_and(|from| from == url)
}

/// Unpack `data` into `dest`, replacing its contents, and record `url` as
/// the installation source.
///
/// # Errors
///
/// Returns an error if the archive format is unsupported or corrupt, or if
/// the filesystem operations fail.
pub fn unpack(data: &[u8], url: &str, dest: &Path) -> Result<()> {
    let format = ArchiveFormat::detect(data)
        .ok_or_else(|| Error::unpack(url, "unsupported archive format (expected zip or tar.gz)"))?;

    let parent = dest
        .parent()
        .ok_or_else(|| Error::configuration(format!("Invalid installation directory: {}", dest.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create directory"))?;

    let temp_dir = dest.with_file_name(format!(
        ".{}.tmp",
        dest.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("codeql")
    ));

    // Clean up any previous failed extraction
    if temp_dir.exists() {
        std::fs::remove_dir_all(&temp_dir).map_err(|e| Error::io(e, &temp_dir, "remove"))?;
    }
    std::fs::create_dir_all(&temp_dir).map_err(|e| Error::io(e, &temp_dir, "create directory"))?;
    let staging = StagingDir(temp_dir);

    match format {
        ArchiveFormat::Zip => extract_zip(data, url, staging.path())?,
        ArchiveFormat::TarGz => extract_tar_gz(data, url, staging.path())?,
    }

    let source = pull_up_directory(staging.path())?.unwrap_or_else(|| staging.path().to_path_buf());
    debug!(from = ?source, to = ?dest, "Moving unpacked installation into place");

    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| Error::io(e, dest, "remove"))?;
    }
    std::fs::rename(&source, dest).map_err(|e| Error::io(e, dest, "rename"))?;
    drop(staging);

    let marker = dest.join(INSTALLED_FROM);
    std::fs::write(&marker, url).map_err(|e| Error::io(e, &marker, "write"))?;
    Ok(())
}

/// Extraction directory, removed with whatever is left in it when dropped.
struct StagingDir(PathBuf);

impl StagingDir {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.0.exists()
            && let Err(e) = std::fs::remove_dir_all(&self.0)
        {
            debug!(path = ?self.0, error = %e, "Failed to remove extraction directory");
        }
    }
}

/// The single top-level directory of an unpacked archive, if it has exactly one entry.
fn pull_up_directory(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| Error::io(e, dir, "read directory"))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io(e, dir, "read directory"))?;

    if entries.len() != 1 {
        return Ok(None);
    }
    let only = entries.remove(0).path();
    Ok(only.is_dir().then_some(only))
}

fn extract_zip(data: &[u8], url: &str, dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| Error::unpack(url, format!("Failed to open zip: {e}")))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| Error::unpack(url, format!("Failed to read zip entry: {e}")))?;

        let Some(outpath) = file.enclosed_name().map(|path| dest.join(path)) else {
            trace!(entry = file.name(), "Skipping zip entry outside the archive root");
            continue;
        };

        if file.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| Error::io(e, &outpath, "create directory"))?;
            continue;
        }

        if let Some(p) = outpath.parent() {
            std::fs::create_dir_all(p).map_err(|e| Error::io(e, p, "create directory"))?;
        }
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| Error::unpack(url, format!("Failed to read zip entry: {e}")))?;
        std::fs::write(&outpath, &content).map_err(|e| Error::io(e, &outpath, "write"))?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| Error::io(e, &outpath, "chmod"))?;
        }
    }
    Ok(())
}

fn extract_tar_gz(data: &[u8], url: &str, dest: &Path) -> Result<()> {
    let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));
    archive
        .unpack(dest)
        .map_err(|e| Error::unpack(url, format!("Failed to extract tar: {e}")))
}

/// Recursively add execute permission for everyone to every regular file under `dir`.
///
/// # Errors
///
/// Returns an error if the directory cannot be walked or a permission cannot be changed.
#[cfg(unix)]
pub fn mark_executable(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            Error::io(std::io::Error::other(e), path, "walk")
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let mut perms = std::fs::metadata(path)
            .map_err(|e| Error::io(e, path, "stat"))?
            .permissions();
        perms.set_mode(perms.mode() | 0o111);
        std::fs::set_permissions(path, perms).map_err(|e| Error::io(e, path, "chmod"))?;
    }
    Ok(())
}

/// Execute bits do not exist on this platform.
#[cfg(not(unix))]
pub fn mark_executable(_dir: &Path) -> Result<()> {
    Ok(())
}
