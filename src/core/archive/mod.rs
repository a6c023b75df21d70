// ─── Archive Installer ───
// Unpacks a downloaded `.zip` or `.tar.gz` into the target directory.

pub mod file_mode;
pub mod tar_gz;
pub mod zip_archive;

use std::path::{Component, Path, PathBuf};

use reqwest::Url;
use tracing::info;

use crate::core::error::{ProvisionError, ProvisionResult};

pub use file_mode::FileMode;

/// Archive formats the installer can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// Detect the format from a file name or URL suffix.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => ".zip",
            Self::TarGz => ".tar.gz",
        }
    }
}

/// Last path segment of an archive URL without query or fragment, e.g.
/// `EventStore-OSS-Linux-v3.0.5.tar.gz`. Plain paths are accepted too.
pub fn archive_file_name(url: &str) -> Option<String> {
    // a drive letter parses as a one-letter scheme
    let parsed = Url::parse(url).ok().filter(|u| u.scheme().len() > 1);
    let name = match parsed {
        Some(parsed) if parsed.scheme() == "file" => parsed
            .to_file_path()
            .ok()?
            .file_name()?
            .to_string_lossy()
            .into_owned(),
        Some(parsed) => parsed.path_segments()?.next_back()?.to_string(),
        None => url.rsplit(['/', '\\']).next()?.to_string(),
    };
    (!name.is_empty()).then_some(name)
}

/// Default install directory for an archive URL: `target_dir/<name without extension>`.
pub fn install_dir_for(url: &str, target_dir: &Path) -> ProvisionResult<PathBuf> {
    let unsupported = || ProvisionError::UnsupportedArchive(url.to_string());
    let file_name = archive_file_name(url).ok_or_else(unsupported)?;
    let kind = ArchiveKind::from_name(&file_name).ok_or_else(unsupported)?;
    let base = &file_name[..file_name.len() - kind.extension().len()];
    Ok(target_dir.join(base))
}

/// Unpack `archive` into `destination`, dispatching on the file name suffix.
///
/// Does not check whether a previous installation exists; see [`install_once`].
pub fn install(archive: &Path, destination: &Path) -> ProvisionResult<()> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    match ArchiveKind::from_name(&name) {
        Some(ArchiveKind::Zip) => zip_archive::extract_zip(archive, destination),
        Some(ArchiveKind::TarGz) => tar_gz::extract_tar_gz(archive, destination),
        None => Err(ProvisionError::UnsupportedArchive(name)),
    }
}

/// Unpack `archive` into `destination` unless `install_dir` already exists.
///
/// Presence of the directory alone gates the skip; its content is not
/// inspected. Returns `true` when the archive was unpacked.
pub fn install_once(
    archive: &Path,
    install_dir: &Path,
    destination: &Path,
) -> ProvisionResult<bool> {
    if install_dir.exists() {
        info!("Install directory already exists: {:?}", install_dir);
        return Ok(false);
    }
    info!("Unpack archive {:?} to target directory: {:?}", archive, destination);
    install(archive, destination)?;
    Ok(true)
}

/// Reject entry names that would escape the destination directory.
pub(crate) fn check_entry_path(name: &str) -> ProvisionResult<()> {
    let unsafe_entry = || ProvisionError::UnsafeEntry {
        entry: name.to_string(),
    };

    if name.starts_with('/') || name.starts_with('\\') || Path::new(name).is_absolute() {
        return Err(unsafe_entry());
    }

    for component in Path::new(name).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => {
                return Err(unsafe_entry())
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

pub(crate) fn create_dir_safe(path: &Path) -> ProvisionResult<()> {
    std::fs::create_dir_all(path).map_err(|source| ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    })
}
