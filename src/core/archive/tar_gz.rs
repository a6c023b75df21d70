use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::core::error::{ProvisionError, ProvisionResult};

use super::{check_entry_path, create_dir_safe, FileMode};

fn open_archive(archive_path: &Path) -> ProvisionResult<tar::Archive<GzDecoder<File>>> {
    let file = File::open(archive_path).map_err(|source| ProvisionError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    Ok(tar::Archive::new(GzDecoder::new(file)))
}

fn read_error(archive_path: &Path) -> impl Fn(std::io::Error) -> ProvisionError + '_ {
    move |source| ProvisionError::Io {
        path: archive_path.to_path_buf(),
        source,
    }
}

/// Extract a gzip-compressed tar archive into `destination`.
///
/// Entry names are validated in a first pass over the archive. The second
/// pass writes directories and regular files, then applies each file's
/// stored mode bits. Links and other special entries are skipped.
pub fn extract_tar_gz(archive_path: &Path, destination: &Path) -> ProvisionResult<()> {
    {
        let mut archive = open_archive(archive_path)?;
        for entry in archive.entries().map_err(read_error(archive_path))? {
            let entry = entry.map_err(read_error(archive_path))?;
            let path = entry.path().map_err(read_error(archive_path))?;
            check_entry_path(&path.to_string_lossy())?;
        }
    }

    create_dir_safe(destination)?;

    let mut archive = open_archive(archive_path)?;
    for entry in archive.entries().map_err(read_error(archive_path))? {
        let mut entry = entry.map_err(read_error(archive_path))?;
        let relative: PathBuf = entry.path().map_err(read_error(archive_path))?.into_owned();
        let out_path = destination.join(&relative);
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            create_dir_safe(&out_path)?;
            continue;
        }

        if !entry_type.is_file() {
            debug!("Skipping tar entry {:?} of type {:?}", relative, entry_type);
            continue;
        }

        if let Some(parent) = out_path.parent() {
            create_dir_safe(parent)?;
        }

        {
            let mut out = File::create(&out_path).map_err(|source| ProvisionError::Io {
                path: out_path.clone(),
                source,
            })?;
            std::io::copy(&mut entry, &mut out).map_err(|source| ProvisionError::Io {
                path: out_path.clone(),
                source,
            })?;
        }

        let mode = entry.header().mode().map_err(read_error(archive_path))?;
        FileMode::from_mode(mode)?.apply(&out_path)?;
        debug!("Extracted {:?} with mode {:o}", out_path, mode);
    }

    Ok(())
}
