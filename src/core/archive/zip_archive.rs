use std::fs::File;
use std::path::Path;

use tracing::debug;

use crate::core::error::{ProvisionError, ProvisionResult};

use super::{check_entry_path, create_dir_safe};

/// Extract a zip archive into `destination`, keeping entry paths relative to it.
///
/// Every entry name is validated before anything is written, so an archive
/// with an absolute or escaping entry leaves the destination untouched.
/// Zip entries get no permission adjustment.
pub fn extract_zip(zip_path: &Path, destination: &Path) -> ProvisionResult<()> {
    let zip_file = File::open(zip_path).map_err(|source| ProvisionError::Io {
        path: zip_path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(zip_file)?;

    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    for name in &names {
        check_entry_path(name)?;
    }

    create_dir_safe(destination)?;

    for index in 0..archive.len() {
        let mut zipped = archive.by_index(index)?;
        let out_path = destination.join(zipped.name());

        if zipped.is_dir() {
            create_dir_safe(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            create_dir_safe(parent)?;
        }

        let mut out = File::create(&out_path).map_err(|source| ProvisionError::Io {
            path: out_path.clone(),
            source,
        })?;
        std::io::copy(&mut zipped, &mut out).map_err(|source| ProvisionError::Io {
            path: out_path.clone(),
            source,
        })?;
        debug!("Extracted {:?}", out_path);
    }

    Ok(())
}
