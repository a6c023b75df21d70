use std::path::{Path, PathBuf};

use crate::core::error::{ProvisionError, ProvisionResult};

/// File name of the PID record inside the working directory.
pub const PID_FILE_NAME: &str = "event-store-pid";

/// Process ID persisted between the start and stop goals, which usually run
/// in separate invocations.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    path: PathBuf,
}

impl ProcessRecord {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(PID_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Persist `pid`, replacing any previous record.
    pub fn write(&self, pid: &str) -> ProvisionResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ProvisionError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, pid).map_err(|source| ProvisionError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn read(&self) -> ProvisionResult<String> {
        std::fs::read_to_string(&self.path)
            .map(|pid| pid.trim().to_string())
            .map_err(|source| ProvisionError::NoPidRecorded {
                path: self.path.clone(),
                source,
            })
    }

    pub fn delete(&self) -> ProvisionResult<()> {
        std::fs::remove_file(&self.path).map_err(|source| ProvisionError::PidFileDeleteFailed {
            path: self.path.clone(),
            source,
        })
    }
}
