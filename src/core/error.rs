use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the provisioning backend.
/// Every module returns `Result<T, ProvisionError>`.
#[derive(Debug, Error)]
pub enum ProvisionError {
    // ── Catalog ─────────────────────────────────────────
    #[error("Malformed version catalog: {reason}")]
    MalformedCatalog { reason: String },

    #[error("No version found in catalog (include prereleases: {include_prereleases})")]
    NoVersionFound { include_prereleases: bool },

    #[error("Version '{0}' not found in catalog")]
    VersionNotFound(String),

    #[error("Unsupported operating system '{0}'; configure an explicit download URL instead")]
    UnsupportedOs(String),

    #[error("OS family '{family}' not found in version {version}")]
    FamilyNotFound { version: String, family: String },

    #[error("No variant of '{family}' matches qualifier {qualifier:?}")]
    NoMatch {
        family: String,
        qualifier: Option<String>,
    },

    #[error("No download for {family} in version {version} matches qualifier {qualifier:?}")]
    VariantNotFound {
        version: String,
        family: String,
        qualifier: Option<String>,
    },

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Not a usable file URL: {0}")]
    InvalidUrl(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Only relative path entries are allowed: [{entry}]")]
    UnsafeEntry { entry: String },

    #[error("Cannot handle archive with this extension: {0}")]
    UnsupportedArchive(String),

    #[error("Unexpected file mode: {0}")]
    InvalidFileMode(u32),

    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Process ─────────────────────────────────────────
    #[error("Failed to launch '{program}': {source}")]
    LaunchFailed {
        program: String,
        source: std::io::Error,
    },

    #[error("Waited too long for the server to start ({waited_ms} ms)")]
    StartupTimeout { waited_ms: u64, output: Vec<String> },

    #[error("Cannot extract process ID: {reason}")]
    PidFormat { reason: String, output: Vec<String> },

    #[error("Couldn't read the PID from file {path:?}: {source}")]
    NoPidRecorded {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Error stopping the server: exit code {code:?}")]
    TerminationFailed {
        code: Option<i32>,
        output: Vec<String>,
    },

    #[error("Couldn't delete the PID file {path:?}: {source}")]
    PidFileDeleteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    // ── Config ──────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used throughout the crate.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl ProvisionError {
    /// Child process output captured before the failure, if any.
    pub fn captured_output(&self) -> &[String] {
        match self {
            ProvisionError::StartupTimeout { output, .. }
            | ProvisionError::PidFormat { output, .. }
            | ProvisionError::TerminationFailed { output, .. } => output,
            _ => &[],
        }
    }

    /// Attach server output to errors that report a failed start.
    pub fn with_output(mut self, lines: Vec<String>) -> Self {
        match &mut self {
            ProvisionError::StartupTimeout { output, .. }
            | ProvisionError::PidFormat { output, .. } => *output = lines,
            _ => {}
        }
        self
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_output_is_exposed_for_process_failures() {
        let err = ProvisionError::TerminationFailed {
            code: Some(1),
            output: vec!["kill: (42) - No such process".into()],
        };
        assert_eq!(err.captured_output(), ["kill: (42) - No such process"]);
        assert_eq!(err.to_string(), "Error stopping the server: exit code Some(1)");
    }

    #[test]
    fn start_failures_take_the_server_output() {
        let err = ProvisionError::PidFormat {
            reason: "no '[' in first line: booting".into(),
            output: Vec::new(),
        }
        .with_output(vec!["booting".into()]);
        assert_eq!(err.captured_output(), ["booting"]);

        let err = ProvisionError::UnsupportedOs("haiku".into()).with_output(vec!["x".into()]);
        assert!(err.captured_output().is_empty());
    }

    #[test]
    fn other_errors_carry_no_output() {
        let err = ProvisionError::UnsupportedOs("haiku".into());
        assert!(err.captured_output().is_empty());
    }
}
