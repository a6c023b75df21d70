// ─── Provisioning Config ───
// JSON settings shared by all goals. Every field has a default, so an empty
// document (or no file at all) is a valid configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::resolver::HostFamily;
use crate::core::supervisor::{
    CommandSpec, ReadinessPolicy, DEFAULT_MAX_WAIT_CYCLES, DEFAULT_READINESS_MARKER,
    DEFAULT_SLEEP_MILLIS,
};

pub const DEFAULT_CATALOG_URL: &str = "https://geteventstore.com/downloads/downloads";
pub const DEFAULT_TARGET_DIR: &str = "./target";
pub const DEFAULT_ARGUMENT: &str = "--mem-db=TRUE";
pub const CATALOG_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BASE_URL: &str = "http://download.geteventstore.com/binaries/";

const WINDOWS_START_COMMAND: &str = "EventStore.ClusterNode.exe";
const UNIX_START_COMMAND: &str = "./run-node.sh";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Build output directory; holds the archive and the PID record.
    pub target_dir: PathBuf,
    /// Where the server ends up; derived from the archive name when absent.
    pub install_dir: Option<PathBuf>,
    /// Explicit archive URL. Skips the catalog entirely.
    pub download_url: Option<String>,
    /// With `archive_version` set, the archive URL is
    /// `{base_url}{archive_name}-v{archive_version}.{archive_extension}`
    /// and the catalog is not consulted.
    pub archive_version: Option<String>,
    pub base_url: String,
    /// Defaults to `EventStore-OSS-{Win,Mac,Linux}` for the host family.
    pub archive_name: Option<String>,
    /// Defaults to `zip` on Windows, `tar.gz` elsewhere.
    pub archive_extension: Option<String>,
    pub catalog_url: String,
    /// Exact catalog version to install instead of the latest one.
    pub version: Option<String>,
    /// Substring picking the OS variant, e.g. "Ubuntu 16" or "CentOS".
    pub os_qualifier: Option<String>,
    pub include_prereleases: bool,
    /// Host OS name as reported by `std::env::consts::OS`.
    pub host_os: String,
    pub command: Option<String>,
    pub arguments: Vec<String>,
    pub max_wait_cycles: u32,
    pub sleep_millis: u64,
    pub readiness_marker: String,
    /// Program and leading arguments; the recorded PID is appended.
    pub stop_command: Option<Vec<String>>,
    pub post_start_command: Option<Vec<String>>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from(DEFAULT_TARGET_DIR),
            install_dir: None,
            download_url: None,
            archive_version: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            archive_name: None,
            archive_extension: None,
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            version: None,
            os_qualifier: None,
            include_prereleases: false,
            host_os: std::env::consts::OS.to_string(),
            command: None,
            arguments: vec![DEFAULT_ARGUMENT.to_string()],
            max_wait_cycles: DEFAULT_MAX_WAIT_CYCLES,
            sleep_millis: DEFAULT_SLEEP_MILLIS,
            readiness_marker: DEFAULT_READINESS_MARKER.to_string(),
            stop_command: None,
            post_start_command: None,
        }
    }
}

impl ProvisionConfig {
    /// Load from a JSON file, or defaults when no path is given.
    pub async fn load(path: Option<&Path>) -> ProvisionResult<Self> {
        let Some(path) = path else {
            debug!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ProvisionError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> ProvisionResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn host_family(&self) -> Option<HostFamily> {
        HostFamily::classify(&self.host_os)
    }

    fn require_host_family(&self, what: &str) -> ProvisionResult<HostFamily> {
        self.host_family().ok_or_else(|| {
            ProvisionError::InvalidConfig(format!(
                "no default {what} for OS '{}', configure one explicitly",
                self.host_os
            ))
        })
    }

    /// Archive URL composed from name and version; `None` leaves it to the catalog.
    pub fn composed_download_url(&self) -> ProvisionResult<Option<String>> {
        let Some(version) = &self.archive_version else {
            return Ok(None);
        };

        let name = match &self.archive_name {
            Some(name) => name.clone(),
            None => match self.require_host_family("archive_name")? {
                HostFamily::Windows => "EventStore-OSS-Win".to_string(),
                HostFamily::Mac => "EventStore-OSS-Mac".to_string(),
                HostFamily::Linux => "EventStore-OSS-Linux".to_string(),
            },
        };
        let extension = match &self.archive_extension {
            Some(extension) => extension.clone(),
            None => match self.require_host_family("archive_extension")? {
                HostFamily::Windows => "zip".to_string(),
                HostFamily::Mac | HostFamily::Linux => "tar.gz".to_string(),
            },
        };

        let base = self.base_url.trim_end_matches('/');
        Ok(Some(format!("{base}/{name}-v{version}.{extension}")))
    }

    /// Server launch command with its arguments.
    pub fn start_command(&self) -> ProvisionResult<CommandSpec> {
        let program = match &self.command {
            Some(command) => command.clone(),
            None => match self.require_host_family("command")? {
                HostFamily::Windows => WINDOWS_START_COMMAND.to_string(),
                HostFamily::Mac | HostFamily::Linux => UNIX_START_COMMAND.to_string(),
            },
        };
        Ok(CommandSpec::new(program, self.arguments.clone()))
    }

    /// Termination command without the PID argument.
    pub fn stop_command(&self) -> ProvisionResult<CommandSpec> {
        if let Some(parts) = &self.stop_command {
            return CommandSpec::from_parts(parts)
                .ok_or_else(|| ProvisionError::InvalidConfig("stop_command is empty".into()));
        }
        Ok(match self.require_host_family("stop_command")? {
            HostFamily::Windows => {
                CommandSpec::new("taskkill", vec!["/F".to_string(), "/PID".to_string()])
            }
            HostFamily::Mac | HostFamily::Linux => CommandSpec::new("kill", Vec::new()),
        })
    }

    pub fn post_start_command(&self) -> ProvisionResult<CommandSpec> {
        self.post_start_command
            .as_deref()
            .and_then(CommandSpec::from_parts)
            .ok_or_else(|| {
                ProvisionError::InvalidConfig("post_start_command is required and non-empty".into())
            })
    }

    pub fn readiness(&self) -> ProvisionResult<ReadinessPolicy> {
        if self.readiness_marker.is_empty() {
            return Err(ProvisionError::InvalidConfig(
                "readiness_marker must not be empty".into(),
            ));
        }
        Ok(ReadinessPolicy {
            marker: self.readiness_marker.clone(),
            max_wait_cycles: self.max_wait_cycles,
            poll_interval: std::time::Duration::from_millis(self.sleep_millis),
        })
    }
}
