// ─── Goals ───
// The four build steps exposed by the binary. Each goal logs its resolved
// parameters, then delegates to the core modules.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::{error, info, instrument};

use crate::core::archive;
use crate::core::catalog::Catalog;
use crate::core::config::{ProvisionConfig, CATALOG_TIMEOUT_SECS};
use crate::core::downloader::Downloader;
use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::resolver::{self, VersionSelector};
use crate::core::supervisor::{CommandOutcome, ProcessSupervisor, StartedServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    Download,
    Start,
    PostStart,
    Stop,
}

impl FromStr for Goal {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "download" => Ok(Self::Download),
            "start" => Ok(Self::Start),
            "post-start" => Ok(Self::PostStart),
            "stop" => Ok(Self::Stop),
            other => Err(ProvisionError::InvalidConfig(format!(
                "unknown goal '{other}', expected download, start, post-start or stop"
            ))),
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Download => "download",
            Self::Start => "start",
            Self::PostStart => "post-start",
            Self::Stop => "stop",
        })
    }
}

pub async fn execute(goal: Goal, config: &ProvisionConfig) -> ProvisionResult<()> {
    match goal {
        Goal::Download => download(config).await.map(|_| ()),
        Goal::Start => start(config).await.map(|_| ()),
        Goal::PostStart => post_start(config).await.map(|_| ()),
        Goal::Stop => stop(config).await,
    }
}

/// Archive URL: the configured one, one composed from name and version, or
/// resolved from the version catalog.
pub async fn artifact_url(config: &ProvisionConfig, downloader: &Downloader) -> ProvisionResult<String> {
    if let Some(url) = &config.download_url {
        return Ok(url.clone());
    }
    if let Some(url) = config.composed_download_url()? {
        return Ok(url);
    }

    info!("Loading version catalog from {}", config.catalog_url);
    let raw = downloader.fetch_text(&config.catalog_url).await?;
    let catalog = Catalog::parse(&raw)?;

    let selector = match &config.version {
        Some(version) => VersionSelector::Pinned(version),
        None => VersionSelector::Latest {
            include_prereleases: config.include_prereleases,
        },
    };
    let artifact = resolver::resolve_artifact(
        &catalog,
        &config.host_os,
        config.os_qualifier.as_deref(),
        selector,
    )?;
    Ok(artifact.url)
}

fn new_downloader() -> ProvisionResult<Downloader> {
    Downloader::new(Duration::from_secs(CATALOG_TIMEOUT_SECS))
}

/// Configured install dir, or the one derived from the archive URL.
async fn install_dir(config: &ProvisionConfig) -> ProvisionResult<PathBuf> {
    if let Some(dir) = &config.install_dir {
        return Ok(dir.clone());
    }
    let url = artifact_url(config, &new_downloader()?).await?;
    archive::install_dir_for(&url, &config.target_dir)
}

fn supervisor(config: &ProvisionConfig, install_dir: &Path) -> ProvisionResult<ProcessSupervisor> {
    Ok(ProcessSupervisor::new(
        install_dir,
        &config.target_dir,
        config.readiness()?,
    ))
}

/// Download and unpack the server unless the install directory already exists.
#[instrument(skip_all)]
pub async fn download(config: &ProvisionConfig) -> ProvisionResult<PathBuf> {
    let downloader = new_downloader()?;
    let url = artifact_url(config, &downloader).await?;
    let install_dir = match &config.install_dir {
        Some(dir) => dir.clone(),
        None => archive::install_dir_for(&url, &config.target_dir)?,
    };

    info!("download-url={}", url);
    info!("target-dir={:?}", config.target_dir);
    info!("install-dir={:?}", install_dir);

    if install_dir.exists() {
        info!("Event store already installed in {:?}, skipping download", install_dir);
        return Ok(install_dir);
    }

    let archive_file = downloader.download_archive(&url, &config.target_dir).await?;
    let destination = install_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.target_dir.clone());
    let target = install_dir.clone();
    tokio::task::spawn_blocking(move || {
        archive::install_once(&archive_file, &target, &destination)
    })
    .await??;

    Ok(install_dir)
}

/// Launch the installed server and wait for it to become ready.
#[instrument(skip_all)]
pub async fn start(config: &ProvisionConfig) -> ProvisionResult<StartedServer> {
    let install_dir = install_dir(config).await?;
    let command = config.start_command()?;

    info!("install-dir={:?}", install_dir);
    info!("command={}", command.program);
    info!("arguments={:?}", command.args);

    supervisor(config, &install_dir)?.start(&command).await
}

/// Run the configured follow-up command. A nonzero exit is logged, not raised.
#[instrument(skip_all)]
pub async fn post_start(config: &ProvisionConfig) -> ProvisionResult<CommandOutcome> {
    let install_dir = install_dir(config).await?;
    let command = config.post_start_command()?;

    info!("install-dir={:?}", install_dir);
    info!("post-start-command={} {:?}", command.program, command.args);

    let outcome = supervisor(config, &install_dir)?
        .run_in_install_dir(&command)
        .await?;
    if outcome.success() {
        info!("Post-start command succeeded");
        for line in &outcome.lines {
            tracing::debug!("{}", line);
        }
    } else {
        error!("Post-start command failed with exit code {:?}", outcome.exit_code);
        for line in &outcome.lines {
            error!("{}", line);
        }
    }
    Ok(outcome)
}

/// Terminate the server recorded by a previous `start`.
#[instrument(skip_all)]
pub async fn stop(config: &ProvisionConfig) -> ProvisionResult<()> {
    let install_dir = install_dir(config).await?;
    let command = config.stop_command()?;

    info!("install-dir={:?}", install_dir);
    info!("stop-command={} {:?}", command.program, command.args);

    supervisor(config, &install_dir)?.stop(&command).await.map(|_| ())
}
