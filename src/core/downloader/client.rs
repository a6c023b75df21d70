use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, Url};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::archive::archive_file_name;
use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::http::build_http_client;

/// Local path behind a `file://` URL; `None` for any other scheme.
pub fn file_url_path(url: &str) -> ProvisionResult<Option<PathBuf>> {
    let Ok(parsed) = Url::parse(url) else {
        return Ok(None);
    };
    if parsed.scheme() != "file" {
        return Ok(None);
    }
    parsed
        .to_file_path()
        .map(Some)
        .map_err(|()| ProvisionError::InvalidUrl(url.to_string()))
}

/// Fetches the version catalog and server archives over HTTP(S) or from `file://` URLs.
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(timeout: Duration) -> ProvisionResult<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
        })
    }

    /// GET `url` and return the body as text.
    pub async fn fetch_text(&self, url: &str) -> ProvisionResult<String> {
        if let Some(path) = file_url_path(url)? {
            return tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| ProvisionError::Io { path, source });
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    /// Download the archive at `url` into `target_dir`, keeping its file name.
    ///
    /// An archive already present under that name is reused as is. HTTP
    /// bodies are streamed to a `.part` file that is renamed on completion,
    /// so an interrupted download never looks like a finished one.
    pub async fn download_archive(&self, url: &str, target_dir: &Path) -> ProvisionResult<PathBuf> {
        let file_name = archive_file_name(url)
            .ok_or_else(|| ProvisionError::UnsupportedArchive(url.to_string()))?;
        let dest = target_dir.join(&file_name);

        if dest.exists() {
            info!("Archive already downloaded: {:?}", dest);
            return Ok(dest);
        }

        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|source| ProvisionError::Io {
                path: target_dir.to_path_buf(),
                source,
            })?;

        if let Some(source_path) = file_url_path(url)? {
            tokio::fs::copy(&source_path, &dest)
                .await
                .map_err(|source| ProvisionError::Io {
                    path: source_path.clone(),
                    source,
                })?;
            info!("Archive copied from {:?} to {:?}", source_path, dest);
            return Ok(dest);
        }

        info!("Downloading archive: {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let part = target_dir.join(format!("{}.{}.part", file_name, Uuid::new_v4()));
        let written = match stream_to_file(response, &part).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&part, &dest)
            .await
            .map_err(|source| ProvisionError::Io {
                path: dest.clone(),
                source,
            })?;

        info!("Downloaded {} bytes to {:?}", written, dest);
        Ok(dest)
    }
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> ProvisionResult<u64> {
    let io_err = |source| ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    let mut stream = response.bytes_stream();
    let mut written = 0_u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;
    debug!("Wrote {} bytes to {:?}", written, path);
    Ok(written)
}
