//! Fetch one resolved file to local storage

use super::resolver::resolve_location;
use crate::auth::session::{RequestOptions, Session};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::retry::download_with_retry;
use crate::utils::destination_path;
use futures::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};
use url::Url;

/// What happened to a single file
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FetchOutcome {
    /// Bytes were written to `path`
    Downloaded { path: PathBuf, bytes: u64 },
    /// A file of the expected size was already at `path`
    Skipped { path: PathBuf },
}

impl FetchOutcome {
    pub(crate) fn into_path(self) -> PathBuf {
        match self {
            FetchOutcome::Downloaded { path, .. } | FetchOutcome::Skipped { path } => path,
        }
    }
}

/// Download `url` into `directory`, returning the local path
///
/// The file is named after the last segment of `url`. Unless `force` is set, an
/// existing file whose size equals the declared content length is kept and no body
/// bytes are read.
///
/// # Errors
///
/// [`Error::LocationNotFound`] when the host gives no usable location,
/// [`Error::EmptyContent`] when the response declares one byte or less,
/// [`Error::UnexpectedStatus`] for a non-success response.
pub async fn fetch(
    session: &Session,
    config: &ClientConfig,
    url: &Url,
    directory: &Path,
    force: bool,
) -> Result<PathBuf> {
    fetch_file(session, config, url, directory, force)
        .await
        .map(FetchOutcome::into_path)
}

pub(crate) async fn fetch_file(
    session: &Session,
    config: &ClientConfig,
    url: &Url,
    directory: &Path,
    force: bool,
) -> Result<FetchOutcome> {
    let path = destination_path(directory, url)?;
    download_with_retry(&config.retry, || {
        fetch_once(session, config, url, &path, force)
    })
    .await
}

async fn fetch_once(
    session: &Session,
    config: &ClientConfig,
    url: &Url,
    path: &Path,
    force: bool,
) -> Result<FetchOutcome> {
    let location = resolve_location(session, config, url).await?;
    let exchange = session
        .get(location.clone(), &RequestOptions::authenticated(true))
        .await?;
    let response = exchange.response;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::UnexpectedStatus {
            url: location.to_string(),
            status: status.as_u16(),
        });
    }

    // a missing header counts as -1
    let content_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(-1);
    if content_length <= 1 {
        return Err(Error::EmptyContent {
            url: location.to_string(),
            content_length,
        });
    }
    let expected = content_length.unsigned_abs();

    if !force {
        if let Ok(meta) = tokio::fs::metadata(path).await {
            if meta.is_file() && meta.len() == expected {
                debug!(path = %path.display(), bytes = expected, "file already present, skipping");
                return Ok(FetchOutcome::Skipped {
                    path: path.to_path_buf(),
                });
            }
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file = tokio::fs::File::create(path).await?;
    let mut writer = BufWriter::with_capacity(config.download.chunk_size, file);
    let mut body = response.bytes_stream();
    let mut written: u64 = 0;

    let streamed: Result<()> = async {
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(())
    }
    .await;

    if let Err(e) = streamed {
        tokio::fs::remove_file(path).await.ok();
        return Err(e);
    }
    if written != expected {
        tokio::fs::remove_file(path).await.ok();
        return Err(Error::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            received: written,
        });
    }

    info!(url = %url, path = %path.display(), bytes = written, "file downloaded");
    Ok(FetchOutcome::Downloaded {
        path: path.to_path_buf(),
        bytes: written,
    })
}
