//! Module dedicated to drive uploads.
//!
//! Payloads below the configured threshold go through a single
//! content PUT. Larger payloads open a resumable upload session and
//! stream fixed-size chunks, each tagged with a `Content-Range`
//! header and retried independently with exponential backoff.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde_json::json;
use tracing::{debug, warn};

use crate::{
    drive::{sleep, spawn_blocking},
    item::{ChunkResponse, RemoteItem, UploadSession},
    Drive, Error, Result,
};

/// Callback invoked after every accepted chunk with the number of
/// bytes uploaded so far and the total payload size.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Splits a payload of `total` bytes into inclusive `[start, end]`
/// chunk ranges of at most `chunk_size` bytes.
///
/// Ranges are contiguous and non-overlapping, and the final chunk is
/// never padded to the chunk size.
pub fn chunk_ranges(total: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + chunk_size).min(total) - 1;
        ranges.push((start, end));
        start = end + 1;
    }

    ranges
}

/// Returns the delay before retrying the given 1-based attempt:
/// `base * 2^(attempt - 1)`.
pub fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt.saturating_sub(1))
}

impl Drive {
    /// Uploads a local file, choosing the simple or the resumable
    /// path depending on the payload size.
    pub async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: Option<ProgressFn>,
    ) -> Result<RemoteItem> {
        let size = std::fs::metadata(local)
            .map_err(|err| Error::OpenFileError(err, local.to_owned()))?
            .len();

        if size >= self.config.simple_upload_threshold {
            self.upload_large(local, remote, progress).await
        } else {
            self.upload_small(local, remote).await
        }
    }

    /// Uploads a payload with a single content PUT.
    ///
    /// Meant for payloads below the simple upload threshold; the
    /// whole byte content is sent atomically.
    pub async fn upload_small(&self, local: &Path, remote: &str) -> Result<RemoteItem> {
        let token = self.access_token().await?;
        let url = self.item_url(remote, ":/content");
        let agent = self.agent.clone();
        let local = local.to_owned();

        debug!(remote, "uploading file with a single content request");

        spawn_blocking(move || {
            let bytes =
                std::fs::read(&local).map_err(|err| Error::ReadFileError(err, local.clone()))?;

            let response = agent
                .put(&url)
                .header("Authorization", &format!("Bearer {token}"))
                .header("Content-Type", "application/octet-stream")
                .send(&bytes[..])
                .map_err(|err| Error::SendRequestError(err, url.clone()))?;

            let body = response
                .into_body()
                .read_to_vec()
                .map_err(|err| Error::SendRequestError(err, url.clone()))?;

            serde_json::from_slice(&body).map_err(|err| Error::ParseResponseError(err, url))
        })
        .await?
    }

    /// Uploads a payload through a resumable upload session.
    ///
    /// Chunks are sent sequentially; each failed range is retried in
    /// place with exponential backoff before the whole upload fails
    /// with [`Error::ChunkUploadExhaustedError`]. The upload is done
    /// as soon as the session answers with a drive item, no further
    /// request is sent past that point.
    pub async fn upload_large(
        &self,
        local: &Path,
        remote: &str,
        progress: Option<ProgressFn>,
    ) -> Result<RemoteItem> {
        let total = std::fs::metadata(local)
            .map_err(|err| Error::OpenFileError(err, local.to_owned()))?
            .len();

        // an empty payload has no chunk to send: a session would
        // never answer with a drive item
        if total == 0 {
            debug!(remote, "empty payload, using a single content request");
            return self.upload_small(local, remote).await;
        }

        let ranges = chunk_ranges(total, self.config.chunk_size);

        let session = self.create_upload_session(remote).await?;

        debug!(remote, total, chunks = ranges.len(), "opened upload session");

        for (start, end) in ranges {
            let mut attempt = 1;

            loop {
                let sent = self
                    .send_chunk(&session.upload_url, local, start, end, total)
                    .await;

                match sent {
                    Ok(ChunkResponse::Item(item)) => {
                        if let Some(progress) = progress.as_ref() {
                            progress(total, total);
                        }
                        return Ok(item);
                    }
                    Ok(ChunkResponse::Progress { .. }) => {
                        if let Some(progress) = progress.as_ref() {
                            progress(end + 1, total);
                        }
                        break;
                    }
                    Err(err) if attempt < self.config.max_retry_attempts => {
                        let delay = retry_backoff(self.config.retry_delay, attempt);
                        warn!(
                            remote,
                            start,
                            end,
                            attempt,
                            delay_secs = delay.as_secs(),
                            error = %err,
                            "chunk upload failed, retrying the same range"
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) => {
                        return Err(Error::ChunkUploadExhaustedError(
                            Box::new(err),
                            start,
                            end,
                            remote.to_owned(),
                        ));
                    }
                }
            }
        }

        Err(Error::IncompleteUploadSessionError(remote.to_owned()))
    }

    /// Opens a resumable upload session for the given path.
    async fn create_upload_session(&self, remote: &str) -> Result<UploadSession> {
        let token = self.access_token().await?;
        let url = self.item_url(remote, ":/createUploadSession");
        let agent = self.agent.clone();

        let body = json!({
            "item": { "@microsoft.graph.conflictBehavior": "replace" }
        });

        spawn_blocking(move || {
            let response = agent
                .post(&url)
                .header("Authorization", &format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .send(body.to_string().as_bytes())
                .map_err(|err| Error::SendRequestError(err, url.clone()))?;

            let body = response
                .into_body()
                .read_to_vec()
                .map_err(|err| Error::SendRequestError(err, url.clone()))?;

            serde_json::from_slice(&body).map_err(|err| Error::ParseResponseError(err, url))
        })
        .await?
    }

    /// Sends the inclusive byte range `[start, end]` of the local
    /// file to the session URL.
    ///
    /// The local read cursor is seeked back to `start` on every call,
    /// so retrying a failed range always resends the same bytes. The
    /// session URL is pre-authenticated, no bearer token is attached.
    async fn send_chunk(
        &self,
        upload_url: &str,
        local: &Path,
        start: u64,
        end: u64,
        total: u64,
    ) -> Result<ChunkResponse> {
        let agent = self.agent.clone();
        let upload_url = upload_url.to_owned();
        let local: PathBuf = local.to_owned();

        spawn_blocking(move || {
            let mut file =
                File::open(&local).map_err(|err| Error::OpenFileError(err, local.clone()))?;

            file.seek(SeekFrom::Start(start))
                .map_err(|err| Error::ReadChunkError(err, start, end, local.clone()))?;

            let len = (end - start + 1) as usize;
            let mut chunk = vec![0; len];
            file.read_exact(&mut chunk)
                .map_err(|err| Error::ReadChunkError(err, start, end, local.clone()))?;

            let response = agent
                .put(&upload_url)
                .header("Content-Range", &format!("bytes {start}-{end}/{total}"))
                .send(&chunk[..])
                .map_err(|err| Error::SendRequestError(err, upload_url.clone()))?;

            let body = response
                .into_body()
                .read_to_vec()
                .map_err(|err| Error::SendRequestError(err, upload_url.clone()))?;

            serde_json::from_slice(&body)
                .map_err(|err| Error::ParseResponseError(err, upload_url))
        })
        .await?
    }
}
