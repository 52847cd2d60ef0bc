//! # Resumable file downloader
//!
//! Fetches one URL into one file. Every attempt re-derives a [`ResumeState`]
//! from the bytes already on disk and a HEAD probe, then either returns early
//! (already complete), appends the missing range, or restarts from zero. The
//! body is streamed to disk chunk by chunk and synced at the end of the attempt.

use std::io::SeekFrom;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::resume::{ResumePlan, ResumeState};
use crate::config::TransportConfig;
use crate::http::{RangeRequest, Transport, cancellable, response_total};
use crate::progress::{ProgressObserver, TransferProgress};
use crate::retry::{RetryAction, RetryPolicy, classify_reqwest_error, retry_with_backoff};
use crate::target::{TransferOutcome, TransferTarget, ensure_writable};
use crate::DownloadError;

/// Downloader for single progressively downloadable files.
#[derive(Debug, Clone)]
pub struct FileDownloader {
    transport: Transport,
}

impl FileDownloader {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn with_config(config: &TransportConfig) -> Result<Self, DownloadError> {
        Ok(Self::new(Transport::new(config)?))
    }

    /// Download `target`, resuming whatever a previous run left on disk.
    ///
    /// Precondition failures are reported before any network call. Transient
    /// failures retry the whole attempt under `policy`; exhaustion yields
    /// [`DownloadError::RetriesExhausted`] with the last cause.
    #[instrument(
        skip_all,
        fields(url = %target.source_url(), output = %target.output_path().display())
    )]
    pub async fn download(
        &self,
        target: &TransferTarget,
        policy: &RetryPolicy,
        observer: &dyn ProgressObserver,
        token: &CancellationToken,
    ) -> Result<TransferOutcome, DownloadError> {
        ensure_writable(target.output_path()).await?;

        let received = AtomicU64::new(0);
        let outcome = retry_with_backoff(policy, token, |attempt| {
            let received = &received;
            async move {
                RetryAction::from_result(
                    self.attempt(target, attempt, observer, token, received)
                        .await,
                )
            }
        })
        .await
        .map_err(|failure| failure.into_error())?;

        observer.on_complete(outcome.progress());
        match &outcome {
            TransferOutcome::AlreadyComplete(progress) => {
                info!(bytes = progress.completed_units, "Output already complete");
            }
            TransferOutcome::Completed(progress) => info!(
                bytes = progress.completed_units,
                received = progress.bytes_transferred,
                "File download finished"
            ),
        }
        Ok(outcome)
    }

    async fn attempt(
        &self,
        target: &TransferTarget,
        attempt: u32,
        observer: &dyn ProgressObserver,
        token: &CancellationToken,
        received: &AtomicU64,
    ) -> Result<TransferOutcome, DownloadError> {
        let url = target.source_url();
        let existing = match tokio::fs::metadata(target.output_path()).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let remote = self.transport.probe(url, token).await?;
        let state = ResumeState::new(existing, remote);
        let plan = state.plan();
        debug!(
            attempt,
            existing,
            remote_total = ?state.remote_total_bytes,
            ranges = state.supports_range_resume,
            ?plan,
            "Resume decision"
        );

        let mut progress = TransferProgress {
            total_units: state.remote_total_bytes,
            completed_units: existing,
            bytes_transferred: received.load(Ordering::Relaxed),
        };

        let range = match plan {
            ResumePlan::AlreadyComplete => return Ok(TransferOutcome::AlreadyComplete(progress)),
            ResumePlan::Resume { offset } => Some(RangeRequest::From(offset)),
            ResumePlan::Restart => None,
        };

        let response = self.transport.get(url, range, token).await?;
        // Opened only once the server has accepted the request.
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(target.output_path())
            .await?;

        let offset = match range {
            Some(_) => {
                info!(offset = existing, "Resuming download with range request");
                file.seek(SeekFrom::Start(existing)).await?;
                existing
            }
            None => {
                if existing > 0 {
                    info!(discarded = existing, "Restarting download from zero");
                }
                file.set_len(0).await?;
                file.seek(SeekFrom::Start(0)).await?;
                0
            }
        };
        progress.completed_units = offset;
        // The GET describes the body actually sent; HEAD may disagree.
        if let Some(total) = response_total(&response, offset) {
            if progress.total_units != Some(total) {
                debug!(head = ?progress.total_units, get = total, "GET length differs from probe");
            }
            progress.total_units = Some(total);
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = cancellable(token, async { Ok(stream.next().await) }).await? {
            let chunk = chunk.map_err(classify_reqwest_error)?;
            file.write_all(&chunk).await?;
            let len = chunk.len() as u64;
            progress.completed_units += len;
            progress.bytes_transferred = received.fetch_add(len, Ordering::Relaxed) + len;
            observer.on_progress(&progress);
        }

        file.flush().await?;
        file.sync_all().await?;

        if let Some(total) = progress.total_units
            && progress.completed_units < total
        {
            return Err(DownloadError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "body ended at {} of {total} bytes",
                        progress.completed_units
                    ),
                ),
            });
        }

        Ok(TransferOutcome::Completed(progress))
    }
}
