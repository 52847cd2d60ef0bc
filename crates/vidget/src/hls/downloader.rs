use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::playlist::{DEFAULT_MAX_DEPTH, PlaylistResolver};
use super::sequencer::SegmentSequencer;
use crate::DownloadError;
use crate::config::TransportConfig;
use crate::http::Transport;
use crate::progress::{ProgressObserver, TransferProgress};
use crate::retry::RetryPolicy;
use crate::target::{TransferOutcome, TransferTarget, ensure_writable};

/// HLS downloader: resolves the playlist, then sequences its segments into one file.
#[derive(Debug, Clone)]
pub struct HlsDownloader {
    transport: Transport,
    max_depth: usize,
    skip_existing: bool,
}

impl HlsDownloader {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            max_depth: DEFAULT_MAX_DEPTH,
            skip_existing: false,
        }
    }

    pub fn with_config(config: &TransportConfig) -> Result<Self, DownloadError> {
        Ok(Self::new(Transport::new(config)?))
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Leave a non-empty output alone instead of downloading it again.
    ///
    /// Segmented outputs carry no length to compare against, so a partial
    /// file from a failed run is skipped as well.
    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    /// Download the stream behind `target` into its output file.
    ///
    /// The output precondition is checked before the playlist is fetched. An
    /// interrupted run starts over from the first segment.
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

        if self.skip_existing
            && let Ok(metadata) = tokio::fs::metadata(target.output_path()).await
            && metadata.len() > 0
        {
            let progress = TransferProgress::new(None);
            info!(bytes = metadata.len(), "Output exists, skipping");
            observer.on_complete(&progress);
            return Ok(TransferOutcome::AlreadyComplete(progress));
        }

        let resolver = PlaylistResolver::new(self.transport.clone(), policy.clone(), token.clone())
            .with_max_depth(self.max_depth);
        let media = resolver.resolve(target.source_url()).await?;

        let sequencer = SegmentSequencer::new(self.transport.clone(), policy.clone(), token.clone());
        let progress = sequencer
            .run(&media, target.output_path(), observer)
            .await?;

        info!(
            segments = progress.completed_units,
            bytes = progress.bytes_transferred,
            "HLS download finished"
        );
        Ok(TransferOutcome::Completed(progress))
    }
}
