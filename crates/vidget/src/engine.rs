use tokio_util::sync::CancellationToken;

use crate::DownloadError;
use crate::config::TransportConfig;
use crate::file::FileDownloader;
use crate::hls::HlsDownloader;
use crate::http::Transport;
use crate::progress::ProgressObserver;
use crate::retry::RetryPolicy;
use crate::target::{TransferKind, TransferOutcome, TransferTarget};

/// Both transfer strategies over one shared transport.
#[derive(Debug, Clone)]
pub struct MediaDownloader {
    file: FileDownloader,
    hls: HlsDownloader,
}

impl MediaDownloader {
    pub fn new(transport: Transport) -> Self {
        Self {
            file: FileDownloader::new(transport.clone()),
            hls: HlsDownloader::new(transport),
        }
    }

    pub fn with_config(config: &TransportConfig) -> Result<Self, DownloadError> {
        Ok(Self::new(Transport::new(config)?))
    }

    /// See [`HlsDownloader::with_skip_existing`]. Single files always resume instead.
    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.hls = self.hls.with_skip_existing(skip_existing);
        self
    }

    /// Pass `None` to pick the strategy from the URL.
    pub async fn download(
        &self,
        target: &TransferTarget,
        kind: Option<TransferKind>,
        policy: &RetryPolicy,
        observer: &dyn ProgressObserver,
        token: &CancellationToken,
    ) -> Result<TransferOutcome, DownloadError> {
        match kind.unwrap_or_else(|| TransferKind::detect(target.source_url())) {
            TransferKind::File => self.file.download(target, policy, observer, token).await,
            TransferKind::Hls => self.hls.download(target, policy, observer, token).await,
        }
    }
}
