use std::path::Path;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vidget_engine::{
    DownloadError, MediaDownloader, RetryPolicy, TransferKind, TransferOutcome, TransferTarget,
};

use crate::batch::Manifest;
use crate::cli::KindArg;
use crate::error::{AppError, Result};
use crate::progress::BarObserver;

/// Runs CLI commands against one shared downloader.
pub struct CommandExecutor {
    downloader: MediaDownloader,
    policy: RetryPolicy,
    show_progress: bool,
    token: CancellationToken,
}

impl CommandExecutor {
    pub fn new(
        downloader: MediaDownloader,
        policy: RetryPolicy,
        show_progress: bool,
        token: CancellationToken,
    ) -> Self {
        Self {
            downloader,
            policy,
            show_progress,
            token,
        }
    }

    pub async fn get(&self, url: &str, output: &Path, kind: KindArg) -> Result<TransferOutcome> {
        let target = TransferTarget::new(url, output)?;
        let kind = kind
            .resolve()
            .unwrap_or_else(|| TransferKind::detect(target.source_url()));
        let label = output
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| output.display().to_string());
        let observer = BarObserver::new(kind, &label, self.show_progress);

        let start = Instant::now();
        let result = self
            .downloader
            .download(&target, Some(kind), &self.policy, &observer, &self.token)
            .await;

        match &result {
            Ok(TransferOutcome::AlreadyComplete(_)) => {
                info!(output = %output.display(), "Already complete, nothing to do");
            }
            Ok(TransferOutcome::Completed(progress)) => info!(
                output = %output.display(),
                kind = ?kind,
                units = progress.completed_units,
                bytes = progress.bytes_transferred,
                duration = ?start.elapsed(),
                "Download complete"
            ),
            Err(_) => observer.abandon(),
        }
        result.map_err(AppError::from)
    }

    /// Run the manifest's jobs in order. Without `keep_going` the first failure stops the batch.
    pub async fn batch(&self, manifest_path: &Path, keep_going: bool) -> Result<()> {
        let manifest = Manifest::load(manifest_path)?;
        let total = manifest.jobs.len();
        info!(jobs = total, manifest = %manifest_path.display(), "Starting batch");

        let mut failed = 0;
        for (i, job) in manifest.jobs.iter().enumerate() {
            info!(job = i + 1, total, url = %job.url, "Starting job");
            match self.get(&job.url, &job.output, job.kind).await {
                Ok(_) => {}
                Err(AppError::Download(DownloadError::Cancelled)) => {
                    warn!("Batch cancelled");
                    return Err(DownloadError::Cancelled.into());
                }
                Err(e) if keep_going => {
                    error!(job = i + 1, url = %job.url, error = %e, "Job failed, continuing");
                    failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if failed > 0 {
            return Err(AppError::JobsFailed { failed, total });
        }
        info!(jobs = total, "Batch complete");
        Ok(())
    }
}
