use std::path::{Path, PathBuf};

use tracing::warn;
use url::Url;

use crate::DownloadError;
use crate::progress::TransferProgress;

/// One unit of work: a remote source and the file it ends up in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    source_url: Url,
    output_path: PathBuf,
}

impl TransferTarget {
    /// Validate that `source` is an absolute http(s) URL.
    pub fn new(source: &str, output_path: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let url = Url::parse(source).map_err(|e| DownloadError::invalid_url(source, e.to_string()))?;
        Self::from_url(url, output_path)
    }

    pub fn from_url(url: Url, output_path: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(
                url.as_str(),
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }
        if url.host_str().is_none() {
            return Err(DownloadError::invalid_url(url.as_str(), "missing host"));
        }
        Ok(Self {
            source_url: url,
            output_path: output_path.into(),
        })
    }

    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

/// Which strategy a target needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Single progressively downloadable file
    File,
    /// HLS playlist (master or media)
    Hls,
}

impl TransferKind {
    /// Guess from the URL path extension; anything that is not `.m3u8`/`.m3u` is a file.
    pub fn detect(url: &Url) -> Self {
        let path = url.path().to_ascii_lowercase();
        if path.ends_with(".m3u8") || path.ends_with(".m3u") {
            Self::Hls
        } else {
            Self::File
        }
    }
}

/// Successful end of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Bytes were fetched and the output is complete.
    Completed(TransferProgress),
    /// The output already matched the remote resource; nothing was fetched.
    AlreadyComplete(TransferProgress),
}

impl TransferOutcome {
    pub fn progress(&self) -> &TransferProgress {
        match self {
            Self::Completed(p) | Self::AlreadyComplete(p) => p,
        }
    }
}

/// Fail early when `path` cannot be opened for writing, before any network call.
///
/// Opens without truncation so resumable data survives the check. A file the
/// check had to create is removed again.
pub(crate) async fn ensure_writable(path: &Path) -> Result<(), DownloadError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !tokio::fs::metadata(parent)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    {
        return Err(DownloadError::precondition(format!(
            "output directory {} does not exist",
            parent.display()
        )));
    }

    let existed = tokio::fs::try_exists(path).await.unwrap_or(false);
    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await
        .map_err(|e| {
            DownloadError::precondition(format!("cannot write {}: {e}", path.display()))
        })?;

    if !existed && let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove probe file");
    }
    Ok(())
}
