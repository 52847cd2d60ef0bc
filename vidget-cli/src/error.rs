use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] vidget_engine::DownloadError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("{failed} of {total} jobs failed")]
    JobsFailed { failed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, AppError>;
