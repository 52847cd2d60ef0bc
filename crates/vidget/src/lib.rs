pub mod config;
pub mod dns;
mod engine;
pub mod error;
pub mod file;
pub mod hls;
pub mod http;
pub mod progress;
pub mod proxy;
pub mod retry;
mod target;

pub use config::TransportConfig;
pub use engine::MediaDownloader;
pub use error::DownloadError;
pub use file::FileDownloader;
pub use hls::HlsDownloader;
pub use http::{Transport, install_rustls_provider};
pub use progress::{ChannelObserver, NoopObserver, ProgressEvent, ProgressObserver, TransferProgress};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use retry::RetryPolicy;
pub use target::{TransferKind, TransferOutcome, TransferTarget};
