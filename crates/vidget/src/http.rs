//! # HTTP request execution
//!
//! One [`Transport`] wraps the reqwest client built from [`TransportConfig`]
//! and is shared (cheaply cloned) by both transfer strategies. Every request
//! races the caller's [`CancellationToken`]; status codes are validated here so
//! the strategies only see success bodies or a [`DownloadError`].

use std::future::Future;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use reqwest::{Client, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use url::Url;

use crate::config::TransportConfig;
use crate::dns::NameServerResolver;
use crate::proxy::build_proxy_from_config;
use crate::retry::classify_reqwest_error;
use crate::DownloadError;

/// Install the aws-lc-rs rustls provider once per process.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &TransportConfig) -> Result<Client, DownloadError> {
    install_rustls_provider();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .tcp_keepalive(config.keep_alive)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.read_timeout(config.read_timeout);
    }

    if let Some(server) = config.dns_server {
        client_builder = client_builder.dns_resolver(Arc::new(NameServerResolver::new(server)));
        info!(%server, "Using explicit DNS server for downloads");
    }

    // Set up proxy configuration
    if let Some(proxy_config) = &config.proxy {
        // Explicit proxy configuration takes precedence
        let proxy = build_proxy_from_config(proxy_config)?;
        client_builder = client_builder.proxy(proxy);
        info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy for downloads");
    } else if config.use_system_proxy {
        // reqwest will use system proxy settings by default when we don't call no_proxy()
        debug!("Using system proxy settings for downloads");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled for downloads");
    }

    client_builder.build().map_err(DownloadError::from)
}

/// Byte range requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// `bytes=<offset>-`
    From(u64),
    /// `bytes=<start>-<start + length - 1>`
    Bounded { start: u64, length: u64 },
}

impl RangeRequest {
    pub fn header_value(&self) -> String {
        match *self {
            Self::From(offset) => format!("bytes={offset}-"),
            Self::Bounded { start, length } => {
                format!("bytes={start}-{}", start.saturating_add(length.max(1) - 1))
            }
        }
    }

    fn start(&self) -> u64 {
        match *self {
            Self::From(offset) => offset,
            Self::Bounded { start, .. } => start,
        }
    }
}

/// What a HEAD probe learned about a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub content_length: Option<u64>,
    pub accepts_ranges: bool,
}

impl RemoteMetadata {
    fn from_headers(headers: &HeaderMap) -> Self {
        // Read the header itself: a HEAD response body has no size hint.
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let accepts_ranges = headers
            .get_all(ACCEPT_RANGES)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));
        Self {
            content_length,
            accepts_ranges,
        }
    }
}

/// Race `fut` against cancellation.
pub(crate) async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T, DownloadError>
where
    F: Future<Output = Result<T, DownloadError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(DownloadError::Cancelled),
        result = fut => result,
    }
}

/// Start offset of a `Content-Range: bytes <start>-<end>/<total>` value.
fn content_range_start(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = rest.split_once('-')?;
    start.trim().parse().ok()
}

/// Total length of a `Content-Range: bytes <start>-<end>/<total>` value.
fn content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Full resource length implied by a validated GET that started at `offset`.
///
/// Prefers the `Content-Range` total, then the body length plus `offset`.
pub(crate) fn response_total(response: &Response, offset: u64) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(content_range_total)
        .or_else(|| {
            response
                .content_length()
                .and_then(|len| len.checked_add(offset))
        })
}

/// Shared HTTP executor.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
}

impl Transport {
    pub fn new(config: &TransportConfig) -> Result<Self, DownloadError> {
        Ok(Self {
            client: create_client(config)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// HEAD the resource for its length and range support.
    ///
    /// Servers that refuse HEAD (405/501) yield "unknown size, no ranges"
    /// so the caller falls back to a plain full download.
    pub async fn probe(
        &self,
        url: &Url,
        token: &CancellationToken,
    ) -> Result<RemoteMetadata, DownloadError> {
        let response = cancellable(token, async {
            self.client
                .head(url.clone())
                .send()
                .await
                .map_err(classify_reqwest_error)
        })
        .await?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            debug!(url = %url, %status, "HEAD not supported, size unknown");
            return Ok(RemoteMetadata::default());
        }
        if !status.is_success() {
            return Err(DownloadError::http_status(status, url.as_str(), "probe"));
        }

        let metadata = RemoteMetadata::from_headers(response.headers());
        trace!(
            url = %url,
            content_length = ?metadata.content_length,
            accepts_ranges = metadata.accepts_ranges,
            "Probed remote resource"
        );
        Ok(metadata)
    }

    /// Send a GET and validate the status.
    ///
    /// A ranged request must be answered with 206 starting at the requested
    /// offset; an unranged one accepts 200 or 206.
    pub async fn get(
        &self,
        url: &Url,
        range: Option<RangeRequest>,
        token: &CancellationToken,
    ) -> Result<Response, DownloadError> {
        let mut request_builder = self.client.get(url.clone());
        if let Some(range) = range {
            request_builder = request_builder.header(RANGE, range.header_value());
        }

        let response = cancellable(token, async {
            request_builder.send().await.map_err(classify_reqwest_error)
        })
        .await?;

        let status = response.status();
        match range {
            Some(range) => {
                if status != StatusCode::PARTIAL_CONTENT {
                    return Err(DownloadError::http_status(status, url.as_str(), "range GET"));
                }
                if let Some(value) = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    && content_range_start(value) != Some(range.start())
                {
                    return Err(DownloadError::UnexpectedContentRange {
                        expected: range.start(),
                        content_range: value.to_string(),
                    });
                }
            }
            None => {
                if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
                    return Err(DownloadError::http_status(status, url.as_str(), "GET"));
                }
            }
        }

        Ok(response)
    }

    /// GET a whole body into memory. Returns the final URL after redirects.
    pub async fn fetch_bytes(
        &self,
        url: &Url,
        range: Option<RangeRequest>,
        token: &CancellationToken,
    ) -> Result<(Bytes, Url), DownloadError> {
        let response = self.get(url, range, token).await?;
        let final_url = response.url().clone();
        let bytes = cancellable(token, async {
            response.bytes().await.map_err(classify_reqwest_error)
        })
        .await?;
        Ok((bytes, final_url))
    }
}
