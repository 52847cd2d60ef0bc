use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("precondition failed: {reason}")]
    Precondition { reason: String },

    #[error("proxy configuration error: {reason}")]
    ProxyConfiguration { reason: String },

    #[error("DNS configuration error: {reason}")]
    DnsConfiguration { reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("server answered range request at offset {expected} with `{content_range}`")]
    UnexpectedContentRange {
        expected: u64,
        content_range: String,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("operation timed out: {reason}")]
    Timeout { reason: String },

    #[error("unknown or malformed playlist at {url}: {reason}")]
    UnknownPlaylistType { url: String, reason: String },

    #[error("master playlist at {url} has no variants")]
    NoVariants { url: String },

    #[error("playlist redirection deeper than {max_depth} levels starting at {url}")]
    PlaylistDepthExceeded { url: String, max_depth: usize },

    #[error("segment {index} is encrypted with `{method}`, which is not supported")]
    UnsupportedEncryption { index: usize, method: String },

    #[error("segment {index} has a byte range past the end of the addressable space")]
    InvalidByteRange { index: usize },

    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<DownloadError>,
    },

    #[error("segment {index} failed after {attempts} attempts: {source}")]
    SegmentFailed {
        index: usize,
        attempts: u32,
        #[source]
        source: Box<DownloadError>,
    },
}

impl DownloadError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition {
            reason: reason.into(),
        }
    }

    pub fn proxy_configuration(reason: impl Into<String>) -> Self {
        Self::ProxyConfiguration {
            reason: reason.into(),
        }
    }

    pub fn dns_configuration(reason: impl Into<String>) -> Self {
        Self::DnsConfiguration {
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn unknown_playlist(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnknownPlaylistType {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Whether another attempt could change the outcome.
    ///
    /// Every HTTP status counts as transient here, 4xx included: the attempt
    /// loop treats anything other than 200/206 uniformly.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::Precondition { .. }
            | Self::ProxyConfiguration { .. }
            | Self::DnsConfiguration { .. }
            | Self::UnknownPlaylistType { .. }
            | Self::NoVariants { .. }
            | Self::PlaylistDepthExceeded { .. }
            | Self::UnsupportedEncryption { .. }
            | Self::InvalidByteRange { .. }
            | Self::RetriesExhausted { .. }
            | Self::SegmentFailed { .. } => false,
            Self::Network { .. }
            | Self::HttpStatus { .. }
            | Self::UnexpectedContentRange { .. }
            | Self::Io { .. }
            | Self::Timeout { .. } => true,
        }
    }

    /// Number of attempts recorded by a terminal retry error, if any.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetriesExhausted { attempts, .. } | Self::SegmentFailed { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }

    /// Index of the segment that stopped a segmented transfer.
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            Self::SegmentFailed { index, .. }
            | Self::UnsupportedEncryption { index, .. }
            | Self::InvalidByteRange { index } => Some(*index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_retried_like_server_errors() {
        let not_found = DownloadError::http_status(StatusCode::NOT_FOUND, "http://a/b", "GET");
        let unavailable =
            DownloadError::http_status(StatusCode::SERVICE_UNAVAILABLE, "http://a/b", "GET");
        assert!(not_found.is_retryable());
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn structural_errors_are_fatal() {
        assert!(!DownloadError::NoVariants { url: "u".into() }.is_retryable());
        assert!(!DownloadError::unknown_playlist("u", "garbage").is_retryable());
        assert!(!DownloadError::Cancelled.is_retryable());
        assert!(!DownloadError::precondition("read-only").is_retryable());
        assert!(!DownloadError::InvalidByteRange { index: 0 }.is_retryable());
    }

    #[test]
    fn terminal_errors_expose_attempts_and_index() {
        let err = DownloadError::SegmentFailed {
            index: 1,
            attempts: 3,
            source: Box::new(DownloadError::Timeout {
                reason: "idle".into(),
            }),
        };
        assert_eq!(err.segment_index(), Some(1));
        assert_eq!(err.attempts(), Some(3));
        assert!(err.to_string().contains("segment 1 failed after 3 attempts"));
    }
}
