use std::net::SocketAddr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::proxy::ProxyConfig;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Transport options shared by every transfer strategy.
///
/// Built once by the caller and handed to [`crate::Transport::new`]; nothing
/// in the engine reads transport settings from global state.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall timeout for a single HTTP request. Zero disables it.
    pub timeout: Duration,

    /// Connection timeout (TCP connect plus TLS handshake)
    pub connect_timeout: Duration,

    /// Read timeout (maximum idle time between body chunks). Zero disables it.
    pub read_timeout: Duration,

    /// TCP keep-alive interval for pooled connections
    pub keep_alive: Option<Duration>,

    /// Name server that replaces system DNS resolution for every request
    pub dns_server: Option<SocketAddr>,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if no explicit proxy is set
    pub use_system_proxy: bool,

    /// Maximum idle connections to keep per host
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            keep_alive: Some(Duration::from_secs(30)),
            dns_server: None,
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: TransportConfig::get_default_headers(),
            proxy: None,
            use_system_proxy: true,
            pool_max_idle_per_host: 4,
        }
    }
}

impl TransportConfig {
    /// Merge caller headers over the defaults; caller values win on conflicts.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        let mut merged = TransportConfig::get_default_headers();
        for (name, value) in headers.iter() {
            merged.insert(name.clone(), value.clone());
        }
        self.headers = merged;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_dns_server(mut self, dns_server: SocketAddr) -> Self {
        self.dns_server = Some(dns_server);
        self
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        // Byte offsets for Range/Content-Length must refer to the stored bytes.
        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("identity"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );
        default_headers
    }
}
