//! DNS override: resolve every outbound host through one configured name server.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::trace;

use crate::DownloadError;

const DEFAULT_DNS_PORT: u16 = 53;

/// [`Resolve`] implementation backed by a single explicit name server.
#[derive(Clone)]
pub struct NameServerResolver {
    server: SocketAddr,
    resolver: Arc<TokioAsyncResolver>,
}

impl NameServerResolver {
    pub fn new(server: SocketAddr) -> Self {
        let group = NameServerConfigGroup::from_ips_clear(&[server.ip()], server.port(), true);
        let config = ResolverConfig::from_parts(None, Vec::new(), group);
        let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());
        Self {
            server,
            resolver: Arc::new(resolver),
        }
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }
}

impl std::fmt::Debug for NameServerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameServerResolver")
            .field("server", &self.server)
            .finish()
    }
}

impl Resolve for NameServerResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = Arc::clone(&self.resolver);
        let server = self.server;
        Box::pin(async move {
            let lookup = resolver.lookup_ip(name.as_str()).await?;
            // reqwest replaces the port with the one from the request URL.
            let addrs: Vec<SocketAddr> = lookup.iter().map(|ip| SocketAddr::new(ip, 0)).collect();
            trace!(host = name.as_str(), %server, resolved = addrs.len(), "Resolved host");
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}

/// Parse `ip` or `ip:port` (`[v6]:port` for IPv6); the port defaults to 53.
pub fn parse_name_server(input: &str) -> Result<SocketAddr, DownloadError> {
    let trimmed = input.trim();
    if let Ok(addr) = trimmed.parse::<SocketAddr>() {
        return Ok(addr);
    }
    trimmed
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DEFAULT_DNS_PORT))
        .map_err(|_| {
            DownloadError::dns_configuration(format!(
                "`{input}` is not an IP address or IP:port pair"
            ))
        })
}
