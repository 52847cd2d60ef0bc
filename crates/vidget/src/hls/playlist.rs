// HLS Playlist Resolution: fetches a playlist, follows master playlists down to
// the highest-bandwidth variant and hands back the media playlist.

use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist, VariantStream, parse_playlist_res};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};
use url::Url;

use crate::DownloadError;
use crate::http::Transport;
use crate::retry::{RetryAction, RetryFailure, RetryPolicy, retry_with_backoff};

/// Maximum number of master playlists followed before giving up.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// A media playlist together with where it was found.
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub playlist: MediaPlaylist,
    /// Final URL of the media playlist, after redirects.
    pub url: Url,
    /// URL that relative segment URIs are resolved against.
    pub base_url: Url,
}

/// Pick the variant with the strictly greatest bandwidth.
///
/// Ties keep the first variant listed. I-frame-only variants and variants
/// without a URI are never selected.
pub fn select_variant(master: &MasterPlaylist) -> Option<&VariantStream> {
    let mut best: Option<&VariantStream> = None;
    for variant in master
        .variants
        .iter()
        .filter(|v| !v.is_i_frame && !v.uri.trim().is_empty())
    {
        if best.is_none_or(|b| variant.bandwidth > b.bandwidth) {
            best = Some(variant);
        }
    }
    best
}

/// Resolve a playlist URI against `base`. Absolute http(s) URIs are used verbatim.
pub fn resolve_url(base: &Url, uri: &str) -> Result<Url, DownloadError> {
    let uri = uri.trim();
    if let Ok(absolute) = Url::parse(uri)
        && matches!(absolute.scheme(), "http" | "https")
    {
        return Ok(absolute);
    }

    let resolved = base
        .join(uri)
        .map_err(|e| DownloadError::invalid_url(uri, format!("cannot resolve against {base}: {e}")))?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return Err(DownloadError::invalid_url(
            uri,
            format!("unsupported scheme `{}`", resolved.scheme()),
        ));
    }
    trace!("Resolved URI: {} + {} -> {}", base, uri, resolved);
    Ok(resolved)
}

/// Follows master playlists until a media playlist is reached.
pub struct PlaylistResolver {
    transport: Transport,
    policy: RetryPolicy,
    token: CancellationToken,
    max_depth: usize,
}

impl PlaylistResolver {
    pub fn new(transport: Transport, policy: RetryPolicy, token: CancellationToken) -> Self {
        Self {
            transport,
            policy,
            token,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve `url` to a media playlist.
    ///
    /// Every master playlist on the way is replaced by its best variant; at
    /// most `max_depth` of them are followed.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn resolve(&self, url: &Url) -> Result<ResolvedMedia, DownloadError> {
        let mut current = url.clone();

        for depth in 0..=self.max_depth {
            let (playlist, final_url) = self.fetch_playlist(&current).await?;
            match playlist {
                Playlist::MediaPlaylist(playlist) => {
                    let base_url = final_url.join(".").map_err(|e| {
                        DownloadError::invalid_url(final_url.as_str(), e.to_string())
                    })?;
                    debug!(
                        "Derived base URL from playlist: {} -> {}",
                        final_url, base_url
                    );
                    info!(
                        segments = playlist.segments.len(),
                        depth, "Resolved media playlist"
                    );
                    return Ok(ResolvedMedia {
                        playlist,
                        url: final_url,
                        base_url,
                    });
                }
                Playlist::MasterPlaylist(master) => {
                    let variant = select_variant(&master).ok_or_else(|| DownloadError::NoVariants {
                        url: final_url.to_string(),
                    })?;
                    let next = resolve_url(&final_url, &variant.uri)?;
                    info!(
                        bandwidth = variant.bandwidth,
                        variants = master.variants.len(),
                        variant_url = %next,
                        "Selected variant"
                    );
                    current = next;
                }
            }
        }

        Err(DownloadError::PlaylistDepthExceeded {
            url: url.to_string(),
            max_depth: self.max_depth,
        })
    }

    async fn fetch_playlist(&self, url: &Url) -> Result<(Playlist, Url), DownloadError> {
        retry_with_backoff(&self.policy, &self.token, |attempt| async move {
            RetryAction::from_result(self.fetch_and_parse_playlist(url, attempt).await)
        })
        .await
        .map_err(RetryFailure::into_error)
    }

    async fn fetch_and_parse_playlist(
        &self,
        url: &Url,
        attempt: u32,
    ) -> Result<(Playlist, Url), DownloadError> {
        trace!(attempt, url = %url, "Fetching playlist");
        let (bytes, final_url) = self.transport.fetch_bytes(url, None, &self.token).await?;
        let playlist = parse_playlist_res(&bytes).map_err(|e| {
            DownloadError::unknown_playlist(final_url.as_str(), format!("failed to parse: {e}"))
        })?;
        Ok((playlist, final_url))
    }
}
