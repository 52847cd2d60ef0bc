// Segment Sequencer: fetches the segments of a media playlist strictly in order
// and appends each one to a single output file.
//
// A segment is written only once all of its bytes (init section included) are
// in memory, so a failure leaves the output at the end of the previous segment.

use std::path::Path;

use bytes::Bytes;
use m3u8_rs::{ByteRange, KeyMethod, Map};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use super::playlist::{ResolvedMedia, resolve_url};
use crate::DownloadError;
use crate::http::{RangeRequest, Transport};
use crate::progress::{ProgressObserver, TransferProgress};
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};

/// One HTTP fetch belonging to a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRequest {
    pub url: Url,
    pub range: Option<RangeRequest>,
}

/// A segment ready to be fetched, in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSegment {
    /// Position among the fetched segments, starting at 0.
    pub index: usize,
    /// Initialisation section written just before this segment.
    pub init: Option<PartRequest>,
    pub media: PartRequest,
}

/// `None` when the range ends past `u64::MAX`.
fn byte_range_request(range: &ByteRange, implicit_start: u64) -> Option<RangeRequest> {
    let start = range.offset.unwrap_or(implicit_start);
    start.checked_add(range.length.max(1))?;
    Some(RangeRequest::Bounded {
        start,
        length: range.length,
    })
}

/// Turn a media playlist into the ordered list of fetches.
///
/// Segments with an empty URI are skipped. A byte range without an offset
/// continues where the previous range on the same URI ended. Encrypted
/// segments and byte ranges that overflow are rejected.
pub fn plan_segments(media: &ResolvedMedia) -> Result<Vec<PlannedSegment>, DownloadError> {
    let mut plan = Vec::with_capacity(media.playlist.segments.len());
    let mut key_method = KeyMethod::None;
    let mut current_map: Option<Map> = None;
    let mut last_range: Option<(Url, u64)> = None;

    for segment in &media.playlist.segments {
        if let Some(key) = &segment.key {
            key_method = key.method.clone();
        }

        if segment.uri.trim().is_empty() {
            trace!("Skipping segment without URI");
            continue;
        }
        let index = plan.len();

        if key_method != KeyMethod::None {
            return Err(DownloadError::UnsupportedEncryption {
                index,
                method: key_method.to_string(),
            });
        }

        let init = match &segment.map {
            Some(map) if current_map.as_ref() != Some(map) => {
                current_map = Some(map.clone());
                let range = match &map.byte_range {
                    Some(r) => Some(
                        byte_range_request(r, 0)
                            .ok_or(DownloadError::InvalidByteRange { index })?,
                    ),
                    None => None,
                };
                Some(PartRequest {
                    url: resolve_url(&media.base_url, &map.uri)?,
                    range,
                })
            }
            _ => None,
        };

        let url = resolve_url(&media.base_url, &segment.uri)?;
        let range = match &segment.byte_range {
            Some(r) => {
                let implicit_start = match &last_range {
                    Some((prev_url, end)) if *prev_url == url => *end,
                    _ => 0,
                };
                Some(
                    byte_range_request(r, implicit_start)
                        .ok_or(DownloadError::InvalidByteRange { index })?,
                )
            }
            None => None,
        };
        // checked in byte_range_request
        last_range = match range {
            Some(RangeRequest::Bounded { start, length }) => {
                Some((url.clone(), start.saturating_add(length)))
            }
            _ => None,
        };

        plan.push(PlannedSegment {
            index,
            init,
            media: PartRequest { url, range },
        });
    }

    Ok(plan)
}

/// Sequential segment fetcher bound to one transport, policy and token.
pub struct SegmentSequencer {
    transport: Transport,
    policy: RetryPolicy,
    token: CancellationToken,
}

impl SegmentSequencer {
    pub fn new(transport: Transport, policy: RetryPolicy, token: CancellationToken) -> Self {
        Self {
            transport,
            policy,
            token,
        }
    }

    /// Download every segment of `media` into `output`, truncating it first.
    ///
    /// Progress is reported after each written segment and once more through
    /// [`ProgressObserver::on_complete`] at the end.
    #[instrument(skip_all, fields(url = %media.url, output = %output.display()))]
    pub async fn run(
        &self,
        media: &ResolvedMedia,
        output: &Path,
        observer: &dyn ProgressObserver,
    ) -> Result<TransferProgress, DownloadError> {
        let plan = plan_segments(media)?;
        let mut file = File::create(output).await?;
        let mut progress = TransferProgress::new(Some(plan.len() as u64));
        info!(segments = plan.len(), "Starting segment download");

        for segment in &plan {
            let parts = self.fetch_segment(segment).await?;
            let written = write_segment(&mut file, &parts, progress.bytes_transferred).await?;

            progress.completed_units += 1;
            progress.bytes_transferred += written;
            debug!(
                segment = segment.index,
                bytes = written,
                total_bytes = progress.bytes_transferred,
                "Segment written"
            );
            observer.on_progress(&progress);
        }

        observer.on_complete(&progress);
        info!(
            segments = progress.completed_units,
            bytes = progress.bytes_transferred,
            "Segment download finished"
        );
        Ok(progress)
    }

    /// Fetch one segment (and its init section) under its own retry loop.
    async fn fetch_segment(&self, segment: &PlannedSegment) -> Result<Vec<Bytes>, DownloadError> {
        retry_with_backoff(&self.policy, &self.token, |attempt| async move {
            RetryAction::from_result(self.fetch_segment_once(segment, attempt).await)
        })
        .await
        .map_err(|failure| match failure.error {
            DownloadError::Cancelled => DownloadError::Cancelled,
            error => DownloadError::SegmentFailed {
                index: segment.index,
                attempts: failure.attempts,
                source: Box::new(error),
            },
        })
    }

    async fn fetch_segment_once(
        &self,
        segment: &PlannedSegment,
        attempt: u32,
    ) -> Result<Vec<Bytes>, DownloadError> {
        trace!(segment = segment.index, attempt, url = %segment.media.url, "Fetching segment");
        let mut parts = Vec::with_capacity(2);
        if let Some(init) = &segment.init {
            parts.push(self.fetch_part(init).await?);
        }
        parts.push(self.fetch_part(&segment.media).await?);
        Ok(parts)
    }

    async fn fetch_part(&self, part: &PartRequest) -> Result<Bytes, DownloadError> {
        let (bytes, _) = self
            .transport
            .fetch_bytes(&part.url, part.range, &self.token)
            .await?;
        Ok(bytes)
    }
}

/// Append `parts` and sync. On failure the file is cut back to `boundary`.
async fn write_segment(file: &mut File, parts: &[Bytes], boundary: u64) -> Result<u64, DownloadError> {
    let result: std::io::Result<()> = async {
        for part in parts {
            file.write_all(part).await?;
        }
        file.flush().await?;
        file.sync_data().await
    }
    .await;

    if let Err(e) = result {
        warn!(boundary, error = %e, "Segment write failed, truncating to last boundary");
        if let Err(truncate_err) = file.set_len(boundary).await {
            warn!(error = %truncate_err, "Failed to truncate output");
        }
        return Err(e.into());
    }

    Ok(parts.iter().map(|p| p.len() as u64).sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3u8_rs::{MediaPlaylist, MediaSegment, Playlist, parse_playlist_res};

    fn resolved(input: &str) -> ResolvedMedia {
        let playlist = match parse_playlist_res(input.as_bytes()).expect("playlist should parse") {
            Playlist::MediaPlaylist(pl) => pl,
            Playlist::MasterPlaylist(_) => panic!("expected media playlist"),
        };
        media_from(playlist)
    }

    fn media_from(playlist: MediaPlaylist) -> ResolvedMedia {
        let url = Url::parse("https://example.com/path/index.m3u8").unwrap();
        ResolvedMedia {
            playlist,
            base_url: url.join(".").unwrap(),
            url,
        }
    }

    #[test]
    fn plan_resolves_uris_in_order() {
        let media = resolved(
            "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\na.ts\n#EXTINF:2.0,\nsub/b.ts\n#EXTINF:2.0,\nhttps://other.example.com/c.ts\n#EXT-X-ENDLIST\n",
        );
        let plan = plan_segments(&media).unwrap();
        let urls: Vec<_> = plan.iter().map(|s| s.media.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://example.com/path/a.ts",
                "https://example.com/path/sub/b.ts",
                "https://other.example.com/c.ts",
            ]
        );
        assert!(plan.iter().all(|s| s.init.is_none() && s.media.range.is_none()));
        assert_eq!(plan[2].index, 2);
    }

    #[test]
    fn plan_skips_empty_uri_segment() {
        let mut playlist = MediaPlaylist::default();
        playlist.segments.push(MediaSegment {
            uri: String::new(),
            duration: 2.0,
            ..Default::default()
        });
        playlist.segments.push(MediaSegment {
            uri: "a.ts".to_string(),
            duration: 2.0,
            ..Default::default()
        });
        let plan = plan_segments(&media_from(playlist)).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].index, 0);
    }

    #[test]
    fn plan_infers_byterange_offset() {
        let media = resolved(
            "#EXTM3U\n#EXT-X-VERSION:4\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\n#EXT-X-BYTERANGE:10@0\nfile.ts\n#EXTINF:2.0,\n#EXT-X-BYTERANGE:5\nfile.ts\n#EXTINF:2.0,\n#EXT-X-BYTERANGE:7\nother.ts\n#EXT-X-ENDLIST\n",
        );
        let plan = plan_segments(&media).unwrap();
        assert_eq!(
            plan[0].media.range,
            Some(RangeRequest::Bounded {
                start: 0,
                length: 10
            })
        );
        assert_eq!(
            plan[1].media.range,
            Some(RangeRequest::Bounded {
                start: 10,
                length: 5
            })
        );
        // a different URI starts over at 0
        assert_eq!(
            plan[2].media.range,
            Some(RangeRequest::Bounded { start: 0, length: 7 })
        );
    }

    #[test]
    fn plan_attaches_init_section_once_per_map() {
        let media = resolved(
            "#EXTM3U\n#EXT-X-VERSION:7\n#EXT-X-TARGETDURATION:2\n#EXT-X-MAP:URI=\"init.mp4\"\n#EXTINF:2.0,\nseg1.m4s\n#EXTINF:2.0,\nseg2.m4s\n#EXT-X-ENDLIST\n",
        );
        let plan = plan_segments(&media).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan[0].init.as_ref().map(|i| i.url.as_str()),
            Some("https://example.com/path/init.mp4")
        );
        assert!(plan[1].init.is_none());
    }

    #[test]
    fn plan_rejects_encrypted_segments() {
        let media = resolved(
            "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\nclear.ts\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n#EXTINF:2.0,\nsecret.ts\n#EXT-X-ENDLIST\n",
        );
        let err = plan_segments(&media).unwrap_err();
        assert!(matches!(err, DownloadError::UnsupportedEncryption { index: 1, .. }));
    }

    #[test]
    fn plan_accepts_explicit_method_none() {
        let media = resolved(
            "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXT-X-KEY:METHOD=NONE\n#EXTINF:2.0,\nclear.ts\n#EXT-X-ENDLIST\n",
        );
        assert_eq!(plan_segments(&media).unwrap().len(), 1);
    }

    #[test]
    fn plan_rejects_overflowing_byterange() {
        let media = resolved(
            "#EXTM3U\n#EXT-X-VERSION:4\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\nok.ts\n#EXTINF:2.0,\n#EXT-X-BYTERANGE:18446744073709551615@10\nfile.ts\n#EXT-X-ENDLIST\n",
        );
        let err = plan_segments(&media).unwrap_err();
        assert!(matches!(err, DownloadError::InvalidByteRange { index: 1 }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn plan_rejects_implicit_offset_that_overflows() {
        let media = resolved(
            "#EXTM3U\n#EXT-X-VERSION:4\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\n#EXT-X-BYTERANGE:10@18446744073709551600\nfile.ts\n#EXTINF:2.0,\n#EXT-X-BYTERANGE:10\nfile.ts\n#EXT-X-ENDLIST\n",
        );
        assert!(matches!(
            plan_segments(&media),
            Err(DownloadError::InvalidByteRange { index: 1 })
        ));
    }

    #[tokio::test]
    async fn write_segment_appends_all_parts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ts");
        let mut file = File::create(&path).await.unwrap();
        let parts = [Bytes::from_static(b"init"), Bytes::from_static(b"media")];
        let written = write_segment(&mut file, &parts, 0).await.unwrap();
        assert_eq!(written, 9);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"initmedia");
    }
}
