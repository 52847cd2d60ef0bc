// HLS transfer: playlist resolution and sequential segment download

mod downloader;
mod playlist;
mod sequencer;

// Re-exports for easier access
pub use downloader::HlsDownloader;
pub use playlist::{DEFAULT_MAX_DEPTH, PlaylistResolver, ResolvedMedia, resolve_url, select_variant};
pub use sequencer::{PartRequest, PlannedSegment, SegmentSequencer, plan_segments};
