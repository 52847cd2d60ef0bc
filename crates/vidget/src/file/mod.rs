// Resumable single-file transfer

mod downloader;
mod resume;

pub use downloader::FileDownloader;
pub use resume::{ResumePlan, ResumeState};
