use crate::http::RemoteMetadata;

/// Inputs to the resume decision, recomputed at the start of every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeState {
    pub existing_bytes: u64,
    pub remote_total_bytes: Option<u64>,
    pub supports_range_resume: bool,
}

/// What one attempt is going to do with the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePlan {
    /// The file on disk already has exactly the remote length.
    AlreadyComplete,
    /// Append the remaining bytes starting at `offset`.
    Resume { offset: u64 },
    /// Truncate and fetch everything.
    Restart,
}

impl ResumeState {
    pub fn new(existing_bytes: u64, remote: RemoteMetadata) -> Self {
        Self {
            existing_bytes,
            remote_total_bytes: remote.content_length,
            supports_range_resume: remote.accepts_ranges,
        }
    }

    pub fn plan(&self) -> ResumePlan {
        let existing = self.existing_bytes;
        match self.remote_total_bytes {
            Some(total) if existing > 0 && existing == total => ResumePlan::AlreadyComplete,
            Some(total) if self.supports_range_resume && existing > 0 && total > existing => {
                ResumePlan::Resume { offset: existing }
            }
            _ => ResumePlan::Restart,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(existing: u64, total: Option<u64>, ranges: bool) -> ResumeState {
        ResumeState {
            existing_bytes: existing,
            remote_total_bytes: total,
            supports_range_resume: ranges,
        }
    }

    #[test]
    fn equal_sizes_are_complete_even_without_ranges() {
        assert_eq!(state(100, Some(100), false).plan(), ResumePlan::AlreadyComplete);
        assert_eq!(state(100, Some(100), true).plan(), ResumePlan::AlreadyComplete);
    }

    #[test]
    fn empty_file_never_counts_as_complete() {
        assert_eq!(state(0, Some(0), true).plan(), ResumePlan::Restart);
        assert_eq!(state(0, Some(10), true).plan(), ResumePlan::Restart);
    }

    #[test]
    fn partial_file_with_ranges_resumes() {
        assert_eq!(
            state(40, Some(100), true).plan(),
            ResumePlan::Resume { offset: 40 }
        );
    }

    #[test]
    fn falls_back_to_restart() {
        // no range support
        assert_eq!(state(40, Some(100), false).plan(), ResumePlan::Restart);
        // unknown remote size
        assert_eq!(state(40, None, true).plan(), ResumePlan::Restart);
        // local file larger than remote
        assert_eq!(state(140, Some(100), true).plan(), ResumePlan::Restart);
    }
}
