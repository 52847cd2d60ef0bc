use tokio::sync::mpsc;

/// Snapshot of a running transfer.
///
/// For single-file transfers the units are bytes on disk; for segmented
/// transfers they are segments, with written bytes in `bytes_transferred`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub total_units: Option<u64>,
    pub completed_units: u64,
    pub bytes_transferred: u64,
}

impl TransferProgress {
    pub fn new(total_units: Option<u64>) -> Self {
        Self {
            total_units,
            ..Self::default()
        }
    }

    /// Completed fraction in `[0, 1]` when the total is known and non-zero.
    pub fn ratio(&self) -> Option<f64> {
        match self.total_units {
            Some(total) if total > 0 => Some((self.completed_units as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }
}

/// Receives progress at the checkpoints of a transfer.
///
/// Called synchronously from the transfer; a slow observer delays the
/// transfer but cannot fail it.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &TransferProgress);

    /// Final totals, reported once after the last checkpoint.
    fn on_complete(&self, _progress: &TransferProgress) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(&TransferProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &TransferProgress) {
        self(progress)
    }
}

/// Ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _progress: &TransferProgress) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress(TransferProgress),
    Completed(TransferProgress),
}

/// Forwards updates to a channel, for hosts that render progress elsewhere.
///
/// The channel is unbounded so the transfer never waits on the consumer;
/// event order matches checkpoint order.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, progress: &TransferProgress) {
        // A dropped receiver only means nobody is watching.
        let _ = self.tx.send(ProgressEvent::Progress(*progress));
    }

    fn on_complete(&self, progress: &TransferProgress) {
        let _ = self.tx.send(ProgressEvent::Completed(*progress));
    }
}
