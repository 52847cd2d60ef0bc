use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use vidget_engine::{ProgressObserver, TransferKind, TransferProgress};

const BYTES_TEMPLATE: &str =
    "{spinner:.yellow} {prefix} [{bar:30.yellow/white}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SEGMENTS_TEMPLATE: &str =
    "{spinner:.yellow} {prefix} [{bar:30.yellow/white}] {pos}/{len} segments {msg}";

/// Terminal progress bar fed by the engine's progress checkpoints.
pub struct BarObserver {
    pb: ProgressBar,
    kind: TransferKind,
}

impl BarObserver {
    pub fn new(kind: TransferKind, label: &str, enabled: bool) -> Self {
        let pb = if enabled {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        let template = match kind {
            TransferKind::File => BYTES_TEMPLATE,
            TransferKind::Hls => SEGMENTS_TEMPLATE,
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_prefix(label.to_string());
        Self { pb, kind }
    }

    /// Clear the bar after a failed transfer.
    pub fn abandon(&self) {
        self.pb.abandon();
    }
}

impl ProgressObserver for BarObserver {
    fn on_progress(&self, progress: &TransferProgress) {
        if let Some(total) = progress.total_units {
            self.pb.set_length(total);
        }
        self.pb.set_position(progress.completed_units);
        if self.kind == TransferKind::Hls {
            self.pb
                .set_message(HumanBytes(progress.bytes_transferred).to_string());
        }
    }

    fn on_complete(&self, progress: &TransferProgress) {
        self.on_progress(progress);
        self.pb.finish();
    }
}
