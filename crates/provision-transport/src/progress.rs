use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use once_cell::sync::Lazy;

const PB_STYLE: &str = "{spinner:.blue} {msg:.cyan} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    ProgressStyle::with_template(PB_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK).progress_chars(PB_CHARS))
});

/// Byte counter for one transfer. Hidden when progress output is disabled.
pub struct TransferProgress {
    pb: ProgressBar,
}

impl TransferProgress {
    pub fn new(len: Option<u64>, label: impl Into<String>, visible: bool) -> Self {
        let pb = match len {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::no_length(),
        };
        let pb = match PB_TEMPLATE.as_ref() {
            Some(style) => pb.with_style(style.clone()),
            None => pb,
        };
        if !visible {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        Self {
            pb: pb.with_message(label.into()),
        }
    }

    pub fn hidden() -> Self {
        Self::new(None, "", false)
    }

    /// Total size, once it is known.
    pub fn set_len(&self, len: u64) {
        self.pb.set_length(len);
    }

    pub fn step(&self, len: u64) -> &Self {
        self.pb.inc(len);
        self
    }

    pub fn position(&self) -> u64 {
        self.pb.position()
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_still_counts() {
        let progress = TransferProgress::new(Some(10), "reads.fq", false);
        progress.step(4).step(6);
        assert_eq!(progress.position(), 10);
        progress.finish();
    }
}
