/// Terminal progress for transfers.
use std::sync::OnceLock;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(MultiProgress::new)
}

fn terminal_columns() -> Option<usize> {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
}

fn bar_template() -> &'static str {
    match terminal_columns() {
        Some(cols) if cols >= 110 => "{msg} {bar:40.cyan/blue} {bytes}/{total_bytes} {percent}% {bytes_per_sec}",
        Some(cols) if cols >= 80 => "{wide_bar:.cyan/blue} {bytes}/{total_bytes} {percent}%",
        _ => "{wide_bar:.cyan/blue} {percent}%",
    }
}

/// Progress of one transfer: a bar when the size is known, a byte-counting
/// spinner otherwise, or nothing at all when disabled.
pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    #[must_use]
    pub fn hidden() -> Self {
        Self { bar: None }
    }

    /// Start reporting a transfer of `total` bytes (if known), `done` of
    /// which are already on disk.
    #[must_use]
    pub fn transfer(enabled: bool, label: &str, total: Option<u64>, done: u64) -> Self {
        if !enabled {
            return Self::hidden();
        }

        let bar = match total {
            Some(total) => {
                let bar = multi_progress().add(ProgressBar::new(total));
                bar.set_style(
                    ProgressStyle::with_template(bar_template())
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar
            }
            None => {
                let bar = multi_progress().add(ProgressBar::new_spinner());
                bar.enable_steady_tick(Duration::from_millis(100));
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {msg} {bytes} {bytes_per_sec}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_message(label.to_string());
        bar.set_position(done);
        Self { bar: Some(bar) }
    }

    pub fn inc(&self, delta: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(delta);
        }
    }

    pub fn finish_ok(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message.to_string());
        }
    }

    pub fn finish_err(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.abandon_with_message(message.to_string());
        }
    }
}

/// Fraction of a transfer completed, when the total is known.
pub fn fraction(done: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(0) => Some(1.0),
        Some(total) => Some((done as f64 / total as f64).min(1.0)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction() {
        assert_eq!(fraction(50, Some(200)), Some(0.25));
        assert_eq!(fraction(10, Some(0)), Some(1.0));
        assert_eq!(fraction(300, Some(200)), Some(1.0));
        assert_eq!(fraction(10, None), None);
    }

    #[test]
    fn test_hidden_progress_is_inert() {
        let progress = Progress::transfer(false, "file", Some(10), 0);
        progress.inc(5);
        progress.finish_ok("done");
        assert!(progress.bar.is_none());
    }

    #[test]
    fn test_failed_transfer_leaves_no_running_bar() {
        let progress = Progress::transfer(true, "file", Some(10), 0);
        progress.inc(4);
        progress.finish_err("interrupted");
        assert!(progress.bar.as_ref().is_some_and(|bar| bar.is_finished()));
    }
}
