//! Terminal progress bars for concurrent file transfers.

use harvest_core::acquisition::FileProgressCallback;
use harvest_core::DownloadProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const BAR_TEMPLATE: &str =
    "{prefix:>24.cyan.bold} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.blue} {prefix:>22.cyan.bold} {bytes} ({bytes_per_sec})";

/// One bar per remote file, created on first progress report.
pub struct TransferBars {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl TransferBars {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            bars: Mutex::new(HashMap::new()),
        })
    }

    pub fn callback(self: &Arc<Self>) -> FileProgressCallback {
        let this = Arc::clone(self);
        Arc::new(move |name: &str, progress: &DownloadProgress| this.update(name, progress))
    }

    fn update(&self, name: &str, progress: &DownloadProgress) {
        let mut bars = match self.bars.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let bar = bars
            .entry(name.to_string())
            .or_insert_with(|| self.add_bar(name, progress.total_bytes));
        bar.set_position(progress.bytes_downloaded);
    }

    fn add_bar(&self, name: &str, total: Option<u64>) -> ProgressBar {
        let bar = match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                    bar.set_style(style.progress_chars("#>-"));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
                    bar.set_style(style);
                }
                bar
            }
        };
        bar.set_prefix(short_name(name).to_string());
        self.multi.add(bar)
    }

    /// Remove every bar from the terminal.
    pub fn finish(&self) {
        let bars = match self.bars.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for bar in bars.values() {
            bar.finish_and_clear();
        }
    }
}

fn short_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
