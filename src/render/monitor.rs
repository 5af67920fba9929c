use crate::film::ProgressMonitor;

/// Console progress bar for interactive runs.
pub struct ConsoleProgress {
    bar: Option<indicatif::ProgressBar>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self { bar: None }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressMonitor for ConsoleProgress {
    fn init(&mut self, total: usize) {
        let bar = indicatif::ProgressBar::new(total as u64);
        bar.set_draw_delta((total as u64 / 100).max(1));
        self.bar = Some(bar);
    }

    fn update(&mut self, current: usize, _total: usize, tag: &str) {
        if let Some(bar) = &self.bar {
            bar.set_position(current as u64);
            bar.set_message(tag);
        }
    }

    fn done(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}
