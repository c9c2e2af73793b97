use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rdm_core::SessionState;

/// Renders each session's progress as its own indicatif bar under a shared
/// `MultiProgress`. One bar per session id, created lazily on first update.
pub struct TerminalProgressView {
    multi: MultiProgress,
    bars: Mutex<HashMap<u8, ProgressBar>>,
}

impl TerminalProgressView {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn bar_for(&self, id: u8, total: u64) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap();
        bars.entry(id)
            .or_insert_with(|| {
                let style = ProgressStyle::with_template(
                    "[{bar:30.cyan/blue}] {bytes}/{total_bytes} ({binary_bytes_per_sec}) ETA {eta} — session {msg}",
                )
                .unwrap()
                .progress_chars("=>-");
                let pb = self.multi.add(ProgressBar::new(total.max(1)));
                pb.set_style(style);
                pb.set_message(id.to_string());
                pb
            })
            .clone()
    }

    pub fn on_progress(&self, id: u8, downloaded: u64, total: u64) {
        let pb = self.bar_for(id, total);
        pb.set_length(total.max(1));
        pb.set_position(downloaded);
    }

    pub fn on_state(&self, id: u8, state: SessionState) {
        let bars = self.bars.lock().unwrap();
        let Some(pb) = bars.get(&id) else { return };
        match state {
            SessionState::Complete => pb.finish_with_message(format!("{id} done")),
            SessionState::Canceled => pb.abandon_with_message(format!("{id} canceled")),
            SessionState::Error => pb.abandon_with_message(format!("{id} failed")),
            SessionState::Paused => pb.set_message(format!("{id} paused")),
            _ => {}
        }
    }
}

impl Default for TerminalProgressView {
    fn default() -> Self {
        Self::new()
    }
}
