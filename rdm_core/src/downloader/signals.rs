use std::sync::Mutex;

use crate::types::types::{SessionId, SessionState};

pub type ProgressCallback = Box<dyn Fn(SessionId, u64, u64) + Send + Sync>;
pub type StateCallback = Box<dyn Fn(SessionId, SessionState) + Send + Sync>;

/// Holds the subscribed progress/state observers and delivers each emission
/// synchronously, as direct calls from the emitting task.
#[derive(Default)]
pub struct SignalBus {
    progress: Mutex<Vec<ProgressCallback>>,
    state: Mutex<Vec<StateCallback>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_progress(&self, callback: ProgressCallback) {
        self.progress.lock().unwrap().push(callback);
    }

    pub fn subscribe_state(&self, callback: StateCallback) {
        self.state.lock().unwrap().push(callback);
    }

    pub fn emit_progress(&self, id: SessionId, downloaded: u64, total: u64) {
        for callback in self.progress.lock().unwrap().iter() {
            callback(id, downloaded, total);
        }
    }

    pub fn emit_state(&self, id: SessionId, state: SessionState) {
        for callback in self.state.lock().unwrap().iter() {
            callback(id, state);
        }
    }
}
