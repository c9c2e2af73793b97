use std::collections::HashMap;
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::downloader::range_parser::RangeRequestResult;
use crate::downloader::range_request::send_range_request;
use crate::downloader::session::{SessionRecord, WriteJob};
use crate::downloader::signals::{ProgressCallback, SignalBus, StateCallback};
use crate::downloader::writer::writer_loop;
use crate::types::types::{DownloadError, SessionId, SessionState};

const DEFAULT_DOWN_SIZE: u64 = 1024 * 1024;
const WRITE_QUEUE_CAPACITY: usize = 200;

type SessionTable = AsyncMutex<HashMap<SessionId, SessionRecord>>;

struct EngineInner {
    down_size: u64,
    sessions: Arc<SessionTable>,
    signals: Arc<SignalBus>,
    client: reqwest::Client,
    write_tx: mpsc::Sender<WriteJob>,
}

/// Multi-session HTTP range-download engine.
///
/// Cheap to clone: every clone shares the same session table, write queue,
/// and writer loop task.
#[derive(Clone)]
pub struct DownloadEngine {
    inner: Arc<EngineInner>,
}

impl DownloadEngine {
    pub fn new(down_size: u64) -> Self {
        let sessions = Arc::new(AsyncMutex::new(HashMap::new()));
        let signals = Arc::new(SignalBus::new());
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);

        tokio::spawn(writer_loop(write_rx, sessions.clone(), signals.clone()));

        Self {
            inner: Arc::new(EngineInner {
                down_size,
                sessions,
                signals,
                client: reqwest::Client::new(),
                write_tx,
            }),
        }
    }

    pub fn subscribe_progress(&self, callback: ProgressCallback) {
        self.inner.signals.subscribe_progress(callback);
    }

    pub fn subscribe_state(&self, callback: StateCallback) {
        self.inner.signals.subscribe_state(callback);
    }

    /// Starts a new session. Rejects a duplicate id or a `file_name` already
    /// owned by another live session without mutating any state.
    pub async fn download(
        &self,
        url: impl Into<String>,
        file_name: impl Into<String>,
        is_cont: bool,
        id: SessionId,
    ) -> Result<(), DownloadError> {
        let url = url.into();
        let file_name = file_name.into();

        let mut table = self.inner.sessions.lock().await;
        if table.contains_key(&id) {
            return Err(DownloadError::DuplicateId);
        }
        if table.values().any(|record| record.file_name == file_name) {
            return Err(DownloadError::DuplicateFile(file_name));
        }

        let mut open_options = OpenOptions::new();
        open_options.write(true).create(true);
        if is_cont {
            open_options.read(true);
        } else {
            open_options.truncate(true);
        }
        let file = open_options
            .open(&file_name)
            .await
            .map_err(|source| DownloadError::FileOpen {
                path: file_name.clone(),
                source,
            })?;

        let range_begin = if is_cont {
            file.metadata().await.map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };

        table.insert(
            id,
            SessionRecord {
                url: url.clone(),
                file_name: file_name.clone(),
                file: Arc::new(AsyncMutex::new(file)),
                state: SessionState::Process,
                offset: range_begin,
                generation: 0,
            },
        );
        drop(table);

        log::info!("session {id} started: {url} -> {file_name} (offset {range_begin})");
        self.spawn_range_chain(id, url, range_begin, 0);
        Ok(())
    }

    /// Idempotent if already `PAUSED`. Latches at the next writer-loop
    /// dequeue or `on_http_done` entry rather than aborting an in-flight
    /// request.
    pub async fn pause(&self, id: SessionId) -> Result<(), DownloadError> {
        let mut table = self.inner.sessions.lock().await;
        let state = table
            .get(&id)
            .ok_or(DownloadError::UnknownSession(id))?
            .state;
        match state {
            SessionState::Paused => Ok(()),
            SessionState::Process | SessionState::WaitPause => {
                table.get_mut(&id).unwrap().state = SessionState::WaitPause;
                drop(table);
                self.inner.signals.emit_state(id, SessionState::WaitPause);
                Ok(())
            }
            _ => Err(DownloadError::UnknownSession(id)),
        }
    }

    pub async fn resume(&self, id: SessionId) -> Result<(), DownloadError> {
        let (url, offset, generation) = {
            let mut table = self.inner.sessions.lock().await;
            let record = table
                .get_mut(&id)
                .ok_or(DownloadError::UnknownSession(id))?;
            if !matches!(record.state, SessionState::WaitPause | SessionState::Paused) {
                return Err(DownloadError::NotPaused(id));
            }
            record.state = SessionState::Process;
            record.generation += 1;
            (record.url.clone(), record.offset, record.generation)
        };

        log::info!("session {id} resumed at offset {offset} (generation {generation})");
        self.spawn_range_chain(id, url, offset, generation);
        Ok(())
    }

    /// Fast path from `PAUSED`: closes the file and erases the record
    /// immediately. Otherwise marks `WAIT_CANCEL` for the writer loop (or
    /// the next `on_http_done`) to finalize.
    pub async fn cancel(&self, id: SessionId) -> Result<(), DownloadError> {
        let mut table = self.inner.sessions.lock().await;
        let state = table
            .get(&id)
            .ok_or(DownloadError::UnknownSession(id))?
            .state;

        if state == SessionState::Paused {
            table.remove(&id);
            drop(table);
            log::info!("session {id} canceled while paused");
            self.inner.signals.emit_state(id, SessionState::Canceled);
        } else {
            table.get_mut(&id).unwrap().state = SessionState::WaitCancel;
            drop(table);
            log::debug!("session {id} marked WAIT_CANCEL");
        }
        Ok(())
    }

    fn spawn_range_chain(&self, id: SessionId, url: String, start: u64, generation: u64) {
        let inner = self.inner.clone();
        tokio::spawn(async move { run_range_chain(inner, id, url, start, generation).await });
    }
}

impl Default for DownloadEngine {
    fn default() -> Self {
        Self::new(DEFAULT_DOWN_SIZE)
    }
}

/// Drives the sequential chain of range requests for one session. Only one
/// request is outstanding at a time; the next range is issued only after the
/// previous one's job has been handed to the writer queue. `generation`
/// identifies this chain: a pause latch or a `resume` bumps the session's
/// generation counter, so a request already in flight under a stale chain is
/// recognized and dropped in `on_http_done` instead of racing a newer chain.
async fn run_range_chain(
    inner: Arc<EngineInner>,
    id: SessionId,
    url: String,
    mut start: u64,
    generation: u64,
) {
    loop {
        let end = start + inner.down_size - 1;
        match send_range_request(&inner.client, &url, start, end).await {
            Ok(item) => {
                let is_complete = item.is_complete;
                let next_start = item.offset + item.buffer.len() as u64;
                if !on_http_done(&inner, id, generation, item).await || is_complete {
                    return;
                }
                start = next_start;
            }
            Err(err) => {
                on_transport_error(&inner, id, err).await;
                return;
            }
        }
    }
}

/// Enqueues the write job and advances the resume offset, unless the session
/// has already moved to a terminal or paused state, or this chain has been
/// superseded by a newer generation (pause latch or resume). The offset is
/// only advanced on the path that actually enqueues the job, so a dropped
/// range never moves `offset` past a byte that was never written. Returns
/// whether the chain should keep requesting further ranges.
async fn on_http_done(
    inner: &Arc<EngineInner>,
    id: SessionId,
    generation: u64,
    item: RangeRequestResult,
) -> bool {
    let job = {
        let mut table = inner.sessions.lock().await;
        let record = match table.get_mut(&id) {
            None => return false,
            Some(record) => record,
        };
        if record.generation != generation {
            return false;
        }
        if matches!(
            record.state,
            SessionState::Paused | SessionState::Error | SessionState::Canceled
        ) {
            return false;
        }
        record.offset = item.offset + item.buffer.len() as u64;
        WriteJob {
            id,
            buffer: item.buffer,
            offset: item.offset,
            total_len: item.total_len,
        }
    };
    inner.write_tx.send(job).await.is_ok()
}

async fn on_transport_error(inner: &Arc<EngineInner>, id: SessionId, err: DownloadError) {
    log::error!("transport error for session {id}: {err}");
    let existed = inner.sessions.lock().await.remove(&id).is_some();
    if existed {
        inner.signals.emit_state(id, SessionState::Error);
    }
}

#[cfg(test)]
mod tests {
    use std::io::SeekFrom;
    use std::sync::atomic::{AtomicU64, Ordering};

    use bytes::Bytes;
    use tokio::io::AsyncSeekExt;

    use super::*;
    use crate::downloader::writer::handle_job;

    /// A write against a read-only file handle must transition the session
    /// to ERROR and erase its record, not leak the handle — exercised
    /// directly against `handle_job` since forcing a genuine disk write
    /// failure through the full async pipeline isn't deterministic.
    #[tokio::test]
    async fn write_error_transitions_to_error_and_erases_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readonly.bin");
        std::fs::write(&path, b"xxxx").unwrap();

        // Opened without write access: any write attempt fails at the OS level.
        let mut file = tokio::fs::OpenOptions::new()
            .read(true)
            .open(&path)
            .await
            .unwrap();
        file.seek(SeekFrom::Start(0)).await.unwrap();

        let sessions: Arc<SessionTable> = Arc::new(AsyncMutex::new(HashMap::new()));
        sessions.lock().await.insert(
            7,
            SessionRecord {
                url: "http://example.invalid/x".to_string(),
                file_name: path.to_string_lossy().to_string(),
                file: Arc::new(AsyncMutex::new(file)),
                state: SessionState::Process,
                offset: 0,
                generation: 0,
            },
        );

        let signals = SignalBus::new();
        let seen_error = Arc::new(AtomicU64::new(0));
        let seen_error_clone = seen_error.clone();
        signals.subscribe_state(Box::new(move |id, state| {
            if id == 7 && state == SessionState::Error {
                seen_error_clone.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let job = WriteJob {
            id: 7,
            buffer: Bytes::from_static(b"data"),
            offset: 0,
            total_len: 4,
        };
        handle_job(job, &sessions, &signals).await;

        assert_eq!(seen_error.load(Ordering::SeqCst), 1);
        assert!(!sessions.lock().await.contains_key(&7));
    }
}
