use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::downloader::session::{SessionRecord, WriteJob};
use crate::downloader::signals::SignalBus;
use crate::types::types::{SessionId, SessionState};

type SessionTable = AsyncMutex<HashMap<SessionId, SessionRecord>>;

/// Drains the write queue on a single dedicated task, applying each job's
/// per-session state decision before touching disk. Runs until the sending
/// half of the channel is dropped.
pub async fn writer_loop(
    mut jobs: mpsc::Receiver<WriteJob>,
    sessions: Arc<SessionTable>,
    signals: Arc<SignalBus>,
) {
    loop {
        match tokio::time::timeout(Duration::from_millis(200), jobs.recv()).await {
            Ok(Some(job)) => handle_job(job, &sessions, &signals).await,
            Ok(None) => {
                log::debug!("writer loop exiting: queue closed");
                break;
            }
            Err(_) => continue,
        }
    }
}

enum Decision {
    Discard,
    LatchPause,
    LatchCancel,
    Write(Arc<AsyncMutex<File>>),
}

/// Looks up the session under the table lock, decides what to do with this
/// job, and mutates state/offset there; the actual disk write (and any
/// signal emission) happens after the lock is released.
pub(crate) async fn handle_job(job: WriteJob, sessions: &Arc<SessionTable>, signals: &SignalBus) {
    let decision = {
        let mut table = sessions.lock().await;
        match table.get_mut(&job.id) {
            None => Decision::Discard,
            Some(record) => match record.state {
                SessionState::Paused => Decision::Discard,
                SessionState::WaitPause => {
                    record.offset = job.offset;
                    record.state = SessionState::Paused;
                    record.generation += 1;
                    Decision::LatchPause
                }
                SessionState::WaitCancel => {
                    table.remove(&job.id);
                    Decision::LatchCancel
                }
                SessionState::Process => Decision::Write(record.file.clone()),
                SessionState::Canceled | SessionState::Complete | SessionState::Error => {
                    Decision::Discard
                }
            },
        }
    };

    match decision {
        Decision::Discard => {}
        Decision::LatchPause => {
            log::debug!("session {} latched PAUSED at offset {}", job.id, job.offset);
            signals.emit_state(job.id, SessionState::Paused);
        }
        Decision::LatchCancel => {
            log::debug!("session {} latched CANCELED", job.id);
            signals.emit_state(job.id, SessionState::Canceled);
        }
        Decision::Write(file) => write_and_advance(job, file, sessions, signals).await,
    }
}

async fn write_and_advance(
    job: WriteJob,
    file: Arc<AsyncMutex<File>>,
    sessions: &Arc<SessionTable>,
    signals: &SignalBus,
) {
    let write_result = {
        let mut handle = file.lock().await;
        write_range(&mut handle, job.offset, &job.buffer).await
    };

    if let Err(err) = write_result {
        log::error!("write error for session {}: {err}", job.id);
        sessions.lock().await.remove(&job.id);
        signals.emit_state(job.id, SessionState::Error);
        return;
    }

    let new_offset = job.offset + job.buffer.len() as u64;
    if new_offset == job.total_len {
        sessions.lock().await.remove(&job.id);
        log::info!("session {} complete ({} bytes)", job.id, job.total_len);
        signals.emit_state(job.id, SessionState::Complete);
    } else {
        signals.emit_progress(job.id, new_offset, job.total_len);
    }
}

async fn write_range(file: &mut File, offset: u64, buffer: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(buffer).await?;
    file.flush().await
}
