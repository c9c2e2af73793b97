use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::File;
use tokio::sync::Mutex as AsyncMutex;

use crate::types::types::{SessionId, SessionState};

/// One session's table entry. `offset` always holds the first byte position
/// not yet durably written, so it is a valid resume point at any observation.
///
/// `generation` fences a stale range chain: it is bumped whenever a chain is
/// superseded (pause latch, resume), so a request that was already in flight
/// under the old chain is recognized and discarded instead of racing the new
/// one.
pub struct SessionRecord {
    pub url: String,
    pub file_name: String,
    pub file: Arc<AsyncMutex<File>>,
    pub state: SessionState,
    pub offset: u64,
    pub generation: u64,
}

/// One range's payload handed from `on_http_done` to the writer loop.
pub struct WriteJob {
    pub id: SessionId,
    pub buffer: Bytes,
    pub offset: u64,
    pub total_len: u64,
}
