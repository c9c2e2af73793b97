use thiserror::Error;

/// Identifies one download within a single engine instance.
pub type SessionId = u8;

/// Per-session state machine, mirrored by `state_signal` emissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Process,
    WaitPause,
    Paused,
    WaitCancel,
    Canceled,
    Complete,
    Error,
}

/// Errors surfaced through `state_signal(id, Error)` or returned synchronously
/// by the façade methods that can fail without ever touching the session table.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("session id already in use")]
    DuplicateId,
    #[error("a session is already writing to file {0:?}")]
    DuplicateFile(String),
    #[error("failed to open file {path:?}: {source}")]
    FileOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no session with id {0}")]
    UnknownSession(SessionId),
    #[error("session {0} is not paused")]
    NotPaused(SessionId),
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status code {0}")]
    BadStatus(u16),
    #[error("malformed range response: {0}")]
    RangeParse(#[from] RangeParseError),
}

/// Failures of the incremental `Content-Range` header/body parser.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeParseError {
    #[error("Content-Range header not found within scan window")]
    HeaderNotFound,
    #[error("Content-Range header could not be parsed: {0:?}")]
    Malformed(String),
    #[error("Content-Range values are inconsistent (start > end, or end >= total)")]
    InconsistentRange,
}
