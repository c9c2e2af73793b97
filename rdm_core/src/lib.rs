pub mod downloader;
pub mod types;

pub use downloader::engine::DownloadEngine;
pub use types::types::{DownloadError, SessionId, SessionState};
