pub mod engine;
pub mod range_parser;
pub mod range_request;
mod session;
mod signals;
mod writer;

pub use signals::{ProgressCallback, StateCallback};
