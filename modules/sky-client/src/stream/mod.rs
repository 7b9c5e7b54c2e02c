//! Bulk event ingestion over a chunked HTTP connection.

mod event_stream;
mod writer;

pub use event_stream::EventStream;
pub use writer::{StreamState, StreamWriter};
