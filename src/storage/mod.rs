//! Per-session persistence: folder layout, append sinks and the
//! single-writer thread that serializes each stream.

pub mod append_log;
pub mod layout;
pub mod writer;

pub use append_log::{AppendSink, JsonArrayLog, LineLog};
pub use layout::{SessionLayout, StreamId};
pub use writer::{SessionWriters, StreamWriter};
