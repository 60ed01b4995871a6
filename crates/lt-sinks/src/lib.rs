//! # lt-sinks
//!
//! Where sweep results go.
//!
//! [`CsvRecordStore`] is the authoritative local record: every write must
//! succeed or the sweep fails. [`EventSink`] and [`StorageSink`] are optional
//! external reporting; their failures are logged and swallowed.

mod error;
mod events;
mod record;
mod storage;

pub use error::SinkDispatchError;
pub use events::{EventSink, HttpEventSink, NoopEventSink};
pub use record::{record_file_name, CellRow, CsvRecordStore};
pub use storage::{NoopStorageSink, PresignStorageSink, StorageSink};
