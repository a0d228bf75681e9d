//! Output module: consumers of the record stream
//!
//! This module handles:
//! - Writing records as JSON lines
//! - Storing records and run metadata in SQLite
//! - Printing run statistics

mod jsonl;
mod schema;
mod sqlite_output;
pub mod stats;
mod traits;

pub use jsonl::JsonLinesSink;
pub use sqlite_output::SqliteSink;
pub use stats::print_statistics;
pub use traits::{OutputError, OutputResult, RecordSink, RunStatus};

use crate::record::OutputRecord;
use tokio::sync::mpsc;

/// Drains the record stream into a sink until the sender side closes
///
/// Returns the number of records written. A sink error stops draining and
/// drops the receiver, which ends the run with `OutputClosed`.
pub async fn drain_records<S: RecordSink + ?Sized>(
    mut records: mpsc::Receiver<OutputRecord>,
    sink: &mut S,
) -> OutputResult<u64> {
    let mut written = 0;
    while let Some(record) = records.recv().await {
        sink.write_record(&record)?;
        written += 1;
    }
    Ok(written)
}
