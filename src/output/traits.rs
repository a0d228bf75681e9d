//! Record sink traits and types
//!
//! This module defines the trait interface for consumers of the record
//! stream and the errors they report.

use crate::crawler::CrawlReport;
use crate::record::OutputRecord;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to encode record: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Final status of a run as seen by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Trait for record sinks
///
/// A sink receives every emitted record in order, then exactly one call to
/// [`finish`](RecordSink::finish) or [`abort`](RecordSink::abort).
pub trait RecordSink {
    /// Writes one record
    fn write_record(&mut self, record: &OutputRecord) -> OutputResult<()>;

    /// Finalizes the output after a completed run
    fn finish(&mut self, report: &CrawlReport) -> OutputResult<()>;

    /// Finalizes the output after a failed or cancelled run
    fn abort(&mut self, reason: &str) -> OutputResult<()> {
        tracing::debug!("Output aborted: {}", reason);
        Ok(())
    }
}

/// Fans every call out to several sinks
impl RecordSink for Vec<Box<dyn RecordSink + Send>> {
    fn write_record(&mut self, record: &OutputRecord) -> OutputResult<()> {
        for sink in self.iter_mut() {
            sink.write_record(record)?;
        }
        Ok(())
    }

    fn finish(&mut self, report: &CrawlReport) -> OutputResult<()> {
        for sink in self.iter_mut() {
            sink.finish(report)?;
        }
        Ok(())
    }

    fn abort(&mut self, reason: &str) -> OutputResult<()> {
        for sink in self.iter_mut() {
            sink.abort(reason)?;
        }
        Ok(())
    }
}
