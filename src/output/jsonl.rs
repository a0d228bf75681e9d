//! JSON lines output: one record per line

use crate::crawler::CrawlReport;
use crate::output::traits::{OutputResult, RecordSink};
use crate::record::OutputRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes each record as a single-line JSON object
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Creates (or truncates) a JSON lines file
    pub fn create(path: &Path) -> OutputResult<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn write_record(&mut self, record: &OutputRecord) -> OutputResult<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self, _report: &CrawlReport) -> OutputResult<()> {
        self.writer.flush()?;
        tracing::debug!("Wrote {} records as JSON lines", self.written);
        Ok(())
    }

    fn abort(&mut self, _reason: &str) -> OutputResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
