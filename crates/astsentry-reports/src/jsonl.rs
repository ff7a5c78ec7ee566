//! Machine readable output: one JSON object per line.

use std::io::Write;

use astsentry_core::Finding;

use crate::reporter::{ReportError, Reporter};

pub struct JsonLinesReporter<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Reporter for JsonLinesReporter<W> {
    fn emit(&mut self, finding: &Finding) -> Result<(), ReportError> {
        serde_json::to_writer(&mut self.writer, finding)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        self.writer.flush()?;
        Ok(())
    }
}
