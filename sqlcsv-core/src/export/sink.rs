//! CSV encoding of result sets.
//!
//! Every field is quoted, embedded quotes are doubled and records end with
//! CRLF. A result set without columns is a single empty header line.

use crate::session::Row;
use std::io::Write;

/// Line terminator of every record.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Quote-all CRLF CSV writer over any byte sink.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    rows: u64,
}

impl<W: Write> CsvSink<W> {
    /// Wraps `inner` and writes the header record.
    ///
    /// # Errors
    /// Returns the underlying I/O error
    pub fn with_header(inner: W, columns: &[String]) -> std::io::Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .terminator(csv::Terminator::CRLF)
            .from_writer(inner);
        writer.write_record(columns)?;
        Ok(Self { writer, rows: 0 })
    }

    /// Writes one data row with every cell normalized.
    ///
    /// # Errors
    /// Returns the underlying I/O error, or an error when the row width
    /// differs from the header
    pub fn write_row(&mut self, row: &Row) -> std::io::Result<()> {
        self.writer
            .write_record(row.iter().map(|cell| cell.to_csv_field().into_owned()))?;
        self.rows += 1;
        Ok(())
    }

    /// Data rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flushes buffered records and returns the data row count.
    ///
    /// # Errors
    /// Returns the underlying I/O error
    pub fn finish(mut self) -> std::io::Result<u64> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

/// Writes the output of a statement that produced no columns.
///
/// # Errors
/// Returns the underlying I/O error
pub fn write_empty_header(mut inner: impl Write) -> std::io::Result<()> {
    inner.write_all(LINE_TERMINATOR)?;
    inner.flush()
}
