//! Traits at the seam between the export logic and a database driver.
//!
//! The connector and exporter are generic over these traits. The ODBC
//! backend (`crate::odbc`) implements them for real servers; tests implement
//! them with in-memory fakes.

use crate::connector::ConnectionDescriptor;
use crate::value::CellValue;
use std::time::Duration;
use thiserror::Error;

/// Default number of rows fetched per round trip.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default maximum length in bytes of a bound character column.
pub const DEFAULT_MAX_TEXT_LEN: usize = 4096;

/// One row of normalized-ready cell values, aligned with the column names.
pub type Row = Vec<CellValue>;

/// Error reported by a database driver.
///
/// Carries the SQLSTATE and native error code when the driver supplied
/// them, so failures can be classified without parsing message text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct DriverError {
    /// Five-character SQLSTATE, e.g. `28000`
    pub sqlstate: Option<String>,
    /// Server-specific error number, e.g. `18456`
    pub native_code: Option<i32>,
    /// Driver message text
    pub message: String,
}

impl DriverError {
    /// Creates an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            sqlstate: None,
            native_code: None,
            message: message.into(),
        }
    }

    /// Builder method to attach a SQLSTATE.
    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    /// Builder method to attach a native error code.
    pub fn with_native_code(mut self, code: i32) -> Self {
        self.native_code = Some(code);
        self
    }
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(state) = &self.sqlstate {
            write!(f, "[{}] ", state)?;
        }
        if let Some(code) = self.native_code {
            write!(f, "({}) ", code)?;
        }
        f.write_str(&self.message)
    }
}

/// Row fetching parameters shared by every query of an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Rows per fetched batch
    pub batch_size: usize,
    /// Largest character column fetched in batches; longer or unbounded
    /// columns are read one row at a time, in full
    pub max_text_len: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_text_len: DEFAULT_MAX_TEXT_LEN,
        }
    }
}

impl FetchOptions {
    /// Builder method to set the batch size (at least one row).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Builder method to set the character buffer limit (at least one byte).
    pub fn with_max_text_len(mut self, max_text_len: usize) -> Self {
        self.max_text_len = max_text_len.max(1);
        self
    }
}

/// Opens sessions from connection descriptors.
pub trait SessionOpener {
    /// Session type produced on success
    type Session: QuerySession;

    /// Attempts a single connection.
    ///
    /// # Errors
    /// Returns the driver's error when the server or driver manager rejects
    /// the attempt
    fn open(
        &self,
        descriptor: &ConnectionDescriptor,
        login_timeout: Duration,
    ) -> Result<Self::Session, DriverError>;
}

/// An open database session able to execute SQL text.
///
/// Dropping the session releases the underlying connection.
pub trait QuerySession {
    /// Result set type borrowing the session
    type Rows<'s>: RowStream
    where
        Self: 's;

    /// Executes `sql` as a single statement.
    ///
    /// Returns `None` when the statement produced no result set.
    ///
    /// # Errors
    /// Returns the driver's error when execution fails
    fn execute<'s>(
        &'s mut self,
        sql: &str,
        fetch: &FetchOptions,
    ) -> Result<Option<Self::Rows<'s>>, DriverError>;
}

/// A single-pass result set.
pub trait RowStream {
    /// Column names in result order.
    fn column_names(&self) -> &[String];

    /// Fetches the next batch of rows, `None` once the cursor is drained.
    ///
    /// # Errors
    /// Returns the driver's error when fetching fails
    fn next_batch(&mut self) -> Result<Option<Vec<Row>>, DriverError>;
}
