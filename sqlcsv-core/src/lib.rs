//! Core library for sqlcsv.
//!
//! Connects to Microsoft SQL Server through ODBC by sweeping an ordered
//! table of driver and TLS candidates, executes SQL text and writes each
//! result set as a quote-all, CRLF-terminated CSV file.
//!
//! # Security Guarantees
//! - Passwords are held in zeroizing buffers and never logged
//! - Connection strings are only ever displayed with the password masked
//! - Statements are executed as given; nothing is rewritten or parameterized
//!
//! # Architecture
//! - [`connector`]: candidate sweep and failure classification
//! - [`export`]: query execution, value normalization and CSV writing
//! - [`session`]: the traits the connector and exporter are generic over
//! - `odbc` (feature `odbc`): the `odbc-api` implementation of those traits

pub mod batch;
pub mod config;
pub mod connector;
pub mod error;
pub mod export;
pub mod logging;
#[cfg(feature = "odbc")]
pub mod odbc;
pub mod query;
pub mod security;
pub mod session;
pub mod value;

// Re-export commonly used types
pub use batch::{BatchReport, JobOutcome};
pub use config::{ServerAddress, ServerConfig};
pub use connector::{
    CandidateFailure, Connected, Connector, DriverCandidate, FailureKind, ProbeOutcome, TlsPolicy,
    test_connectivity,
};
pub use error::{Result, SqlCsvError};
pub use export::{Exporter, SessionInfo};
pub use query::{QueryJob, QuerySource, discover_jobs, load_query_from_file};
pub use security::Credentials;
pub use session::{DriverError, FetchOptions, QuerySession, RowStream, SessionOpener};
pub use value::CellValue;
