//! Query execution and CSV export over an open session.

mod sink;

pub use sink::{CsvSink, LINE_TERMINATOR, write_empty_header};

use crate::batch::{BatchReport, JobOutcome};
use crate::error::SqlCsvError;
use crate::query::{QueryJob, load_query_from_file};
use crate::session::{FetchOptions, QuerySession, RowStream};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Query used to check that a session is usable.
pub const VERIFY_QUERY: &str = "SELECT @@VERSION AS version, GETDATE() AS current_time";

/// Server details returned by [`Exporter::verify_session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// `@@VERSION` text
    pub version: String,
    /// Server clock as text
    pub current_time: String,
}

/// Runs queries on one session and writes their results as CSV.
#[derive(Debug)]
pub struct Exporter<S> {
    session: Option<S>,
    fetch: FetchOptions,
}

impl<S: QuerySession> Exporter<S> {
    /// Creates an exporter owning `session`.
    pub fn new(session: S) -> Self {
        Self {
            session: Some(session),
            fetch: FetchOptions::default(),
        }
    }

    /// Builder method to set fetch parameters.
    pub fn with_fetch_options(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }

    /// Fetch parameters used for every query.
    pub fn fetch_options(&self) -> FetchOptions {
        self.fetch
    }

    /// Whether the session is still open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Releases the session. Later exports fail with `NoSession`.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            info!("Database session closed");
        }
    }

    /// Executes `sql` and writes its result set to `output`.
    ///
    /// The file is created only once the statement has executed; a failure
    /// while fetching or writing removes it. Returns the number of data
    /// rows written.
    ///
    /// # Errors
    /// - `NoSession` after [`Exporter::close`]
    /// - `QueryExecution` for empty SQL or a driver failure
    /// - `FileWrite` when the output cannot be created or written
    pub fn export_query(&mut self, sql: &str, output: &Path) -> crate::Result<u64> {
        let session = self.session.as_mut().ok_or(SqlCsvError::NoSession)?;

        if sql.trim().is_empty() {
            return Err(SqlCsvError::query_failed("empty SQL text"));
        }

        debug!("Executing query for {}", output.display());
        let cursor = session
            .execute(sql, &self.fetch)
            .map_err(|e| SqlCsvError::query_failed(e.to_string()))?;

        let file = File::create(output).map_err(|e| SqlCsvError::file_write(output, e))?;
        let written = match cursor.filter(|rows| !rows.column_names().is_empty()) {
            Some(mut rows) => write_result_set(&mut rows, file, output),
            None => {
                debug!("Statement returned no columns");
                write_empty_header(file)
                    .map(|()| 0)
                    .map_err(|e| SqlCsvError::file_write(output, e))
            }
        };

        let count = keep_or_discard(written, output)?;
        info!("Exported {} rows to {}", count, output.display());
        Ok(count)
    }

    /// Reads `sql_path` and exports its query to `output`.
    ///
    /// # Errors
    /// `FileRead` when the query file cannot be read, otherwise as
    /// [`Exporter::export_query`]
    pub fn export_file(&mut self, sql_path: &Path, output: &Path) -> crate::Result<u64> {
        let sql = load_query_from_file(sql_path)?;
        self.export_query(&sql, output)
    }

    /// Runs [`VERIFY_QUERY`] and returns the server version and time.
    ///
    /// # Errors
    /// `NoSession` or `QueryExecution`
    pub fn verify_session(&mut self) -> crate::Result<SessionInfo> {
        let session = self.session.as_mut().ok_or(SqlCsvError::NoSession)?;
        let mut rows = session
            .execute(VERIFY_QUERY, &self.fetch)
            .map_err(|e| SqlCsvError::query_failed(e.to_string()))?
            .ok_or_else(|| SqlCsvError::query_failed("verification query returned no result set"))?;

        let batch = rows
            .next_batch()
            .map_err(|e| SqlCsvError::query_failed(e.to_string()))?
            .unwrap_or_default();
        let row = batch
            .first()
            .ok_or_else(|| SqlCsvError::query_failed("verification query returned no rows"))?;

        let cell = |index: usize| {
            row.get(index)
                .map(|value| value.to_csv_field().into_owned())
                .unwrap_or_default()
        };
        let info = SessionInfo {
            version: cell(0),
            current_time: cell(1),
        };
        debug!("Server version: {}", info.version);
        Ok(info)
    }

    /// Runs every job in order, recording each outcome.
    ///
    /// A failing job is logged and recorded; later jobs still run.
    pub fn run_batch(&mut self, jobs: &[QueryJob]) -> BatchReport {
        let mut report = BatchReport::default();

        for job in jobs {
            let name = job.name();
            info!(job = %name, "Processing {} -> {}", name, job.output.display());

            let result = job
                .source
                .load()
                .and_then(|sql| self.export_query(&sql, &job.output));

            match result {
                Ok(rows) => {
                    info!(job = %name, rows, "Wrote {}", job.output.display());
                    report.push(JobOutcome::succeeded(name, job.output.clone(), rows));
                }
                Err(e) => {
                    error!(job = %name, "Export failed: {}", e);
                    report.push(JobOutcome::failed(name, job.output.clone(), &e));
                }
            }
        }

        info!(
            "Batch finished: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }
}

/// Removes `output` when writing it failed.
fn keep_or_discard(written: crate::Result<u64>, output: &Path) -> crate::Result<u64> {
    if written.is_err()
        && let Err(remove_error) = std::fs::remove_file(output)
        && remove_error.kind() != std::io::ErrorKind::NotFound
    {
        warn!(
            "Failed to remove partial output {}: {}",
            output.display(),
            remove_error
        );
    }
    written
}

fn write_result_set<R: RowStream, W: Write>(
    rows: &mut R,
    inner: W,
    output: &Path,
) -> crate::Result<u64> {
    let mut sink = CsvSink::with_header(inner, rows.column_names())
        .map_err(|e| SqlCsvError::file_write(output, e))?;

    while let Some(batch) = rows
        .next_batch()
        .map_err(|e| SqlCsvError::query_failed(e.to_string()))?
    {
        for row in &batch {
            sink.write_row(row).map_err(|e| SqlCsvError::file_write(output, e))?;
        }
        debug!("Wrote batch of {} rows ({} total)", batch.len(), sink.rows());
    }

    sink.finish().map_err(|e| SqlCsvError::file_write(output, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{DriverError, Row};
    use crate::value::CellValue;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Rows served in pre-built batches, optionally failing after them.
    struct Scripted {
        columns: Vec<String>,
        batches: VecDeque<Vec<Row>>,
        fail_after: bool,
    }

    impl RowStream for Scripted {
        fn column_names(&self) -> &[String] {
            &self.columns
        }

        fn next_batch(&mut self) -> Result<Option<Vec<Row>>, DriverError> {
            match self.batches.pop_front() {
                Some(batch) => Ok(Some(batch)),
                None if self.fail_after => {
                    Err(DriverError::new("connection lost").with_sqlstate("08S01"))
                }
                None => Ok(None),
            }
        }
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[derive(Default)]
    struct FakeSession {
        executed: Vec<String>,
        fail_fetch: bool,
    }

    impl QuerySession for FakeSession {
        type Rows<'s> = Scripted;

        fn execute<'s>(
            &'s mut self,
            sql: &str,
            fetch: &FetchOptions,
        ) -> Result<Option<Scripted>, DriverError> {
            self.executed.push(sql.to_string());
            match sql {
                "SELECT 1 AS test" => Ok(Some(Scripted {
                    columns: columns(&["test"]),
                    batches: VecDeque::from([vec![vec![CellValue::Int(1)]]]),
                    fail_after: self.fail_fetch,
                })),
                "SELECT big" => {
                    let rows: Vec<Row> = (0..25).map(|i| vec![CellValue::Int(i)]).collect();
                    Ok(Some(Scripted {
                        columns: columns(&["n"]),
                        batches: rows.chunks(fetch.batch_size).map(<[Row]>::to_vec).collect(),
                        fail_after: self.fail_fetch,
                    }))
                }
                VERIFY_QUERY => Ok(Some(Scripted {
                    columns: columns(&["version", "current_time"]),
                    batches: VecDeque::from([vec![vec![
                        CellValue::from("Microsoft SQL Server 2022 (RTM) - 16.0.1000.6"),
                        CellValue::from("2024-05-01 12:00:00.000"),
                    ]]]),
                    fail_after: false,
                })),
                "UPDATE t SET x = 1" => Ok(None),
                "SELECT nothing" => Ok(Some(Scripted {
                    columns: Vec::new(),
                    batches: VecDeque::new(),
                    fail_after: false,
                })),
                _ => Err(DriverError::new("Invalid object name 'nope'.").with_sqlstate("42S02")),
            }
        }
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_select_one() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("test.csv");
        let mut exporter = Exporter::new(FakeSession::default());

        assert_eq!(exporter.export_query("SELECT 1 AS test", &out).unwrap(), 1);
        assert_eq!(read(&out), "\"test\"\r\n\"1\"\r\n");
    }

    #[test]
    fn test_batches_are_concatenated() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("big.csv");
        let mut exporter = Exporter::new(FakeSession::default())
            .with_fetch_options(FetchOptions::default().with_batch_size(10));

        assert_eq!(exporter.export_query("SELECT big", &out).unwrap(), 25);
        let content = read(&out);
        assert_eq!(content.lines().count(), 26);
        assert!(content.ends_with("\"24\"\r\n"));
    }

    #[test]
    fn test_no_result_set_writes_empty_line() {
        let dir = TempDir::new().unwrap();
        let mut exporter = Exporter::new(FakeSession::default());

        for sql in ["UPDATE t SET x = 1", "SELECT nothing"] {
            let out = dir.path().join("empty.csv");
            assert_eq!(exporter.export_query(sql, &out).unwrap(), 0);
            assert_eq!(read(&out), "\r\n");
        }
    }

    #[test]
    fn test_failed_statement_creates_no_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("bad.csv");
        let mut exporter = Exporter::new(FakeSession::default());

        let err = exporter.export_query("SELECT * FROM nope", &out).unwrap_err();
        assert!(matches!(err, SqlCsvError::QueryExecution { .. }));
        assert!(err.to_string().contains("Invalid object name"));
        assert!(!out.exists());
    }

    #[test]
    fn test_fetch_failure_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("partial.csv");
        let mut exporter = Exporter::new(FakeSession {
            fail_fetch: true,
            ..FakeSession::default()
        });

        let err = exporter.export_query("SELECT 1 AS test", &out).unwrap_err();
        assert!(matches!(err, SqlCsvError::QueryExecution { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn test_failed_write_discards_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("empty.csv");

        std::fs::write(&out, LINE_TERMINATOR).unwrap();
        assert_eq!(keep_or_discard(Ok(0), &out).unwrap(), 0);
        assert!(out.exists());

        let failed = Err(SqlCsvError::file_write(
            &out,
            std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full"),
        ));
        let err = keep_or_discard(failed, &out).unwrap_err();
        assert!(matches!(err, SqlCsvError::FileWrite { .. }));
        assert!(!out.exists());

        // Nothing left to remove is not an additional failure
        let failed = Err(SqlCsvError::query_failed("connection lost"));
        assert!(matches!(
            keep_or_discard(failed, &out),
            Err(SqlCsvError::QueryExecution { .. })
        ));
    }

    #[test]
    fn test_empty_sql_never_reaches_session() {
        let dir = TempDir::new().unwrap();
        let mut exporter = Exporter::new(FakeSession::default());

        let err = exporter
            .export_query("  \n\t", &dir.path().join("x.csv"))
            .unwrap_err();
        assert!(matches!(err, SqlCsvError::QueryExecution { .. }));
        assert!(exporter.session.as_ref().unwrap().executed.is_empty());
    }

    #[test]
    fn test_closed_exporter() {
        let dir = TempDir::new().unwrap();
        let mut exporter = Exporter::new(FakeSession::default());
        assert!(exporter.is_open());
        exporter.close();
        assert!(!exporter.is_open());

        let err = exporter
            .export_query("SELECT 1 AS test", &dir.path().join("x.csv"))
            .unwrap_err();
        assert!(matches!(err, SqlCsvError::NoSession));
        assert!(matches!(exporter.verify_session(), Err(SqlCsvError::NoSession)));
    }

    #[test]
    fn test_unwritable_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("missing_dir").join("x.csv");
        let mut exporter = Exporter::new(FakeSession::default());

        let err = exporter.export_query("SELECT 1 AS test", &out).unwrap_err();
        assert!(matches!(err, SqlCsvError::FileWrite { .. }));
    }

    #[test]
    fn test_verify_session() {
        let mut exporter = Exporter::new(FakeSession::default());
        let info = exporter.verify_session().unwrap();
        assert!(info.version.starts_with("Microsoft SQL Server"));
        assert_eq!(info.current_time, "2024-05-01 12:00:00.000");
    }

    #[test]
    fn test_batch_continues_after_failure() {
        let dir = TempDir::new().unwrap();
        let jobs = [
            QueryJob::inline("SELECT * FROM nope", dir.path().join("a.csv")),
            QueryJob::from_file(dir.path().join("missing.sql"), dir.path().join("m.csv")),
            QueryJob::inline("SELECT 1 AS test", dir.path().join("b.csv")),
        ];
        let mut exporter = Exporter::new(FakeSession::default());

        let report = exporter.run_batch(&jobs);
        assert_eq!(report.jobs.len(), 3);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.succeeded(), 1);
        assert!(report.jobs[1].error.as_deref().unwrap().contains("missing.sql"));
        assert_eq!(report.jobs[2].rows, Some(1));
        assert_eq!(read(&dir.path().join("b.csv")), "\"test\"\r\n\"1\"\r\n");
        assert!(!dir.path().join("a.csv").exists());
    }
}
