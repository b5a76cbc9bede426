//! Connection negotiation over an ordered driver/TLS candidate table.
//!
//! The connector walks [`DEFAULT_CANDIDATES`] (or a caller-supplied table)
//! once, in order, and keeps the first session the server accepts. Failed
//! attempts are classified and logged but never stop the sweep. There is no
//! retry and no backoff: this is a search over a handful of configurations.
//!
//! # Module Structure
//! - `candidate`: drivers, TLS policies and the default negotiation order
//! - `descriptor`: connection string construction with password masking
//! - `classify`: diagnostic categories for rejected attempts
//! - `probe`: raw TCP reachability check

mod candidate;
mod classify;
mod descriptor;
mod probe;

pub use candidate::{
    CertificateTrust, DEFAULT_CANDIDATES, DRIVER_17, DRIVER_18, DriverCandidate, Encryption,
    TlsPolicy,
};
pub use classify::{FailureKind, classify};
pub use descriptor::{ConnectionDescriptor, escape_value};
pub use probe::{DEFAULT_PROBE_TIMEOUT, ProbeOutcome, test_connectivity};

use crate::config::ServerConfig;
use crate::error::SqlCsvError;
use crate::session::SessionOpener;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// A rejected connection attempt.
#[derive(Debug, Clone)]
pub struct CandidateFailure {
    /// Candidate that was tried
    pub candidate: DriverCandidate,
    /// Diagnostic category
    pub kind: FailureKind,
    /// Driver message (never contains the password)
    pub message: String,
}

impl std::fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}: {}", self.candidate, self.kind, self.message)
    }
}

/// An open session and how it was obtained.
#[derive(Debug)]
pub struct Connected<S> {
    /// The open session
    pub session: S,
    /// Candidate the server accepted
    pub candidate: DriverCandidate,
    /// Candidates rejected before it, in attempt order
    pub rejected: Vec<CandidateFailure>,
}

/// Walks a candidate table until a connection succeeds.
#[derive(Debug, Clone, Copy)]
pub struct Connector<'c> {
    candidates: &'c [DriverCandidate],
}

impl Default for Connector<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector<'static> {
    /// Creates a connector over [`DEFAULT_CANDIDATES`].
    pub fn new() -> Self {
        Self {
            candidates: DEFAULT_CANDIDATES,
        }
    }
}

impl<'c> Connector<'c> {
    /// Creates a connector over a custom candidate table.
    pub fn with_candidates(candidates: &'c [DriverCandidate]) -> Self {
        Self { candidates }
    }

    /// The candidate table, in attempt order.
    pub fn candidates(&self) -> &'c [DriverCandidate] {
        self.candidates
    }

    /// Opens a session with the first candidate the server accepts.
    ///
    /// # Errors
    /// - `MissingCredentials` before any attempt when SQL authentication
    ///   lacks a username or password
    /// - `Configuration` when the config is invalid or the table is empty
    /// - `ConnectionFailure` with every attempt's diagnosis when all
    ///   candidates are rejected
    pub fn connect<O: SessionOpener>(
        &self,
        opener: &O,
        config: &ServerConfig,
    ) -> crate::Result<Connected<O::Session>> {
        config.require_credentials()?;
        config.validate()?;

        if self.candidates.is_empty() {
            return Err(SqlCsvError::configuration("no driver candidates configured"));
        }

        info!(
            "Connecting to database {} on {} ({} candidates)",
            config.database,
            config.server,
            self.candidates.len()
        );

        let mut rejected = Vec::new();
        for (index, candidate) in self.candidates.iter().enumerate() {
            let descriptor = ConnectionDescriptor::build(config, candidate);
            debug!(
                attempt = index + 1,
                candidate = %candidate,
                "Connection string: {}",
                descriptor
            );

            match opener.open(&descriptor, config.login_timeout) {
                Ok(session) => {
                    info!(
                        candidate = %candidate,
                        "Connected to {} on {}",
                        config.database,
                        config.server
                    );
                    return Ok(Connected {
                        session,
                        candidate: *candidate,
                        rejected,
                    });
                }
                Err(error) => {
                    let kind = classify(&error);
                    warn!(
                        attempt = index + 1,
                        candidate = %candidate,
                        category = %kind,
                        "Connection attempt failed: {}",
                        error
                    );
                    rejected.push(CandidateFailure {
                        candidate: *candidate,
                        kind,
                        message: error.to_string(),
                    });
                }
            }
        }

        Err(SqlCsvError::ConnectionFailure { attempts: rejected })
    }
}

/// Keeps the driver names that identify SQL Server drivers.
pub fn sql_server_drivers<I>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .filter(|name| name.to_lowercase().contains("sql server"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Credentials;
    use crate::session::{DriverError, FetchOptions, QuerySession, Row, RowStream};
    use std::cell::RefCell;
    use std::time::Duration;

    struct NoRows;

    impl RowStream for NoRows {
        fn column_names(&self) -> &[String] {
            &[]
        }

        fn next_batch(&mut self) -> Result<Option<Vec<Row>>, DriverError> {
            Ok(None)
        }
    }

    #[derive(Debug)]
    struct FakeSession {
        driver: String,
    }

    impl QuerySession for FakeSession {
        type Rows<'s> = NoRows;

        fn execute<'s>(
            &'s mut self,
            _sql: &str,
            _fetch: &FetchOptions,
        ) -> Result<Option<NoRows>, DriverError> {
            Ok(None)
        }
    }

    /// Accepts the attempt whose 1-based index equals `succeed_on`.
    struct ScriptedOpener {
        succeed_on: Option<usize>,
        attempts: RefCell<Vec<String>>,
    }

    impl ScriptedOpener {
        fn new(succeed_on: Option<usize>) -> Self {
            Self {
                succeed_on,
                attempts: RefCell::new(Vec::new()),
            }
        }
    }

    impl SessionOpener for ScriptedOpener {
        type Session = FakeSession;

        fn open(
            &self,
            descriptor: &ConnectionDescriptor,
            login_timeout: Duration,
        ) -> Result<FakeSession, DriverError> {
            assert_eq!(login_timeout, Duration::from_secs(30));
            let mut attempts = self.attempts.borrow_mut();
            attempts.push(descriptor.to_string());
            if Some(attempts.len()) == self.succeed_on {
                Ok(FakeSession {
                    driver: descriptor.get("DRIVER").unwrap_or_default().to_string(),
                })
            } else {
                Err(DriverError::new("Login failed for user 'etl'.").with_sqlstate("28000"))
            }
        }
    }

    fn config() -> ServerConfig {
        ServerConfig::new("db.example.com").with_credentials(Credentials::new(
            Some("etl".to_string()),
            Some("pw".to_string()),
        ))
    }

    #[test]
    fn test_first_candidate_wins() {
        let opener = ScriptedOpener::new(Some(1));
        let connected = Connector::new().connect(&opener, &config()).unwrap();

        assert_eq!(connected.candidate, DEFAULT_CANDIDATES[0]);
        assert!(connected.rejected.is_empty());
        assert_eq!(opener.attempts.borrow().len(), 1);
        assert_eq!(connected.session.driver, "{ODBC Driver 18 for SQL Server}");
    }

    #[test]
    fn test_attempts_stop_at_first_success() {
        for k in 1..=DEFAULT_CANDIDATES.len() {
            let opener = ScriptedOpener::new(Some(k));
            let connected = Connector::new().connect(&opener, &config()).unwrap();

            let attempts = opener.attempts.borrow();
            assert_eq!(attempts.len(), k, "candidate {k} should be the last attempt");
            for (attempt, candidate) in attempts.iter().zip(DEFAULT_CANDIDATES) {
                assert!(attempt.contains(candidate.driver));
                assert!(attempt.contains(&format!("Encrypt={};", candidate.tls.encrypt_attribute())));
            }
            assert_eq!(connected.candidate, DEFAULT_CANDIDATES[k - 1]);
            assert_eq!(connected.rejected.len(), k - 1);
        }
    }

    #[test]
    fn test_all_candidates_fail() {
        let opener = ScriptedOpener::new(None);
        let err = Connector::new().connect(&opener, &config()).unwrap_err();

        match err {
            SqlCsvError::ConnectionFailure { attempts } => {
                assert_eq!(attempts.len(), DEFAULT_CANDIDATES.len());
                assert!(
                    attempts
                        .iter()
                        .all(|a| a.kind == FailureKind::AuthenticationFailure)
                );
                let tried: Vec<_> = attempts.iter().map(|a| a.candidate).collect();
                assert_eq!(tried, DEFAULT_CANDIDATES);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_password_makes_no_attempt() {
        let opener = ScriptedOpener::new(Some(1));
        let config = ServerConfig::new("db.example.com")
            .with_credentials(Credentials::new(Some("etl".to_string()), Some(String::new())));

        let err = Connector::new().connect(&opener, &config).unwrap_err();
        assert!(matches!(err, SqlCsvError::MissingCredentials { .. }));
        assert!(opener.attempts.borrow().is_empty());
    }

    #[test]
    fn test_custom_candidate_table() {
        let table = [DriverCandidate::new(DRIVER_17, TlsPolicy::PLAINTEXT)];
        let opener = ScriptedOpener::new(Some(1));
        let connected = Connector::with_candidates(&table)
            .connect(&opener, &config())
            .unwrap();
        assert_eq!(connected.session.driver, "{ODBC Driver 17 for SQL Server}");

        let err = Connector::with_candidates(&[])
            .connect(&opener, &config())
            .unwrap_err();
        assert!(matches!(err, SqlCsvError::Configuration { .. }));
    }

    #[test]
    fn test_attempt_log_never_has_password() {
        let opener = ScriptedOpener::new(None);
        let config = ServerConfig::new("db.example.com").with_credentials(Credentials::new(
            Some("etl".to_string()),
            Some("very-secret".to_string()),
        ));
        let _ = Connector::new().connect(&opener, &config);
        assert!(
            opener
                .attempts
                .borrow()
                .iter()
                .all(|a| !a.contains("very-secret"))
        );
    }

    #[test]
    fn test_sql_server_drivers_filter() {
        let drivers = sql_server_drivers(
            [
                "ODBC Driver 18 for SQL Server",
                "PostgreSQL Unicode",
                "ODBC Driver 17 for SQL Server",
                "SQLite3",
                "SQL Server Native Client 11.0",
            ]
            .map(String::from),
        );
        assert_eq!(drivers.len(), 3);
        assert!(drivers.contains("SQL Server Native Client 11.0"));
        assert!(!drivers.contains("PostgreSQL Unicode"));
    }
}
