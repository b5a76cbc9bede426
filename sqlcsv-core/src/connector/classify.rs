//! Best-effort diagnosis of failed connection attempts.
//!
//! Structured SQLSTATE and native codes are consulted first; message
//! substrings are the fallback. The categories only drive diagnostic
//! output, never control flow.

use crate::session::DriverError;
use serde::Serialize;

/// Diagnostic category of a rejected connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// The server rejected the login
    AuthenticationFailure,
    /// The server could not be reached
    ConnectivityFailure,
    /// Encryption or certificate negotiation failed
    TlsFailure,
    /// The driver is not installed or cannot be loaded
    DriverUnavailable,
    /// Nothing recognizable in the error
    Unknown,
}

impl FailureKind {
    /// Short remediation hint shown next to the failure.
    pub fn hint(self) -> &'static str {
        match self {
            Self::AuthenticationFailure => {
                "check MSSQL_USERNAME / MSSQL_PASSWORD and that SQL authentication is enabled"
            }
            Self::ConnectivityFailure => {
                "check the server name, the port (default 1433) and firewall rules"
            }
            Self::TlsFailure => "the server rejected the encryption or certificate settings",
            Self::DriverUnavailable => {
                "install Microsoft ODBC Driver 17 or 18 for SQL Server"
            }
            Self::Unknown => "see the driver message for details",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::AuthenticationFailure => "authentication failure",
            Self::ConnectivityFailure => "connectivity failure",
            Self::TlsFailure => "TLS failure",
            Self::DriverUnavailable => "driver unavailable",
            Self::Unknown => "unknown failure",
        };
        f.write_str(label)
    }
}

const AUTH_STATES: &[&str] = &["28000"];
const AUTH_NATIVE_CODES: &[i32] = &[18456, 18452, 18470, 18486, 18487, 18488];
const AUTH_MARKERS: &[&str] = &["login failed", "28000", "18456"];

const DRIVER_STATES: &[&str] = &["IM002", "IM003"];
const DRIVER_MARKERS: &[&str] = &[
    "im002",
    "im003",
    "can't open lib",
    "data source name not found",
    "file not found",
];

const TLS_MARKERS: &[&str] = &[
    "ssl provider",
    "ssl security error",
    "tls",
    "certificate",
    "encryption not supported",
    "handshake",
];

const CONNECTIVITY_STATES: &[&str] = &["08001", "08S01", "HYT00", "08004"];
const CONNECTIVITY_MARKERS: &[&str] = &[
    "08001",
    "08s01",
    "hyt00",
    "tcp provider",
    "network-related",
    "timeout expired",
    "login timeout",
    "server was not found",
    "could not open a connection",
    "connection refused",
    "no such host",
];

/// Classifies a driver error into a [`FailureKind`].
pub fn classify(error: &DriverError) -> FailureKind {
    let state = error.sqlstate.as_deref().unwrap_or_default();
    let message = error.message.to_lowercase();
    let mentions = |markers: &[&str]| markers.iter().any(|m| message.contains(m));

    if AUTH_STATES.contains(&state)
        || error
            .native_code
            .is_some_and(|code| AUTH_NATIVE_CODES.contains(&code))
        || mentions(AUTH_MARKERS)
    {
        FailureKind::AuthenticationFailure
    } else if DRIVER_STATES.contains(&state) || mentions(DRIVER_MARKERS) {
        FailureKind::DriverUnavailable
    } else if mentions(TLS_MARKERS) {
        FailureKind::TlsFailure
    } else if CONNECTIVITY_STATES.contains(&state) || mentions(CONNECTIVITY_MARKERS) {
        FailureKind::ConnectivityFailure
    } else {
        FailureKind::Unknown
    }
}
