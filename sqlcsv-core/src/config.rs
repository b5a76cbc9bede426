//! SQL Server connection configuration.
//!
//! `ServerConfig` is built once at startup (the binary fills it from
//! `MSSQL_*` environment variables or flags) and passed explicitly to the
//! connector. It never changes afterwards.

use crate::error::SqlCsvError;
use crate::security::Credentials;
use std::time::Duration;

/// Port used when the server string carries no `,port` suffix.
pub const DEFAULT_PORT: u16 = 1433;

/// Connection and login timeout embedded in every connection attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for SQL Server connections.
///
/// # Security
/// `Display` omits credentials entirely and `Debug` masks the password.
///
/// # Example
/// ```rust
/// use sqlcsv_core::{ServerConfig, security::Credentials};
///
/// let config = ServerConfig::new("db.internal,14330")
///     .with_database("reporting")
///     .with_credentials(Credentials::new(Some("etl".into()), Some("pw".into())));
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.address()?.port, 14330);
/// # Ok::<(), sqlcsv_core::SqlCsvError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server string as given: `host`, `host,port` or `host\instance`
    pub server: String,
    /// Database name
    pub database: String,
    /// SQL authentication credentials (ignored for trusted connections)
    pub credentials: Credentials,
    /// Use integrated authentication instead of UID/PWD
    pub trusted_connection: bool,
    /// `ConnectionTimeout` attribute of the connection string
    pub connect_timeout: Duration,
    /// `LoginTimeout` attribute and driver manager login timeout
    pub login_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            database: "master".to_string(),
            credentials: Credentials::default(),
            trusted_connection: false,
            connect_timeout: DEFAULT_TIMEOUT,
            login_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ServerConfig({}/{})", self.server, self.database)
    }
}

impl ServerConfig {
    /// Creates a new config for `server` with default database and timeouts.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Default::default()
        }
    }

    /// Builder method to set the database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Builder method to set credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Builder method to toggle integrated authentication.
    pub fn with_trusted_connection(mut self, trusted: bool) -> Self {
        self.trusted_connection = trusted;
        self
    }

    /// Validates configuration values that do not depend on credentials.
    ///
    /// # Errors
    /// Returns error if the server string or timeouts are unusable
    pub fn validate(&self) -> crate::Result<()> {
        if self.database.trim().is_empty() {
            return Err(SqlCsvError::configuration("database cannot be empty"));
        }

        self.address()?;

        if self.connect_timeout.as_secs() == 0 {
            return Err(SqlCsvError::configuration(
                "connect_timeout must be at least one second",
            ));
        }

        if self.login_timeout.as_secs() == 0 {
            return Err(SqlCsvError::configuration(
                "login_timeout must be at least one second",
            ));
        }

        Ok(())
    }

    /// Checks that SQL authentication has both a username and a password.
    ///
    /// # Errors
    /// Returns `MissingCredentials` naming the first absent variable
    pub fn require_credentials(&self) -> crate::Result<()> {
        if self.trusted_connection {
            return Ok(());
        }
        if self.credentials.username().is_none() {
            return Err(SqlCsvError::MissingCredentials {
                missing: "MSSQL_USERNAME",
            });
        }
        if !self.credentials.has_password() {
            return Err(SqlCsvError::MissingCredentials {
                missing: "MSSQL_PASSWORD",
            });
        }
        Ok(())
    }

    /// Parses the server string into a probe-able address.
    ///
    /// # Errors
    /// Returns error if the host is empty or the port is not a valid number
    pub fn address(&self) -> crate::Result<ServerAddress> {
        ServerAddress::parse(&self.server)
    }
}

/// Host and port derived from a SQL Server server string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Host name or IP, without `tcp:` prefix or instance suffix
    pub host: String,
    /// TCP port, [`DEFAULT_PORT`] when unspecified
    pub port: u16,
    /// Named instance (`host\instance`), if any
    pub instance: Option<String>,
}

impl ServerAddress {
    /// Splits `tcp:host\instance,port` into its parts.
    ///
    /// # Errors
    /// Returns error if the host is empty or the port is invalid
    pub fn parse(server: &str) -> crate::Result<Self> {
        let server = server.trim();
        let (host_part, port) = match server.split_once(',') {
            Some((host, port)) => {
                let port = port.trim().parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(
                    || SqlCsvError::configuration(format!("invalid port '{}' in server", port.trim())),
                )?;
                (host, port)
            }
            None => (server, DEFAULT_PORT),
        };

        let host_part = strip_tcp_prefix(host_part.trim());
        let (host, instance) = match host_part.split_once('\\') {
            Some((host, instance)) if !instance.is_empty() => (host, Some(instance.to_string())),
            Some((host, _)) => (host, None),
            None => (host_part, None),
        };

        if host.is_empty() {
            return Err(SqlCsvError::configuration("server host cannot be empty"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            instance,
        })
    }
}

fn strip_tcp_prefix(host: &str) -> &str {
    match host.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("tcp:") => &host[4..],
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_auth(user: &str, password: &str) -> Credentials {
        Credentials::new(Some(user.to_string()), Some(password.to_string()))
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.server, "localhost");
        assert_eq!(config.database, "master");
        assert!(!config.trusted_connection);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.login_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_server_config_validation() {
        assert!(ServerConfig::new("localhost").validate().is_ok());

        let config = ServerConfig::new("");
        assert!(config.validate().is_err());

        let config = ServerConfig::new("localhost,notaport");
        assert!(config.validate().is_err());

        let config = ServerConfig::new("localhost,0");
        assert!(config.validate().is_err());

        let config = ServerConfig::new("localhost").with_database("  ");
        assert!(config.validate().is_err());

        let config = ServerConfig {
            login_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_require_credentials_missing_password() {
        let config = ServerConfig::new("localhost")
            .with_credentials(Credentials::new(Some("sa".to_string()), Some(String::new())));
        let err = config.require_credentials().unwrap_err();
        assert!(matches!(
            err,
            SqlCsvError::MissingCredentials {
                missing: "MSSQL_PASSWORD"
            }
        ));
    }

    #[test]
    fn test_require_credentials_missing_username() {
        let config = ServerConfig::new("localhost")
            .with_credentials(Credentials::new(None, Some("pw".to_string())));
        let err = config.require_credentials().unwrap_err();
        assert!(matches!(
            err,
            SqlCsvError::MissingCredentials {
                missing: "MSSQL_USERNAME"
            }
        ));
    }

    #[test]
    fn test_require_credentials_trusted_skips_check() {
        let config = ServerConfig::new("localhost").with_trusted_connection(true);
        assert!(config.require_credentials().is_ok());

        let config = ServerConfig::new("localhost").with_credentials(sql_auth("sa", "pw"));
        assert!(config.require_credentials().is_ok());
    }

    #[test]
    fn test_display_has_no_credentials() {
        let config = ServerConfig::new("db.example.com,1433")
            .with_database("sales")
            .with_credentials(sql_auth("report_user", "s3cret"));

        let display = config.to_string();
        assert!(display.contains("db.example.com"));
        assert!(display.contains("sales"));
        assert!(!display.contains("report_user"));
        assert!(!display.contains("s3cret"));
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn test_address_default_port() {
        let address = ServerAddress::parse("localhost").unwrap();
        assert_eq!(address.host, "localhost");
        assert_eq!(address.port, 1433);
        assert_eq!(address.instance, None);
    }

    #[test]
    fn test_address_explicit_port() {
        let address = ServerAddress::parse("10.0.0.5, 14330").unwrap();
        assert_eq!(address.host, "10.0.0.5");
        assert_eq!(address.port, 14330);
    }

    #[test]
    fn test_address_named_instance_and_tcp_prefix() {
        let address = ServerAddress::parse("tcp:sqlhost\\REPORTING").unwrap();
        assert_eq!(address.host, "sqlhost");
        assert_eq!(address.port, 1433);
        assert_eq!(address.instance.as_deref(), Some("REPORTING"));

        let address = ServerAddress::parse("TCP:myserver.database.windows.net,1433").unwrap();
        assert_eq!(address.host, "myserver.database.windows.net");
    }

    #[test]
    fn test_address_rejects_empty_host() {
        assert!(ServerAddress::parse(",1433").is_err());
        assert!(ServerAddress::parse("tcp:").is_err());
    }
}
