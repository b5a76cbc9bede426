//! ODBC connection string construction.

use super::candidate::DriverCandidate;
use crate::config::ServerConfig;
use zeroize::Zeroizing;

const PASSWORD_KEY: &str = "PWD";

/// Connection string for one candidate, built attribute by attribute.
///
/// `Display` renders the string with the password masked and is the only
/// form that may be logged. [`ConnectionDescriptor::connection_string`]
/// yields the real string in a zeroizing buffer.
#[derive(Clone)]
pub struct ConnectionDescriptor {
    attributes: Vec<(&'static str, Zeroizing<String>)>,
}

impl ConnectionDescriptor {
    /// Builds the descriptor for `candidate` against `config`.
    pub fn build(config: &ServerConfig, candidate: &DriverCandidate) -> Self {
        let mut descriptor = Self {
            attributes: Vec::with_capacity(10),
        };

        descriptor.push("DRIVER", format!("{{{}}}", candidate.driver.replace('}', "}}")));
        descriptor.push("SERVER", escape_value(&config.server));
        descriptor.push("DATABASE", escape_value(&config.database));

        if config.trusted_connection {
            descriptor.push("Trusted_Connection", "yes".to_string());
        } else {
            if let Some(username) = config.credentials.username() {
                descriptor.push("UID", escape_value(username));
            }
            if let Some(password) = config.credentials.password() {
                descriptor.push(PASSWORD_KEY, escape_value(password));
            }
        }

        descriptor.push("Encrypt", candidate.tls.encrypt_attribute().to_string());
        descriptor.push(
            "TrustServerCertificate",
            candidate.tls.trust_attribute().to_string(),
        );
        descriptor.push(
            "ConnectionTimeout",
            config.connect_timeout.as_secs().to_string(),
        );
        descriptor.push("LoginTimeout", config.login_timeout.as_secs().to_string());

        descriptor
    }

    fn push(&mut self, key: &'static str, value: String) {
        self.attributes.push((key, Zeroizing::new(value)));
    }

    /// Value of an attribute as written into the connection string.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Full connection string, password included.
    pub fn connection_string(&self) -> Zeroizing<String> {
        let mut out = Zeroizing::new(String::new());
        for (key, value) in &self.attributes {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push(';');
        }
        out
    }
}

impl std::fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, value) in &self.attributes {
            if *key == PASSWORD_KEY {
                write!(f, "{}=****;", key)?;
            } else {
                write!(f, "{}={};", key, value.as_str())?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectionDescriptor")
            .field(&self.to_string())
            .finish()
    }
}

/// Brace-quotes an attribute value when ODBC syntax requires it.
///
/// Values containing `;`, `{`, `}` or surrounding whitespace are wrapped in
/// braces with every `}` doubled.
pub fn escape_value(value: &str) -> String {
    let needs_braces = value.contains([';', '{', '}'])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if needs_braces {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::candidate::{DRIVER_17, DRIVER_18, TlsPolicy};
    use crate::security::Credentials;

    fn sql_auth_config(password: &str) -> ServerConfig {
        ServerConfig::new("db.example.com,1433")
            .with_database("sales")
            .with_credentials(Credentials::new(
                Some("report".to_string()),
                Some(password.to_string()),
            ))
    }

    #[test]
    fn test_sql_auth_descriptor() {
        let descriptor = ConnectionDescriptor::build(
            &sql_auth_config("s3cret"),
            &DriverCandidate::new(DRIVER_18, TlsPolicy::TRUST_ANY),
        );

        assert_eq!(
            descriptor.connection_string().as_str(),
            "DRIVER={ODBC Driver 18 for SQL Server};SERVER=db.example.com,1433;DATABASE=sales;\
             UID=report;PWD=s3cret;Encrypt=yes;TrustServerCertificate=yes;\
             ConnectionTimeout=30;LoginTimeout=30;"
        );
    }

    #[test]
    fn test_trusted_descriptor_has_no_uid() {
        let config = sql_auth_config("ignored").with_trusted_connection(true);
        let descriptor =
            ConnectionDescriptor::build(&config, &DriverCandidate::new(DRIVER_17, TlsPolicy::PLAINTEXT));

        assert_eq!(descriptor.get("Trusted_Connection"), Some("yes"));
        assert_eq!(descriptor.get("UID"), None);
        assert_eq!(descriptor.get("PWD"), None);
        assert_eq!(descriptor.get("encrypt"), Some("no"));
        assert_eq!(descriptor.get("DRIVER"), Some("{ODBC Driver 17 for SQL Server}"));
    }

    #[test]
    fn test_display_redacts_password() {
        let descriptor = ConnectionDescriptor::build(
            &sql_auth_config("hunter2"),
            &DriverCandidate::new(DRIVER_18, TlsPolicy::VERIFY),
        );

        let shown = descriptor.to_string();
        assert!(shown.contains("PWD=****;"));
        assert!(!shown.contains("hunter2"));
        assert!(!format!("{descriptor:?}").contains("hunter2"));
        assert!(shown.contains("TrustServerCertificate=no"));
    }

    #[test]
    fn test_password_with_special_characters_is_braced() {
        let descriptor = ConnectionDescriptor::build(
            &sql_auth_config("p;ss}word"),
            &DriverCandidate::new(DRIVER_18, TlsPolicy::TRUST_ANY),
        );
        assert_eq!(descriptor.get("PWD"), Some("{p;ss}}word}"));
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value("plain"), "plain");
        assert_eq!(escape_value("a;b"), "{a;b}");
        assert_eq!(escape_value(" padded"), "{ padded}");
        assert_eq!(escape_value("x}y"), "{x}}y}");
        assert_eq!(escape_value("server\\instance"), "server\\instance");
    }
}
