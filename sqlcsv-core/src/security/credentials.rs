//! Secure credential container with automatic memory zeroing.
//!
//! # Security
//! - Credentials are stored in `Zeroizing<T>` containers
//! - Memory is automatically cleared when credentials go out of scope
//! - Passwords are never exposed in debug output or logs

use zeroize::Zeroizing;

/// SQL Server login credentials that zero their memory on drop.
///
/// Empty strings count as absent: `MSSQL_PASSWORD=""` is treated exactly
/// like an unset variable.
///
/// # Example
///
/// ```rust
/// use sqlcsv_core::security::Credentials;
///
/// let creds = Credentials::new(Some("sa".to_string()), Some("secret".to_string()));
/// assert_eq!(creds.username(), Some("sa"));
/// assert!(creds.has_password());
/// assert!(!format!("{creds:?}").contains("secret"));
/// ```
#[derive(Clone, Default)]
pub struct Credentials {
    username: Zeroizing<Option<String>>,
    password: Zeroizing<Option<String>>,
}

impl Credentials {
    /// Creates new credentials, dropping empty values.
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self {
            username: Zeroizing::new(username.filter(|u| !u.is_empty())),
            password: Zeroizing::new(password.filter(|p| !p.is_empty())),
        }
    }

    /// Gets the username, if one was supplied.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Checks if password is present without exposing it.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Exposes the password for building a connection descriptor.
    pub(crate) fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username())
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}
