//! Driver/TLS candidates tried by the connector, in order.

use serde::Serialize;

/// Microsoft ODBC Driver 18, encrypts by default.
pub const DRIVER_18: &str = "ODBC Driver 18 for SQL Server";

/// Microsoft ODBC Driver 17, plaintext by default.
pub const DRIVER_17: &str = "ODBC Driver 17 for SQL Server";

/// Value of the `Encrypt` connection attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Encryption {
    /// `Encrypt=yes`
    Required,
    /// `Encrypt=optional` (Driver 18 only; Driver 17 reads it as no)
    Optional,
    /// `Encrypt=no`
    Disabled,
}

impl Encryption {
    fn attribute(self) -> &'static str {
        match self {
            Self::Required => "yes",
            Self::Optional => "optional",
            Self::Disabled => "no",
        }
    }
}

/// Value of the `TrustServerCertificate` connection attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CertificateTrust {
    /// `TrustServerCertificate=yes`
    TrustAny,
    /// `TrustServerCertificate=no`
    Verify,
}

impl CertificateTrust {
    fn attribute(self) -> &'static str {
        match self {
            Self::TrustAny => "yes",
            Self::Verify => "no",
        }
    }
}

/// Encryption and certificate policy for one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TlsPolicy {
    /// Whether the channel must be encrypted
    pub encryption: Encryption,
    /// Whether the server certificate is validated
    pub trust: CertificateTrust,
}

impl TlsPolicy {
    /// Encrypted, any certificate accepted.
    pub const TRUST_ANY: Self = Self::new(Encryption::Required, CertificateTrust::TrustAny);
    /// Encryption negotiated, any certificate accepted.
    pub const OPTIONAL: Self = Self::new(Encryption::Optional, CertificateTrust::TrustAny);
    /// No encryption requested.
    pub const PLAINTEXT: Self = Self::new(Encryption::Disabled, CertificateTrust::TrustAny);
    /// Encrypted with full certificate validation.
    pub const VERIFY: Self = Self::new(Encryption::Required, CertificateTrust::Verify);

    /// Creates a policy.
    pub const fn new(encryption: Encryption, trust: CertificateTrust) -> Self {
        Self { encryption, trust }
    }

    /// `Encrypt` attribute value.
    pub fn encrypt_attribute(&self) -> &'static str {
        self.encryption.attribute()
    }

    /// `TrustServerCertificate` attribute value.
    pub fn trust_attribute(&self) -> &'static str {
        self.trust.attribute()
    }
}

/// A driver and the TLS policy to use with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DriverCandidate {
    /// Driver name as registered with the ODBC driver manager
    pub driver: &'static str,
    /// TLS policy for this attempt
    pub tls: TlsPolicy,
}

impl DriverCandidate {
    /// Creates a candidate.
    pub const fn new(driver: &'static str, tls: TlsPolicy) -> Self {
        Self { driver, tls }
    }
}

impl std::fmt::Display for DriverCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (Encrypt={}, TrustServerCertificate={})",
            self.driver,
            self.tls.encrypt_attribute(),
            self.tls.trust_attribute()
        )
    }
}

/// Negotiation order. The first candidate the server accepts wins, so the
/// order decides which configuration is used when several would work.
pub const DEFAULT_CANDIDATES: &[DriverCandidate] = &[
    DriverCandidate::new(DRIVER_18, TlsPolicy::TRUST_ANY),
    DriverCandidate::new(DRIVER_18, TlsPolicy::OPTIONAL),
    DriverCandidate::new(DRIVER_18, TlsPolicy::PLAINTEXT),
    DriverCandidate::new(DRIVER_18, TlsPolicy::VERIFY),
    DriverCandidate::new(DRIVER_17, TlsPolicy::PLAINTEXT),
    DriverCandidate::new(DRIVER_17, TlsPolicy::TRUST_ANY),
];
