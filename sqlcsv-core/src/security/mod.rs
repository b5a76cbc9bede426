//! Credential protection utilities.
//!
//! - `credentials`: secure credential container with automatic memory zeroing

mod credentials;

pub use credentials::Credentials;
