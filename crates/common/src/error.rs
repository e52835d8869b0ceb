//! Error types for identity generation and fingerprint handling.

use thiserror::Error;

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Key generation or certificate signing failed
    #[error("certificate generation failed: {0}")]
    CertificateGeneration(#[from] rcgen::Error),

    /// The signed certificate could not be read back
    #[error("generated certificate does not parse: {0}")]
    CertificateParse(String),

    /// Validity window could not be represented
    #[error("invalid certificate validity: {0}")]
    Validity(#[from] time::error::ComponentRange),

    /// Fingerprint text is not 64 hex digits
    #[error("invalid certificate fingerprint: {0:?}")]
    InvalidFingerprint(String),
}
