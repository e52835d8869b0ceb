//! SHA-256 certificate fingerprints.
//!
//! Browsers pin self-signed WebTransport certificates through the
//! `serverCertificateHashes` option, which takes the SHA-256 digest of the
//! DER encoded certificate. The same digest, hex encoded, is what the API
//! endpoint serves.

use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// SHA-256 digest of a DER certificate, with its lowercase hex encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CertificateFingerprint {
    digest: [u8; 32],
    hex: String,
}

impl CertificateFingerprint {
    /// Length of the hex encoding.
    pub const HEX_LEN: usize = 64;

    /// Fingerprint of the given DER bytes.
    pub fn of(der: &[u8]) -> Self {
        let digest: [u8; 32] = Sha256::digest(der).into();
        Self {
            digest,
            hex: hex::encode(digest),
        }
    }

    /// Parse a fingerprint received as text, e.g. from the API endpoint.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let mut digest = [0u8; 32];
        if text.len() != Self::HEX_LEN || hex::decode_to_slice(text, &mut digest).is_err() {
            return Err(Error::InvalidFingerprint(text.to_string()));
        }
        Ok(Self {
            digest,
            hex: hex::encode(digest),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.hex
    }

    /// Raw digest, as passed to `serverCertificateHashes`.
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }
}

impl fmt::Display for CertificateFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

impl FromStr for CertificateFingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
