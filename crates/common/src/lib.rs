//! Common utilities shared between the WebTransport echo server and client.
//!
//! This crate provides:
//! - The per-process self-signed identity and its fingerprint
//! - Certificate pinning for clients
//! - Configuration types
//! - Common error types

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod tls;

pub use config::{ClientConfig, ServerConfig};
pub use error::{Error, Result};
pub use fingerprint::CertificateFingerprint;
pub use tls::{
    install_crypto_provider, pinned_client_config, Identity, PinnedCertVerifier, ALPN_H3,
};
