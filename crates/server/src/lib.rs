//! WebTransport echo server
//!
//! - A fresh self-signed certificate per process ([`common::Identity`])
//! - Its SHA-256 fingerprint served over plain HTTP for certificate pinning
//! - A WebTransport endpoint echoing every bidirectional stream
//! - A supervisor that stops everything when either server stops

pub mod cli;
pub mod fingerprint;
pub mod server;
pub mod supervisor;
pub mod webtransport;

pub use supervisor::{run, ServerExit, Supervisor};
