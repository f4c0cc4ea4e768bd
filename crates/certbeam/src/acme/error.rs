//! ACME error types

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::dns::DnsProviderError;

/// Errors that can occur while obtaining a certificate
#[derive(Debug, Error)]
pub enum AcmeError {
    /// Failed to create or load the ACME account
    #[error("Failed to create ACME account: {0}")]
    AccountCreation(String),

    /// Failed to create the certificate order
    #[error("Failed to create certificate order: {0}")]
    OrderCreation(String),

    /// The CA offered no DNS-01 challenge for an identifier
    #[error("No DNS-01 challenge available for domain '{0}'")]
    NoDns01Challenge(String),

    /// Challenge validation failed
    #[error("Challenge validation failed for domain '{domain}': {message}")]
    ChallengeValidation { domain: String, message: String },

    /// Certificate finalization failed
    #[error("Failed to finalize certificate: {0}")]
    Finalization(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Failed to parse the issued chain
    #[error("Failed to parse certificate: {0}")]
    CertificateParse(String),

    /// Failed to generate the certificate key or CSR
    #[error("Failed to generate certificate key: {0}")]
    KeyGeneration(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// DNS provider operation failed
    #[error("DNS provider error: {0}")]
    DnsProvider(#[from] DnsProviderError),

    /// Error from instant-acme, passed through unchanged
    #[error(transparent)]
    Protocol(#[from] instant_acme::Error),
}

/// Errors from the account record and the output files
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error on a specific file
    #[error("IO error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to serialize or deserialize data
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
