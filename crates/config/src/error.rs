//! Configuration error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::env::{DNS_AUTH_TOKEN, DNS_AUTH_TOKEN_FILE, DNS_AUTH_TOKEN_VAULT};

/// Result type for configuration assembly and credential resolution
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while assembling configuration or resolving the DNS token
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("Missing {key} environment variable")]
    MissingConfig { key: &'static str },

    /// A configuration value or secret resolved to an empty string
    #[error("Empty value found in {source_name}")]
    EmptyConfig { source_name: String },

    /// Certificate key type is not one of the supported RSA sizes
    #[error("Invalid key type '{value}'. Allowed values are 'RSA2048', 'RSA4096' and 'RSA8192'.")]
    InvalidKeyType { value: String },

    /// A boolean environment variable could not be parsed
    #[error("Invalid boolean '{value}' in {key} environment variable")]
    InvalidBoolean { key: &'static str, value: String },

    /// A numeric environment variable could not be parsed
    #[error("Invalid number '{value}' in {key} environment variable")]
    InvalidNumber { key: &'static str, value: String },

    /// No domain names were provided
    #[error("A comma-separated list of domain names must be provided through DOMAINS environment variable")]
    MissingDomains,

    /// A domain name could not be normalized to ASCII
    #[error("Invalid domain name '{domain}': {message}")]
    InvalidDomain { domain: String, message: String },

    /// No account email was provided
    #[error("An email must be provided through ACCOUNT_EMAIL environment variable")]
    MissingEmail,

    /// Terms of service were explicitly declined
    #[error("Terms of service must be agreed to register an ACME account (LE_TOS_AGREED=false)")]
    TermsNotAgreed,

    /// Account key file holds a PEM block that is neither RSA nor EC
    #[error("Unknown private key type '{label}' in {}", .path.display())]
    UnknownKeyType { path: PathBuf, label: String },

    /// Account key file could not be decoded
    #[error("Invalid account key in {}: {message}", .path.display())]
    InvalidAccountKey { path: PathBuf, message: String },

    /// None of the token sources is configured
    #[error(
        "No DNS auth token configured. Use one of '{}', '{}' or '{}' environment variable",
        DNS_AUTH_TOKEN,
        DNS_AUTH_TOKEN_FILE,
        DNS_AUTH_TOKEN_VAULT
    )]
    NoCredentialSource,

    /// Filesystem operation failed
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Network call to the secret vault failed
    #[error("Secret vault request failed: {0}")]
    VaultRequest(String),

    /// Vault reference is not a usable URI
    #[error("Invalid vault URI '{uri}': {message}")]
    InvalidVaultUri { uri: String, message: String },

    /// Ambient credentials were missing or rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The requested secret does not exist in the vault
    #[error("Secret '{secret_name}' not found in vault {vault}")]
    NotFound { vault: String, secret_name: String },

    /// The process environment could not be read
    #[error("Failed to read process environment: {0}")]
    Environment(#[from] envy::Error),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_credential_source_lists_all_keys() {
        let message = ConfigError::NoCredentialSource.to_string();
        assert!(message.contains("DNS_AUTH_TOKEN'"));
        assert!(message.contains("DNS_AUTH_TOKEN_FILE"));
        assert!(message.contains("DNS_AUTH_TOKEN_VAULT"));
    }

    #[test]
    fn test_invalid_key_type_lists_allowed_values() {
        let err = ConfigError::InvalidKeyType {
            value: "A".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid key type 'A'. Allowed values are 'RSA2048', 'RSA4096' and 'RSA8192'."
        );
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::MissingConfig {
            key: "DNS_AUTH_TOKEN",
        };
        assert_eq!(
            err.to_string(),
            "Missing DNS_AUTH_TOKEN environment variable"
        );

        let err = ConfigError::NotFound {
            vault: "https://example.vault.azure.net/".to_string(),
            secret_name: "do-auth-token".to_string(),
        };
        assert!(err.to_string().contains("do-auth-token"));

        let err = ConfigError::io(
            "/tmp/token",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/token"));
    }
}
