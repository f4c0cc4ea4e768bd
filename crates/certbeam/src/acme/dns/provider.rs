//! DNS provider trait for DNS-01 challenges

use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

/// Result type for DNS operations
pub type DnsResult<T> = Result<T, DnsProviderError>;

/// Errors that can occur during DNS provider operations
#[derive(Debug, Error)]
pub enum DnsProviderError {
    /// Authentication failed with the DNS provider
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Zone not found for the domain
    #[error("Zone not found for domain '{domain}'")]
    ZoneNotFound { domain: String },

    /// Record creation failed
    #[error("Failed to create TXT record for '{record_name}': {message}")]
    RecordCreation {
        record_name: String,
        message: String,
    },

    /// Record deletion failed
    #[error("Failed to delete TXT record '{record_id}': {message}")]
    RecordDeletion { record_id: String, message: String },

    /// API request failed
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Request or propagation timeout
    #[error("Timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    /// DNS lookup failed for a reason other than the record being absent
    #[error("DNS lookup failed for '{record}': {message}")]
    Lookup { record: String, message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// DNS provider capable of publishing DNS-01 challenge records
///
/// Only the two calls the challenge flow needs are part of the contract.
#[async_trait]
pub trait DnsProvider: Send + Sync + Debug {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Create a TXT record `{record_name}.{domain}` holding `record_value`
    ///
    /// Returns a provider specific record id for [`DnsProvider::delete_txt_record`].
    async fn create_txt_record(
        &self,
        domain: &str,
        record_name: &str,
        record_value: &str,
    ) -> DnsResult<String>;

    /// Delete a record created by [`DnsProvider::create_txt_record`]
    ///
    /// Deleting a record that no longer exists is not an error.
    async fn delete_txt_record(&self, domain: &str, record_id: &str) -> DnsResult<()>;
}

/// ACME challenge record name prefix
pub const ACME_CHALLENGE_RECORD: &str = "_acme-challenge";

/// TTL for challenge records, in seconds
pub const CHALLENGE_TTL: u32 = 30;

/// Strip a leading wildcard label
///
/// `*.example.com` and `example.com` share the same challenge record.
pub fn normalize_domain(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// Full challenge record name, e.g. `_acme-challenge.example.com`
pub fn challenge_record_fqdn(domain: &str) -> String {
    format!("{}.{}", ACME_CHALLENGE_RECORD, normalize_domain(domain))
}
