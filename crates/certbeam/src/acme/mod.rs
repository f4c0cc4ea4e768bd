//! ACME certificate issuance
//!
//! Obtains TLS certificates from Let's Encrypt and compatible CAs using
//! DNS-01 challenges.
//!
//! # Architecture
//!
//! - [`AcmeRequester`] - Wrapper around `instant-acme` running one order end to end
//! - [`dns`] - DNS provider, propagation checks and challenge record lifecycle
//! - [`AccountStore`] - ACME account record bound to the account key
//! - [`OutputWriter`] - Writes the issued bundle to disk
//!
//! # Challenge Flow
//!
//! 1. [`AcmeRequester`] reuses or registers the account and creates an order
//! 2. For each pending authorization a TXT record is published at `_acme-challenge.<domain>`
//! 3. Resolvers are polled until the record is visible
//! 4. Challenges are marked ready and the order is polled until it validates
//! 5. The order is finalized with a CSR for a fresh RSA key and the chain downloaded
//! 6. Challenge records are removed and [`OutputWriter`] persists the bundle

mod bundle;
mod client;
pub mod dns;
mod error;
mod storage;

pub use bundle::CertificateBundle;
pub use client::AcmeRequester;
pub use error::{AcmeError, StorageError};
pub use storage::{AccountStore, OutputWriter, StoredAccount};
