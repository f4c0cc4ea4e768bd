//! DNS-01 challenge support
//!
//! # Flow
//!
//! 1. The [`DnsProvider`] creates `_acme-challenge.<domain>` TXT records
//! 2. [`PropagationChecker`] polls the configured resolvers until the value is visible
//! 3. The ACME server is told the challenge is ready
//! 4. Records are deleted whatever the outcome
//!
//! Wildcard identifiers share the challenge record of their base domain.

mod challenge;
mod digitalocean;
mod propagation;
mod provider;

pub use challenge::{create_challenge_info, Dns01ChallengeInfo, Dns01ChallengeManager};
pub use digitalocean::{DigitalOceanProvider, DIGITALOCEAN_API_BASE};
pub use propagation::{
    resolve_nameservers, with_default_port, PropagationChecker, PropagationConfig,
    DEFAULT_CHECK_INTERVAL, DEFAULT_PROPAGATION_TIMEOUT,
};
pub use provider::{
    challenge_record_fqdn, normalize_domain, DnsProvider, DnsProviderError, DnsResult,
    ACME_CHALLENGE_RECORD, CHALLENGE_TTL,
};
