//! Configuration for certbeam
//!
//! Everything certbeam needs is read from the process environment once, into a
//! [`ProcessEnv`] snapshot, and assembled into an immutable [`UserConfig`]:
//!
//! ```ignore
//! use certbeam_config::{build_config, CredentialResolver, ProcessEnv};
//!
//! let env = ProcessEnv::from_env()?;
//! let resolver = CredentialResolver::new()?;
//! let config = build_config(&env, &resolver).await?;
//! ```
//!
//! The DNS provider token is resolved from exactly one of three sources, see
//! [`secrets`].

pub mod account_key;
pub mod env;
pub mod error;
pub mod secrets;
pub mod user_config;

pub use account_key::AccountKey;
pub use env::ProcessEnv;
pub use error::{ConfigError, ConfigResult};
pub use secrets::{CredentialResolver, SecretBackend, TokenSource};
pub use user_config::{
    build_config, ca_directory_url, sanitize_domain, CertificateKeyType, UserConfig,
    LETSENCRYPT_PRODUCTION, LETSENCRYPT_STAGING, LOCAL_TEST_DIRECTORY,
};
