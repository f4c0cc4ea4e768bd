//! DNS provider credential sources
//!
//! The auth token handed to the DNS provider can live in one of three places:
//!
//! - [`SecretBackend::Environment`] - literal value in `DNS_AUTH_TOKEN`
//! - [`SecretBackend::File`] - file referenced by `DNS_AUTH_TOKEN_FILE`
//! - [`SecretBackend::Vault`] - Azure Key Vault secret referenced by `DNS_AUTH_TOKEN_VAULT`
//!
//! [`CredentialResolver`] picks exactly one of them from the environment snapshot
//! and fetches the token. There is no fallback between sources.

mod resolver;
mod vault;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::env::{DNS_AUTH_TOKEN, DNS_AUTH_TOKEN_FILE};
use crate::error::{ConfigError, ConfigResult};

pub use resolver::CredentialResolver;
pub use vault::{vault_endpoint, AzureCredential, VaultSecret, DEFAULT_SECRET_NAME, KEY_VAULT_SCOPE};

/// Where the DNS auth token comes from
#[derive(Debug, Clone)]
pub enum SecretBackend {
    /// Literal token from the environment snapshot
    Environment { value: Option<String> },
    /// Token stored in a file
    File { path: PathBuf },
    /// Token stored as a vault secret
    Vault(VaultSecret),
}

/// Which backend populated a token, without the token itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    File,
    Vault,
}

impl SecretBackend {
    /// Which kind of source this backend reads from
    pub fn source(&self) -> TokenSource {
        match self {
            SecretBackend::Environment { .. } => TokenSource::Environment,
            SecretBackend::File { .. } => TokenSource::File,
            SecretBackend::Vault(_) => TokenSource::Vault,
        }
    }

    /// Fetch the secret value
    ///
    /// Only the vault backend touches the network; `http` is unused otherwise.
    pub async fn fetch(&self, http: &reqwest::Client) -> ConfigResult<String> {
        match self {
            SecretBackend::Environment { value } => fetch_from_env(value.as_deref()),
            SecretBackend::File { path } => fetch_from_file(path),
            SecretBackend::Vault(secret) => secret.fetch(http).await,
        }
    }
}

fn fetch_from_env(value: Option<&str>) -> ConfigResult<String> {
    let value = value.ok_or(ConfigError::MissingConfig {
        key: DNS_AUTH_TOKEN,
    })?;

    if value.trim().is_empty() {
        return Err(ConfigError::EmptyConfig {
            source_name: format!("{} environment variable", DNS_AUTH_TOKEN),
        });
    }

    Ok(value.to_string())
}

fn fetch_from_file(path: &Path) -> ConfigResult<String> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let token = strip_line_terminator(&content);

    if token.is_empty() {
        return Err(ConfigError::EmptyConfig {
            source_name: format!("{} file {}", DNS_AUTH_TOKEN_FILE, path.display()),
        });
    }

    debug!(path = %path.display(), "Loaded DNS auth token from file");
    Ok(token.to_string())
}

/// Strip exactly one trailing `\n` or `\r\n`
pub fn strip_line_terminator(value: &str) -> &str {
    value
        .strip_suffix("\r\n")
        .or_else(|| value.strip_suffix('\n'))
        .unwrap_or(value)
}
