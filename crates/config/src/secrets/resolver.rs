//! Token source selection

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use super::{SecretBackend, TokenSource, VaultSecret};
use crate::env::{ProcessEnv, DNS_AUTH_TOKEN, DNS_AUTH_TOKEN_FILE, DNS_AUTH_TOKEN_VAULT};
use crate::error::{ConfigError, ConfigResult};

const VAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves the DNS provider auth token from exactly one configured source
///
/// Priority is literal token, then token file, then vault. The first configured
/// source is the only one consulted.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    http: Client,
}

impl CredentialResolver {
    pub fn new() -> ConfigResult<Self> {
        let http = Client::builder()
            .timeout(VAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                ConfigError::VaultRequest(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { http })
    }

    /// Use a preconfigured HTTP client for vault calls
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    /// Pick the backend for this environment without fetching anything
    pub fn select(env: &ProcessEnv) -> ConfigResult<SecretBackend> {
        if env.value(DNS_AUTH_TOKEN).is_some() {
            return Ok(SecretBackend::Environment {
                value: env.raw(DNS_AUTH_TOKEN).map(str::to_string),
            });
        }

        if let Some(path) = env.value(DNS_AUTH_TOKEN_FILE) {
            return Ok(SecretBackend::File {
                path: PathBuf::from(path.trim()),
            });
        }

        if let Some(reference) = env.value(DNS_AUTH_TOKEN_VAULT) {
            return Ok(SecretBackend::Vault(VaultSecret::from_env(reference, env)?));
        }

        Err(ConfigError::NoCredentialSource)
    }

    /// Resolve the DNS auth token
    pub async fn resolve(&self, env: &ProcessEnv) -> ConfigResult<String> {
        self.resolve_with_source(env).await.map(|(token, _)| token)
    }

    /// Resolve the token, returning it with the source that produced it
    pub async fn resolve_with_source(
        &self,
        env: &ProcessEnv,
    ) -> ConfigResult<(String, TokenSource)> {
        let backend = Self::select(env)?;
        let source = backend.source();

        info!(source = ?source, "Resolving DNS auth token");
        let token = backend.fetch(&self.http).await?;

        Ok((token, source))
    }
}
