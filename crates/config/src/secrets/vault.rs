//! Azure Key Vault secret backend
//!
//! Only the single call needed to read one secret is implemented. Access tokens
//! come from the ambient credentials of the process, tried in this order:
//!
//! 1. Service principal (`AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`)
//! 2. App Service managed identity (`IDENTITY_ENDPOINT`, `IDENTITY_HEADER`)
//! 3. Instance metadata service managed identity

use std::fmt;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace};
use url::Url;

use super::strip_line_terminator;
use crate::env::{ProcessEnv, DNS_AUTH_TOKEN_SECRET};
use crate::error::{ConfigError, ConfigResult};

/// Secret name used when `DNS_AUTH_TOKEN_SECRET` is not set
pub const DEFAULT_SECRET_NAME: &str = "do-auth-token";

/// OAuth2 scope for Key Vault data plane access
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";

const KEY_VAULT_RESOURCE: &str = "https://vault.azure.net";
const KEY_VAULT_API_VERSION: &str = "7.4";
const KEY_VAULT_DOMAIN: &str = "vault.azure.net";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Ambient credential used to obtain a Key Vault access token
#[derive(Clone)]
pub enum AzureCredential {
    /// OAuth2 client credentials grant for a service principal
    ClientSecret {
        authority_host: Url,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// App Service / Functions managed identity endpoint
    AppService {
        endpoint: Url,
        header: Option<String>,
    },
    /// VM instance metadata service managed identity
    Imds,
}

impl AzureCredential {
    /// Discover the credential from the environment snapshot
    pub fn from_env(env: &ProcessEnv) -> ConfigResult<Self> {
        let tenant = env.value("AZURE_TENANT_ID");
        let client = env.value("AZURE_CLIENT_ID");
        let secret = env.value("AZURE_CLIENT_SECRET");

        if let (Some(tenant_id), Some(client_id), Some(client_secret)) = (tenant, client, secret) {
            let host = env.value_or("AZURE_AUTHORITY_HOST", DEFAULT_AUTHORITY_HOST);
            let authority_host = parse_authority_host(host)?;
            debug!(authority = %authority_host, "Using service principal credentials for vault");
            return Ok(AzureCredential::ClientSecret {
                authority_host,
                tenant_id: tenant_id.trim().to_string(),
                client_id: client_id.trim().to_string(),
                client_secret: client_secret.to_string(),
            });
        }

        if let Some(endpoint) = env.value("IDENTITY_ENDPOINT") {
            let endpoint = Url::parse(endpoint.trim()).map_err(|e| {
                ConfigError::Auth(format!("Invalid IDENTITY_ENDPOINT '{}': {}", endpoint, e))
            })?;
            debug!(endpoint = %endpoint, "Using App Service managed identity for vault");
            return Ok(AzureCredential::AppService {
                endpoint,
                header: env.value("IDENTITY_HEADER").map(str::to_string),
            });
        }

        debug!("Using instance metadata managed identity for vault");
        Ok(AzureCredential::Imds)
    }

    fn kind(&self) -> &'static str {
        match self {
            AzureCredential::ClientSecret { .. } => "client_secret",
            AzureCredential::AppService { .. } => "app_service",
            AzureCredential::Imds => "imds",
        }
    }

    /// Obtain a bearer token for the Key Vault data plane
    pub async fn access_token(&self, http: &Client) -> ConfigResult<String> {
        let request = match self {
            AzureCredential::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                client_secret,
            } => {
                let token_url = authority_host
                    .join(&format!("{}/oauth2/v2.0/token", tenant_id))
                    .map_err(|e| ConfigError::Auth(format!("Invalid tenant id: {}", e)))?;
                http.post(token_url).form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", KEY_VAULT_SCOPE),
                ])
            }
            AzureCredential::AppService { endpoint, header } => {
                let request = http.get(endpoint.clone()).query(&[
                    ("api-version", APP_SERVICE_API_VERSION),
                    ("resource", KEY_VAULT_RESOURCE),
                ]);
                match header {
                    Some(header) => request.header("X-IDENTITY-HEADER", header),
                    None => request,
                }
            }
            AzureCredential::Imds => http
                .get(IMDS_ENDPOINT)
                .query(&[
                    ("api-version", IMDS_API_VERSION),
                    ("resource", KEY_VAULT_RESOURCE),
                ])
                .header("Metadata", "true"),
        };

        let response = request.send().await.map_err(|e| {
            ConfigError::Auth(format!(
                "Failed to acquire vault access token ({}): {}",
                self.kind(),
                e
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConfigError::Auth(format!(
                "Token endpoint rejected {} credential: HTTP {} - {}",
                self.kind(),
                status,
                body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ConfigError::Auth(format!("Failed to parse token response: {}", e)))?;

        trace!(credential = self.kind(), "Acquired vault access token");
        Ok(token.access_token)
    }
}

impl fmt::Debug for AzureCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AzureCredential::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("authority_host", &authority_host.as_str())
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            AzureCredential::AppService { endpoint, .. } => f
                .debug_struct("AppService")
                .field("endpoint", &endpoint.as_str())
                .finish_non_exhaustive(),
            AzureCredential::Imds => f.write_str("Imds"),
        }
    }
}

fn parse_authority_host(host: &str) -> ConfigResult<Url> {
    let host = host.trim();
    let normalized = if host.ends_with('/') {
        host.to_string()
    } else {
        format!("{}/", host)
    };
    Url::parse(&normalized)
        .map_err(|e| ConfigError::Auth(format!("Invalid AZURE_AUTHORITY_HOST '{}': {}", host, e)))
}

/// A single secret stored in an Azure Key Vault
#[derive(Debug, Clone)]
pub struct VaultSecret {
    vault: Url,
    secret_name: String,
    credential: AzureCredential,
}

impl VaultSecret {
    pub fn new(vault: Url, secret_name: impl Into<String>, credential: AzureCredential) -> Self {
        Self {
            vault,
            secret_name: secret_name.into(),
            credential,
        }
    }

    /// Build the backend from a vault reference and the environment snapshot
    ///
    /// The secret name comes from `DNS_AUTH_TOKEN_SECRET`, defaulting to
    /// [`DEFAULT_SECRET_NAME`].
    pub fn from_env(reference: &str, env: &ProcessEnv) -> ConfigResult<Self> {
        let vault = vault_endpoint(reference)?;
        let secret_name = env
            .value_or(DNS_AUTH_TOKEN_SECRET, DEFAULT_SECRET_NAME)
            .trim();
        let credential = AzureCredential::from_env(env)?;
        Ok(Self::new(vault, secret_name, credential))
    }

    pub fn vault(&self) -> &Url {
        &self.vault
    }

    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    fn secret_url(&self) -> ConfigResult<Url> {
        let mut url = self.vault.clone();
        url.path_segments_mut()
            .map_err(|_| ConfigError::InvalidVaultUri {
                uri: self.vault.to_string(),
                message: "URI cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .push("secrets")
            .push(&self.secret_name);
        url.query_pairs_mut()
            .append_pair("api-version", KEY_VAULT_API_VERSION);
        Ok(url)
    }

    /// Fetch the current version of the secret
    pub async fn fetch(&self, http: &Client) -> ConfigResult<String> {
        let url = self.secret_url()?;
        let token = self.credential.access_token(http).await?;

        debug!(
            vault = %self.vault,
            secret = %self.secret_name,
            "Fetching DNS auth token from vault"
        );

        let response = http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ConfigError::VaultRequest(format!("Failed to fetch secret: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(ConfigError::NotFound {
                    vault: self.vault.to_string(),
                    secret_name: self.secret_name.clone(),
                });
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ConfigError::Auth(format!(
                    "Vault denied access to secret '{}': HTTP {} - {}",
                    self.secret_name, status, body
                )));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(ConfigError::VaultRequest(format!(
                    "Failed to fetch secret: HTTP {} - {}",
                    status, body
                )));
            }
            _ => {}
        }

        let bundle: SecretBundle = response.json().await.map_err(|e| {
            ConfigError::VaultRequest(format!("Failed to parse secret response: {}", e))
        })?;

        let value = strip_line_terminator(&bundle.value);
        if value.is_empty() {
            return Err(ConfigError::EmptyConfig {
                source_name: format!("vault secret '{}'", self.secret_name),
            });
        }

        Ok(value.to_string())
    }
}

/// Expand a vault reference into the vault base URL
///
/// A full `https://` URI is used as given. Anything without a scheme is
/// treated as a vault name under `vault.azure.net`.
pub fn vault_endpoint(reference: &str) -> ConfigResult<Url> {
    let reference = reference.trim();
    let invalid = |message: String| ConfigError::InvalidVaultUri {
        uri: reference.to_string(),
        message,
    };

    if reference.contains("://") {
        if !reference.starts_with("https://") {
            return Err(invalid("vault URI must use https".to_string()));
        }
        return Url::parse(reference).map_err(|e| invalid(e.to_string()));
    }

    let is_vault_name = !reference.is_empty()
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !is_vault_name {
        return Err(invalid(
            "vault name may only contain letters, digits and hyphens".to_string(),
        ));
    }

    Url::parse(&format!("https://{}.{}/", reference, KEY_VAULT_DOMAIN))
        .map_err(|e| invalid(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_expands_to_azure_domain() {
        let url = vault_endpoint("my-vault").unwrap();
        assert_eq!(url.as_str(), "https://my-vault.vault.azure.net/");
    }

    #[test]
    fn test_full_uri_used_verbatim() {
        let url = vault_endpoint("https://custom.vault.example/").unwrap();
        assert_eq!(url.as_str(), "https://custom.vault.example/");
    }

    #[test]
    fn test_plain_http_rejected() {
        let err = vault_endpoint("http://insecure.example/").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVaultUri { .. }));
    }

    #[test]
    fn test_bad_vault_name_rejected() {
        assert!(vault_endpoint("my vault").is_err());
        assert!(vault_endpoint("").is_err());
    }

    #[test]
    fn test_secret_url() {
        let secret = VaultSecret::new(
            vault_endpoint("my-vault").unwrap(),
            DEFAULT_SECRET_NAME,
            AzureCredential::Imds,
        );
        assert_eq!(
            secret.secret_url().unwrap().as_str(),
            "https://my-vault.vault.azure.net/secrets/do-auth-token?api-version=7.4"
        );
    }

    #[test]
    fn test_secret_url_without_trailing_slash() {
        let secret = VaultSecret::new(
            Url::parse("https://vault.example/tenant").unwrap(),
            "token",
            AzureCredential::Imds,
        );
        assert_eq!(
            secret.secret_url().unwrap().as_str(),
            "https://vault.example/tenant/secrets/token?api-version=7.4"
        );
    }

    #[test]
    fn test_secret_name_from_env() {
        let env = ProcessEnv::from_vars([("DNS_AUTH_TOKEN_SECRET", "custom-secret")]).unwrap();
        let secret = VaultSecret::from_env("my-vault", &env).unwrap();
        assert_eq!(secret.secret_name(), "custom-secret");

        let env = ProcessEnv::from_vars([("DNS_AUTH_TOKEN_SECRET", " ")]).unwrap();
        let secret = VaultSecret::from_env("my-vault", &env).unwrap();
        assert_eq!(secret.secret_name(), DEFAULT_SECRET_NAME);
    }

    #[test]
    fn test_credential_discovery_order() {
        let env = ProcessEnv::from_vars([
            ("AZURE_TENANT_ID", "tenant"),
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_CLIENT_SECRET", "secret"),
            ("IDENTITY_ENDPOINT", "http://localhost:42356/msi/token"),
        ])
        .unwrap();
        let credential = AzureCredential::from_env(&env).unwrap();
        assert!(matches!(credential, AzureCredential::ClientSecret { .. }));

        let env = ProcessEnv::from_vars([
            ("AZURE_TENANT_ID", "tenant"),
            ("IDENTITY_ENDPOINT", "http://localhost:42356/msi/token"),
            ("IDENTITY_HEADER", "header"),
        ])
        .unwrap();
        let credential = AzureCredential::from_env(&env).unwrap();
        let AzureCredential::AppService { header, .. } = credential else {
            panic!("expected App Service credential");
        };
        assert_eq!(header.as_deref(), Some("header"));

        let credential = AzureCredential::from_env(&ProcessEnv::default()).unwrap();
        assert!(matches!(credential, AzureCredential::Imds));
    }

    #[test]
    fn test_authority_host_gets_trailing_slash() {
        let url = parse_authority_host("https://login.example.com").unwrap();
        assert_eq!(url.as_str(), "https://login.example.com/");
    }

    #[test]
    fn test_debug_hides_client_secret() {
        let env = ProcessEnv::from_vars([
            ("AZURE_TENANT_ID", "tenant"),
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_CLIENT_SECRET", "hunter2"),
        ])
        .unwrap();
        let credential = AzureCredential::from_env(&env).unwrap();
        assert!(!format!("{:?}", credential).contains("hunter2"));
    }
}
