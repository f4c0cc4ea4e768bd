//! Configuration assembly
//!
//! [`build_config`] turns a [`ProcessEnv`] snapshot into a validated, immutable
//! [`UserConfig`]. Steps run in a fixed order and the first failure aborts:
//!
//! 1. certificate key type
//! 2. terms of service agreement
//! 3. domain list and output alias
//! 4. account email
//! 5. account key (loaded or generated)
//! 6. CA directory
//! 7. DNS auth token
//! 8. DNS propagation settings and output directory

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use idna::AsciiDenyList;
use tracing::{debug, info};

use crate::account_key::AccountKey;
use crate::env::{
    parse_bool, split_list, ProcessEnv, ACCOUNT_EMAIL, ACCOUNT_KEY_FILE, CA_DIR, DISABLE_CP,
    DNS_RESOLVERS, DNS_TIMEOUT, DOMAINS, FILENAME, LE_CRT_KEY_TYPE, LE_TOS_AGREED,
    OUTPUT_DIRECTORY,
};
use crate::error::{ConfigError, ConfigResult};
use crate::secrets::{CredentialResolver, TokenSource};

/// Let's Encrypt production directory
pub const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory
pub const LETSENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Local Pebble/Boulder test directory
pub const LOCAL_TEST_DIRECTORY: &str = "http://localhost:4000/directory";

pub const DEFAULT_ACCOUNT_KEY_FILE: &str = "./account.key";

/// RSA key size for the issued certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertificateKeyType {
    #[default]
    Rsa2048,
    Rsa4096,
    Rsa8192,
}

impl CertificateKeyType {
    pub fn bits(self) -> usize {
        match self {
            CertificateKeyType::Rsa2048 => 2048,
            CertificateKeyType::Rsa4096 => 4096,
            CertificateKeyType::Rsa8192 => 8192,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CertificateKeyType::Rsa2048 => "RSA2048",
            CertificateKeyType::Rsa4096 => "RSA4096",
            CertificateKeyType::Rsa8192 => "RSA8192",
        }
    }
}

impl FromStr for CertificateKeyType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSA2048" => Ok(CertificateKeyType::Rsa2048),
            "RSA4096" => Ok(CertificateKeyType::Rsa4096),
            "RSA8192" => Ok(CertificateKeyType::Rsa8192),
            other => Err(ConfigError::InvalidKeyType {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CertificateKeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a `CA_DIR` value to a directory URL
///
/// `PRODUCTION`, `STAGING` and `TEST` are matched case-insensitively, anything
/// else is taken to be a directory URL.
pub fn ca_directory_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("PRODUCTION") {
        LETSENCRYPT_PRODUCTION.to_string()
    } else if raw.eq_ignore_ascii_case("STAGING") {
        LETSENCRYPT_STAGING.to_string()
    } else if raw.eq_ignore_ascii_case("TEST") {
        LOCAL_TEST_DIRECTORY.to_string()
    } else {
        raw.to_string()
    }
}

/// Turn a domain into a filesystem safe ASCII name
///
/// Wildcards become underscores (`*.example.com` -> `_.example.com`) and
/// labels go through UTS #46 mapping, so the result is lowercase with
/// internationalized labels in punycode. Percent signs, spaces and other
/// characters forbidden in hosts are rejected rather than decoded.
pub fn sanitize_domain(domain: &str) -> ConfigResult<String> {
    let invalid = |message: &str| ConfigError::InvalidDomain {
        domain: domain.to_string(),
        message: message.to_string(),
    };

    let replaced = domain.replace('*', "_");
    if replaced.parse::<IpAddr>().is_ok() {
        return Err(invalid("IP addresses cannot be issued DNS-01 certificates"));
    }

    let ascii = idna::domain_to_ascii_cow(replaced.as_bytes(), AsciiDenyList::URL)
        .map_err(|_| invalid("not a valid domain name"))?;
    if ascii.is_empty() {
        return Err(invalid("empty domain name"));
    }

    Ok(ascii.into_owned())
}

/// Fully validated run configuration
#[derive(Clone)]
pub struct UserConfig {
    email: String,
    account_key: AccountKey,
    ca_directory: String,
    key_type: CertificateKeyType,
    tos_agreed: bool,
    domains: Vec<String>,
    alias: String,
    auth_token: String,
    token_source: TokenSource,
    dns_resolvers: Vec<String>,
    disable_cp: bool,
    dns_timeout: Duration,
    output_directory: PathBuf,
}

impl UserConfig {
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn account_key(&self) -> &AccountKey {
        &self.account_key
    }

    pub fn account_key_path(&self) -> &Path {
        self.account_key.path()
    }

    pub fn ca_directory(&self) -> &str {
        &self.ca_directory
    }

    pub fn key_type(&self) -> CertificateKeyType {
        self.key_type
    }

    pub fn tos_agreed(&self) -> bool {
        self.tos_agreed
    }

    /// Domains in the order they were configured
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Base name for the output files
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn token_source(&self) -> TokenSource {
        self.token_source
    }

    /// Resolver overrides for propagation checks, empty for system resolvers
    pub fn dns_resolvers(&self) -> &[String] {
        &self.dns_resolvers
    }

    pub fn disable_cp(&self) -> bool {
        self.disable_cp
    }

    /// Per-query DNS timeout, zero meaning the resolver default
    pub fn dns_timeout(&self) -> Duration {
        self.dns_timeout
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }
}

impl fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConfig")
            .field("email", &self.email)
            .field("account_key", &self.account_key)
            .field("ca_directory", &self.ca_directory)
            .field("key_type", &self.key_type)
            .field("tos_agreed", &self.tos_agreed)
            .field("domains", &self.domains)
            .field("alias", &self.alias)
            .field("auth_token", &"<redacted>")
            .field("token_source", &self.token_source)
            .field("dns_resolvers", &self.dns_resolvers)
            .field("disable_cp", &self.disable_cp)
            .field("dns_timeout", &self.dns_timeout)
            .field("output_directory", &self.output_directory)
            .finish()
    }
}

/// Assemble the run configuration from the environment snapshot
pub async fn build_config(
    env: &ProcessEnv,
    resolver: &CredentialResolver,
) -> ConfigResult<UserConfig> {
    let key_type: CertificateKeyType = env
        .value(LE_CRT_KEY_TYPE)
        .map(|raw| raw.trim().parse())
        .transpose()?
        .unwrap_or_default();

    let tos_agreed = bool_flag(env, LE_TOS_AGREED, true)?;
    if !tos_agreed {
        return Err(ConfigError::TermsNotAgreed);
    }

    let domains = env.value(DOMAINS).map(split_list).unwrap_or_default();
    let first_domain = domains.first().ok_or(ConfigError::MissingDomains)?;

    let alias = match env.value(FILENAME) {
        Some(name) => name.trim().to_string(),
        None => sanitize_domain(first_domain)?,
    };

    let email = env
        .value(ACCOUNT_EMAIL)
        .map(|e| e.trim().to_string())
        .ok_or(ConfigError::MissingEmail)?;

    let key_path = PathBuf::from(env.value_or(ACCOUNT_KEY_FILE, DEFAULT_ACCOUNT_KEY_FILE).trim());
    let account_key = AccountKey::load_or_create(&key_path)?;

    let ca_directory = env
        .value(CA_DIR)
        .map_or_else(|| LETSENCRYPT_STAGING.to_string(), ca_directory_url);

    let (auth_token, token_source) = resolver.resolve_with_source(env).await?;

    let dns_resolvers = env.value(DNS_RESOLVERS).map(split_list).unwrap_or_default();
    let disable_cp = bool_flag(env, DISABLE_CP, true)?;
    let dns_timeout = timeout_secs(env, DNS_TIMEOUT)?;
    let output_directory = PathBuf::from(env.value_or(OUTPUT_DIRECTORY, ".").trim());

    let config = UserConfig {
        email,
        account_key,
        ca_directory,
        key_type,
        tos_agreed,
        domains,
        alias,
        auth_token,
        token_source,
        dns_resolvers,
        disable_cp,
        dns_timeout,
        output_directory,
    };

    info!(
        domains = ?config.domains,
        alias = %config.alias,
        ca = %config.ca_directory,
        key_type = %config.key_type,
        token_source = ?config.token_source,
        "Configuration assembled"
    );
    debug!(config = ?config, "Full configuration");

    Ok(config)
}

fn bool_flag(env: &ProcessEnv, key: &'static str, default: bool) -> ConfigResult<bool> {
    match env.value(key) {
        None => Ok(default),
        Some(raw) => parse_bool(raw).ok_or_else(|| ConfigError::InvalidBoolean {
            key,
            value: raw.to_string(),
        }),
    }
}

fn timeout_secs(env: &ProcessEnv, key: &'static str) -> ConfigResult<Duration> {
    let Some(raw) = env.value(key) else {
        return Ok(Duration::ZERO);
    };

    let invalid = || ConfigError::InvalidNumber {
        key,
        value: raw.to_string(),
    };

    let secs: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if secs < 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}
