//! Process environment snapshot
//!
//! The environment is read exactly once into a [`ProcessEnv`] and the snapshot is
//! threaded through credential resolution and configuration assembly. Nothing
//! downstream calls `std::env` directly.

use std::ffi::OsString;
use std::fmt;

use serde::Deserialize;

use crate::error::ConfigResult;

pub const DOMAINS: &str = "DOMAINS";
pub const ACCOUNT_EMAIL: &str = "ACCOUNT_EMAIL";
pub const ACCOUNT_KEY_FILE: &str = "ACCOUNT_KEY_FILE";
pub const LE_TOS_AGREED: &str = "LE_TOS_AGREED";
pub const CA_DIR: &str = "CA_DIR";
pub const LE_CRT_KEY_TYPE: &str = "LE_CRT_KEY_TYPE";
pub const DNS_AUTH_TOKEN: &str = "DNS_AUTH_TOKEN";
pub const DNS_AUTH_TOKEN_FILE: &str = "DNS_AUTH_TOKEN_FILE";
pub const DNS_AUTH_TOKEN_VAULT: &str = "DNS_AUTH_TOKEN_VAULT";
pub const DNS_AUTH_TOKEN_SECRET: &str = "DNS_AUTH_TOKEN_SECRET";
pub const DNS_RESOLVERS: &str = "DNS_RESOLVERS";
pub const DNS_TIMEOUT: &str = "DNS_TIMEOUT";
pub const DISABLE_CP: &str = "DISABLE_CP";
pub const FILENAME: &str = "FILENAME";
pub const OUTPUT_DIRECTORY: &str = "OUTPUT_DIRECTORY";

/// Immutable snapshot of every environment variable certbeam understands
///
/// Values are kept raw. `None` means unset; blank strings are preserved so
/// that callers can tell "unset" apart from "set but empty" where it matters.
#[derive(Clone, Default, Deserialize)]
pub struct ProcessEnv {
    domains: Option<String>,
    account_email: Option<String>,
    account_key_file: Option<String>,
    le_tos_agreed: Option<String>,
    ca_dir: Option<String>,
    le_crt_key_type: Option<String>,
    dns_auth_token: Option<String>,
    dns_auth_token_file: Option<String>,
    dns_auth_token_vault: Option<String>,
    dns_auth_token_secret: Option<String>,
    dns_resolvers: Option<String>,
    dns_timeout: Option<String>,
    disable_cp: Option<String>,
    filename: Option<String>,
    output_directory: Option<String>,

    // Ambient Azure credentials for the vault backend
    azure_tenant_id: Option<String>,
    azure_client_id: Option<String>,
    azure_client_secret: Option<String>,
    azure_authority_host: Option<String>,
    identity_endpoint: Option<String>,
    identity_header: Option<String>,
}

impl ProcessEnv {
    /// Snapshot the current process environment
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_os_vars(std::env::vars_os())
    }

    /// Build a snapshot from raw OS strings, skipping non UTF-8 pairs
    pub fn from_os_vars<I>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let vars = vars
            .into_iter()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        Ok(envy::from_iter::<_, Self>(vars)?)
    }

    /// Build a snapshot from explicit key/value pairs
    pub fn from_vars<I, K, V>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars.into_iter().map(|(k, v)| (k.into(), v.into()));
        Ok(envy::from_iter::<_, Self>(vars)?)
    }

    /// Raw value of a known key, blank values included
    pub fn raw(&self, key: &str) -> Option<&str> {
        let slot = match key {
            DOMAINS => &self.domains,
            ACCOUNT_EMAIL => &self.account_email,
            ACCOUNT_KEY_FILE => &self.account_key_file,
            LE_TOS_AGREED => &self.le_tos_agreed,
            CA_DIR => &self.ca_dir,
            LE_CRT_KEY_TYPE => &self.le_crt_key_type,
            DNS_AUTH_TOKEN => &self.dns_auth_token,
            DNS_AUTH_TOKEN_FILE => &self.dns_auth_token_file,
            DNS_AUTH_TOKEN_VAULT => &self.dns_auth_token_vault,
            DNS_AUTH_TOKEN_SECRET => &self.dns_auth_token_secret,
            DNS_RESOLVERS => &self.dns_resolvers,
            DNS_TIMEOUT => &self.dns_timeout,
            DISABLE_CP => &self.disable_cp,
            FILENAME => &self.filename,
            OUTPUT_DIRECTORY => &self.output_directory,
            "AZURE_TENANT_ID" => &self.azure_tenant_id,
            "AZURE_CLIENT_ID" => &self.azure_client_id,
            "AZURE_CLIENT_SECRET" => &self.azure_client_secret,
            "AZURE_AUTHORITY_HOST" => &self.azure_authority_host,
            "IDENTITY_ENDPOINT" => &self.identity_endpoint,
            "IDENTITY_HEADER" => &self.identity_header,
            _ => return None,
        };
        slot.as_deref()
    }

    /// Value of a known key, treating blank values as unset
    pub fn value(&self, key: &str) -> Option<&str> {
        self.raw(key).filter(|v| !v.trim().is_empty())
    }

    /// Value of a known key, or `fallback` when unset or blank
    pub fn value_or<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.value(key).unwrap_or(fallback)
    }
}

impl fmt::Debug for ProcessEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Token-bearing keys only report presence
        f.debug_struct("ProcessEnv")
            .field("domains", &self.domains)
            .field("account_email", &self.account_email)
            .field("account_key_file", &self.account_key_file)
            .field("ca_dir", &self.ca_dir)
            .field("dns_auth_token", &self.dns_auth_token.as_ref().map(|_| "<redacted>"))
            .field("dns_auth_token_file", &self.dns_auth_token_file)
            .field("dns_auth_token_vault", &self.dns_auth_token_vault)
            .field("dns_resolvers", &self.dns_resolvers)
            .field("azure_client_secret", &self.azure_client_secret.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// Parse a boolean flag value
///
/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
