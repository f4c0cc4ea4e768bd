//! Account record and certificate output storage
//!
//! # Layout
//!
//! ```text
//! ./account.key              # account key (written by certbeam-config)
//! ./account.key.acme.json    # ACME account bound to that key
//! <output>/
//! ├── example.com.crt        # full chain
//! ├── example.com.key        # certificate private key
//! └── example.com.issuer.crt # chain minus leaf
//! ```
//!
//! Every file written here is owner-only (0600 on Unix).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::bundle::CertificateBundle;
use super::error::StorageError;

const ACCOUNT_RECORD_SUFFIX: &str = ".acme.json";

/// ACME account registration bound to an account key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAccount {
    /// Fingerprint of the account key the registration belongs to
    pub key_fingerprint: String,
    /// CA directory the account was registered with
    pub directory: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    /// `instant_acme::AccountCredentials`, kept opaque
    pub credentials: serde_json::Value,
}

impl StoredAccount {
    /// Whether this record was made for the given key and CA
    pub fn matches(&self, key_fingerprint: &str, directory: &str) -> bool {
        self.key_fingerprint == key_fingerprint && self.directory == directory
    }
}

/// Account record stored next to the account key file
#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    /// Store for the record belonging to `key_path`, i.e. `<key_path>.acme.json`
    pub fn for_key(key_path: &Path) -> Self {
        let mut path = key_path.as_os_str().to_os_string();
        path.push(ACCOUNT_RECORD_SUFFIX);
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored account, `None` when no record exists yet
    pub fn load(&self) -> Result<Option<StoredAccount>, StorageError> {
        if !self.path.exists() {
            trace!(path = %self.path.display(), "No stored ACME account found");
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        let account: StoredAccount = serde_json::from_str(&content)?;

        debug!(
            path = %self.path.display(),
            contact = ?account.contact_email,
            directory = %account.directory,
            "Loaded ACME account record"
        );
        Ok(Some(account))
    }

    /// Credentials of the stored account when it belongs to this key and CA
    ///
    /// `None` means a new account has to be registered.
    pub fn credentials_for(
        &self,
        key_fingerprint: &str,
        directory: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let Some(stored) = self.load()? else {
            return Ok(None);
        };

        if !stored.matches(key_fingerprint, directory) {
            info!(
                path = %self.path.display(),
                "Stored account belongs to another key or CA, registering a new one"
            );
            return Ok(None);
        }

        Ok(Some(stored.credentials))
    }

    /// Replace the stored account
    pub fn save(&self, account: &StoredAccount) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(account)?;
        write_private(&self.path, content.as_bytes())?;

        info!(
            path = %self.path.display(),
            contact = ?account.contact_email,
            "Saved ACME account record"
        );
        Ok(())
    }
}

/// Writes certificate bundles into the output directory
#[derive(Debug)]
pub struct OutputWriter {
    directory: PathBuf,
}

impl OutputWriter {
    pub fn new(directory: &Path) -> Self {
        Self {
            directory: directory.to_path_buf(),
        }
    }

    /// Write `<alias>.crt`, `<alias>.key` and `<alias>.issuer.crt`
    ///
    /// Returns the written paths in that order.
    pub fn write(
        &self,
        alias: &str,
        bundle: &CertificateBundle,
    ) -> Result<[PathBuf; 3], StorageError> {
        fs::create_dir_all(&self.directory).map_err(|e| StorageError::io(&self.directory, e))?;

        let cert_path = self.directory.join(format!("{}.crt", alias));
        let key_path = self.directory.join(format!("{}.key", alias));
        let issuer_path = self.directory.join(format!("{}.issuer.crt", alias));

        write_private(&cert_path, bundle.certificate.as_bytes())?;
        write_private(&key_path, bundle.private_key.as_bytes())?;
        write_private(&issuer_path, bundle.issuer_certificate.as_bytes())?;

        info!(
            domain = %bundle.domain,
            directory = %self.directory.display(),
            alias = %alias,
            "Saved certificate files"
        );

        Ok([cert_path, key_path, issuer_path])
    }
}

/// Write a file readable only by its owner, replacing any previous content
fn write_private(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| StorageError::io(path, e))?;

    // The mode above only applies to newly created files
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| StorageError::io(path, e))?;
    }

    file.write_all(contents)
        .map_err(|e| StorageError::io(path, e))?;
    Ok(())
}
