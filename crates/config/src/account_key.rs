//! ACME account key persistence
//!
//! The account key lives in a PEM file. Two encodings are understood:
//!
//! - `EC PRIVATE KEY` - SEC1 encoded P-256 key (what certbeam generates)
//! - `RSA PRIVATE KEY` - PKCS#1 encoded RSA key
//!
//! When the file does not exist a fresh P-256 key is generated and written with
//! owner-only permissions. Creation uses `create_new`, so two processes racing on
//! the same path end up sharing whichever key landed first.
//!
//! The key binds a stored ACME registration to this file through its
//! fingerprint. It never signs ACME requests, so a key taken over from another
//! client (lego's `account.key`, for instance) leads to a new registration.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use p256::pkcs8::{EncodePublicKey, LineEnding};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::{ConfigError, ConfigResult};

const EC_PRIVATE_KEY: &str = "EC PRIVATE KEY";
const RSA_PRIVATE_KEY: &str = "RSA PRIVATE KEY";

#[derive(Clone)]
enum KeyMaterial {
    Ec(p256::SecretKey),
    Rsa(Box<RsaPrivateKey>),
}

/// Persisted ACME account key pair
#[derive(Clone)]
pub struct AccountKey {
    path: PathBuf,
    material: KeyMaterial,
    fingerprint: String,
}

impl AccountKey {
    /// Load the key at `path`, generating and persisting a new one if absent
    pub fn load_or_create(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            return Self::load(path);
        }

        match Self::create(path) {
            Ok(key) => Ok(key),
            Err(ConfigError::Io { source, .. })
                if source.kind() == io::ErrorKind::AlreadyExists =>
            {
                debug!(path = %path.display(), "Account key appeared concurrently, loading it");
                Self::load(path)
            }
            Err(e) => Err(e),
        }
    }

    /// Load an existing PEM encoded key
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)
            .map(Zeroizing::new)
            .map_err(|e| ConfigError::io(path, e))?;
        let block = pem::parse(content.as_bytes()).map_err(|e| invalid(path, e))?;

        let material = match block.tag() {
            EC_PRIVATE_KEY => {
                let key = p256::SecretKey::from_sec1_der(block.contents())
                    .map_err(|e| invalid(path, e))?;
                KeyMaterial::Ec(key)
            }
            RSA_PRIVATE_KEY => {
                let key = RsaPrivateKey::from_pkcs1_der(block.contents())
                    .map_err(|e| invalid(path, e))?;
                KeyMaterial::Rsa(Box::new(key))
            }
            other => {
                return Err(ConfigError::UnknownKeyType {
                    path: path.to_path_buf(),
                    label: other.to_string(),
                });
            }
        };

        let key = Self::from_material(path, material)?;
        debug!(
            path = %path.display(),
            algorithm = key.algorithm(),
            fingerprint = %key.fingerprint,
            "Loaded account key"
        );
        Ok(key)
    }

    fn create(path: &Path) -> ConfigResult<Self> {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let key = Self::from_material(path, KeyMaterial::Ec(secret))?;
        let pem = key.to_pem()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path).map_err(|e| ConfigError::io(path, e))?;
        file.write_all(pem.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| ConfigError::io(path, e))?;

        info!(
            path = %path.display(),
            fingerprint = %key.fingerprint,
            "Generated new account key"
        );
        Ok(key)
    }

    fn from_material(path: &Path, material: KeyMaterial) -> ConfigResult<Self> {
        let spki = match &material {
            KeyMaterial::Ec(key) => key.public_key().to_public_key_der(),
            KeyMaterial::Rsa(key) => key.to_public_key().to_public_key_der(),
        }
        .map_err(|e| invalid(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            material,
            fingerprint: hex::encode(Sha256::digest(spki.as_bytes())),
        })
    }

    /// File the key was loaded from or written to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// JWS algorithm matching the key type
    pub fn algorithm(&self) -> &'static str {
        match self.material {
            KeyMaterial::Ec(_) => "ES256",
            KeyMaterial::Rsa(_) => "RS256",
        }
    }

    /// Lowercase hex SHA-256 of the public key's SubjectPublicKeyInfo
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// PEM encoding in the same format the key is persisted in
    pub fn to_pem(&self) -> ConfigResult<Zeroizing<String>> {
        match &self.material {
            KeyMaterial::Ec(key) => key
                .to_sec1_pem(LineEnding::LF)
                .map_err(|e| invalid(&self.path, e)),
            KeyMaterial::Rsa(key) => key
                .to_pkcs1_pem(LineEnding::LF)
                .map_err(|e| invalid(&self.path, e)),
        }
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("path", &self.path)
            .field("algorithm", &self.algorithm())
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

fn invalid(path: &Path, err: impl fmt::Display) -> ConfigError {
    ConfigError::InvalidAccountKey {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
