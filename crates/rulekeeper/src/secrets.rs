//! Encrypted storage for the LLM API key.
//!
//! The key is sealed with ChaCha20-Poly1305. The encryption key is derived
//! with BLAKE3 from the host name, the user name, the home directory and a
//! random per-file salt, so a credentials file copied to another machine or
//! account does not decrypt.

use std::path::{Path, PathBuf};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::workspace::{read_file, write_file};

const KEY_CONTEXT: &str = "rulekeeper 2026-01 api key encryption";
const FORMAT_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Inputs to key derivation that identify the current user on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentity {
    /// Host name.
    pub hostname: String,
    /// Login name.
    pub username: String,
    /// Home directory.
    pub home: PathBuf,
}

impl MachineIdentity {
    /// Identity of the current process owner.
    #[must_use]
    pub fn current() -> Self {
        let hostname = std::fs::read_to_string("/etc/hostname")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .or_else(|| std::env::var("COMPUTERNAME").ok())
            .unwrap_or_else(|| "localhost".to_string());
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "user".to_string());
        let home = dirs::home_dir().unwrap_or_default();
        Self {
            hostname,
            username,
            home,
        }
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; 32] {
        let home = self.home.to_string_lossy();
        let mut material = Vec::new();
        for part in [
            self.hostname.as_bytes(),
            self.username.as_bytes(),
            home.as_bytes(),
            salt,
        ] {
            // Length-prefixed so ("ab", "c") and ("a", "bc") differ
            material.extend_from_slice(&(part.len() as u64).to_le_bytes());
            material.extend_from_slice(part);
        }
        blake3::derive_key(KEY_CONTEXT, &material)
    }
}

/// On-disk format of `credentials.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SealedKey {
    version: u32,
    salt: String,
    nonce: String,
    ciphertext: String,
    updated_at: DateTime<Utc>,
}

/// What the UI may know about the stored key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    /// Whether a key is stored.
    pub configured: bool,
    /// Masked rendering of the key, e.g. `sk-…abcd`.
    pub masked: Option<String>,
    /// When the key was last stored.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Encrypted single-secret store.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    identity: MachineIdentity,
}

impl CredentialStore {
    /// Store at `path` keyed to the current user and machine.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_identity(path, MachineIdentity::current())
    }

    /// Store at `path` keyed to an explicit identity.
    #[must_use]
    pub fn with_identity(path: impl Into<PathBuf>, identity: MachineIdentity) -> Self {
        Self {
            path: path.into(),
            identity,
        }
    }

    /// Path of the credentials file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encrypt and persist `api_key`, replacing any stored key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty, encryption fails or the file
    /// cannot be written.
    pub fn store(&self, api_key: &str) -> Result<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(Error::invalid_input("API key cannot be empty"));
        }

        let salt: [u8; SALT_LEN] = rand::random();
        let nonce: [u8; NONCE_LEN] = rand::random();
        let key = self.identity.derive_key(&salt);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), api_key.as_bytes())
            .map_err(|_| Error::crypto("encryption failed"))?;

        let sealed = SealedKey {
            version: FORMAT_VERSION,
            salt: hex::encode(salt),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
            updated_at: Utc::now(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        write_file(&self.path, &serde_json::to_string_pretty(&sealed)?)?;
        restrict_permissions(&self.path);
        info!("Stored API key in {}", self.path.display());
        Ok(())
    }

    /// Decrypt the stored key, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or was sealed for another
    /// user or machine.
    pub fn load(&self) -> Result<Option<String>> {
        let Some(sealed) = self.read_sealed()? else {
            return Ok(None);
        };

        if sealed.version != FORMAT_VERSION {
            return Err(Error::crypto(format!(
                "unsupported credentials format version {}",
                sealed.version
            )));
        }

        let salt = decode_hex("salt", &sealed.salt)?;
        let nonce = decode_hex("nonce", &sealed.nonce)?;
        let ciphertext = decode_hex("ciphertext", &sealed.ciphertext)?;
        if nonce.len() != NONCE_LEN {
            return Err(Error::crypto("nonce has the wrong length"));
        }

        let key = self.identity.derive_key(&salt);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| {
                warn!("Stored API key does not decrypt for this user and machine");
                Error::crypto("stored API key was encrypted for a different user or machine")
            })?;

        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|_| Error::crypto("stored API key is not valid UTF-8"))
    }

    /// Remove the stored key. Returns whether a key was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path).map_err(|source| Error::file_access(&self.path, source))?;
        info!("Removed stored API key");
        Ok(true)
    }

    /// Whether a key is stored, in masked form.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored key cannot be decrypted.
    pub fn status(&self) -> Result<KeyStatus> {
        let updated_at = self.read_sealed()?.map(|s| s.updated_at);
        let masked = self.load()?.map(|k| mask(&k));
        Ok(KeyStatus {
            configured: masked.is_some(),
            masked,
            updated_at,
        })
    }

    /// The key to use for LLM calls: the stored key, else the value of
    /// `env_var`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingApiKey`] when neither source has a key, or a
    /// decryption error for a damaged store.
    pub fn resolve(&self, env_var: &str) -> Result<String> {
        if let Some(key) = self.load()? {
            return Ok(key);
        }
        match std::env::var(env_var) {
            Ok(key) if !key.trim().is_empty() => {
                debug!(env_var, "Using API key from environment");
                Ok(key.trim().to_string())
            }
            _ => Err(Error::MissingApiKey {
                env_var: env_var.to_string(),
            }),
        }
    }

    fn read_sealed(&self) -> Result<Option<SealedKey>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = read_file(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

/// Mask a key for display, keeping the first 3 and last 4 characters.
#[must_use]
pub fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(8);
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|_| Error::crypto(format!("credentials {field} is not hex")))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!(error = %e, "Could not restrict permissions on {}", path.display());
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
