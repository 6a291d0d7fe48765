//! Request signing.
//!
//! Every socket open carries an `authorization` header produced by a
//! [`Signer`]. The client never inspects the header; it only forwards it.
//!
//! # Key Handling
//!
//! - Key files are read fresh for every signature
//! - Raw key bytes live in a `Zeroizing` buffer and are wiped on drop
//! - Signatures are never logged

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future::BoxFuture;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::AuthError;

/// File extension of key files inside the key directory.
pub const KEY_FILE_EXTENSION: &str = "key";

/// Produces the authorization header for a connection attempt.
pub trait Signer: Send + Sync {
    /// Sign for `key_name`, using key material found under `key_dir`.
    fn sign<'a>(&'a self, key_name: &'a str, key_dir: &'a Path)
        -> BoxFuture<'a, Result<String, AuthError>>;
}

/// Default signer backed by a key file on disk.
///
/// Reads `<key_dir>/<key_name>.key` and produces
/// `<key_name>:<unix seconds>:<hex sha256(key \n key_name \n seconds)>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyFileSigner;

impl KeyFileSigner {
    /// Create a new key-file signer.
    pub fn new() -> Self {
        Self
    }

    /// Path of the key file for `key_name`.
    pub fn key_path(key_name: &str, key_dir: &Path) -> PathBuf {
        key_dir.join(format!("{key_name}.{KEY_FILE_EXTENSION}"))
    }

    /// Compute the header for already loaded key material.
    pub fn header_for(key: &[u8], key_name: &str, timestamp: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(b"\n");
        hasher.update(key_name.as_bytes());
        hasher.update(b"\n");
        hasher.update(timestamp.to_string().as_bytes());
        let digest = hasher.finalize();
        format!("{}:{}:{}", key_name, timestamp, hex::encode(digest))
    }

    async fn sign_file(key_name: &str, key_dir: &Path) -> Result<String, AuthError> {
        if key_name.is_empty() {
            return Err(AuthError::MissingKeyName);
        }

        let path = Self::key_path(key_name, key_dir);
        let key = Zeroizing::new(
            tokio::fs::read(&path)
                .await
                .map_err(|source| AuthError::KeyUnreadable {
                    path: path.clone(),
                    source,
                })?,
        );

        let trimmed = trim_whitespace(&key);
        if trimmed.is_empty() {
            return Err(AuthError::EmptyKey(path));
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AuthError::provider(e.to_string()))?
            .as_secs();

        Ok(Self::header_for(trimmed, key_name, timestamp))
    }
}

fn trim_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

impl Signer for KeyFileSigner {
    fn sign<'a>(
        &'a self,
        key_name: &'a str,
        key_dir: &'a Path,
    ) -> BoxFuture<'a, Result<String, AuthError>> {
        Box::pin(Self::sign_file(key_name, key_dir))
    }
}
