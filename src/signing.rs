//! Commit signing.
//!
//! The commit layer hands a [`Signer`] the raw 32-byte canonical hash;
//! key material and algorithm live out here. The bundled implementation
//! is Ed25519 with the key stored as a 32-byte seed file (a 64-byte
//! keypair file is also accepted) and the public key beside it in
//! `<path>.pub`.

use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SigningError {
    #[error("invalid signing key {path}: {reason}")]
    InvalidKey { path: PathBuf, reason: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Detached signing over opaque bytes.
pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError>;
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}

#[derive(Debug)]
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a fresh keypair, writing the seed to `path` and the
    /// public key to `<path>.pub`.
    pub fn generate(path: &Path) -> Result<Self, SigningError> {
        let key = SigningKey::generate(&mut OsRng);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| SigningError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, key.to_bytes()).map_err(|source| SigningError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let pub_path = public_key_path(path);
        fs::write(&pub_path, key.verifying_key().to_bytes()).map_err(|source| {
            SigningError::Io {
                path: pub_path,
                source,
            }
        })?;
        Ok(Self { key })
    }

    /// Load a key written by [`Ed25519Signer::generate`] or any 32-byte
    /// seed / 64-byte keypair file.
    pub fn load(path: &Path) -> Result<Self, SigningError> {
        let bytes = fs::read(path).map_err(|source| SigningError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let key = match bytes.len() {
            32 => {
                let seed: [u8; 32] = bytes.try_into().expect("length checked");
                SigningKey::from_bytes(&seed)
            }
            64 => {
                let pair: [u8; 64] = bytes.try_into().expect("length checked");
                SigningKey::from_keypair_bytes(&pair).map_err(|e| SigningError::InvalidKey {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            }
            n => {
                return Err(SigningError::InvalidKey {
                    path: path.to_path_buf(),
                    reason: format!("expected 32-byte seed or 64-byte keypair, got {n} bytes"),
                })
            }
        };
        Ok(Self { key })
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        self.key.verifying_key().verify(message, &sig).is_ok()
    }
}

fn public_key_path(key_path: &Path) -> PathBuf {
    let mut name = key_path.file_name().unwrap_or_default().to_os_string();
    name.push(".pub");
    key_path.with_file_name(name)
}
