//! # Identity Store
//!
//! Directory of identity containers with a read-mostly in-memory cache.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         IDENTITY STORE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  load("carlos")                                                         │
//! │     │                                                                   │
//! │     ├── cache hit ────────────────────────────────► Arc<Identity>       │
//! │     │                                                                   │
//! │     └── miss ─► read carlos.identity ─► decrypt ─► cache ─► Arc<...>   │
//! │                      │                                                  │
//! │                      └── no file ─► IdentityNotFound (recoverable)      │
//! │                                                                         │
//! │  generate("carlos", ...)                                                │
//! │     └── keygen ─► self-sign ─► encrypt ─► write tmp ─► rename ─► cache │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every call here does file I/O or RSA key generation, so async callers
//! should go through `spawn_blocking` (the sealing service does).

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::container::{open_identity, seal_identity, CONTAINER_EXTENSION};
use crate::config::SealConfig;
use crate::error::{Error, Result};
use crate::identity::{validate_handle, Identity};

/// File-backed identity store
pub struct IdentityStore {
    dir: PathBuf,
    config: SealConfig,
    cache: RwLock<HashMap<String, Arc<Identity>>>,
    // Serializes first-use provisioning so a handle gets one key pair
    provisioning: Mutex<()>,
}

impl IdentityStore {
    /// Open (and create if needed) the identity directory from `config`
    pub fn open(config: SealConfig) -> Result<Self> {
        let dir = config.identity_dir.clone();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::StorageWriteError(format!(
                "Failed to create identity directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        tracing::debug!(dir = %dir.display(), "Opened identity store");

        Ok(Self {
            dir,
            config,
            cache: RwLock::new(HashMap::new()),
            provisioning: Mutex::new(()),
        })
    }

    /// Directory holding the containers
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Container path for a handle
    pub fn path_for(&self, handle: &str) -> Result<PathBuf> {
        validate_handle(handle)?;
        Ok(self.dir.join(format!("{}.{}", handle, CONTAINER_EXTENSION)))
    }

    /// Whether an identity exists for the handle
    ///
    /// Invalid handles never exist.
    pub fn exists(&self, handle: &str) -> bool {
        if self.cache.read().contains_key(handle) {
            return true;
        }
        self.path_for(handle).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Load an identity
    ///
    /// ## Errors
    ///
    /// - `IdentityNotFound` if no container exists for the handle
    /// - `StorageReadError` if the file cannot be read
    /// - `StorageCorrupted` on a wrong passphrase, tampering or a
    ///   certificate that does not match the private key
    pub fn load(&self, handle: &str) -> Result<Arc<Identity>> {
        if let Some(identity) = self.cache.read().get(handle) {
            return Ok(Arc::clone(identity));
        }

        let path = self.path_for(handle)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::IdentityNotFound(handle.to_string()));
            }
            Err(e) => {
                return Err(Error::StorageReadError(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let identity = Arc::new(open_identity(&bytes, &self.config.passphrase, handle)?);

        tracing::info!(handle, cn = identity.common_name(), "Loaded identity");

        self.cache
            .write()
            .insert(handle.to_string(), Arc::clone(&identity));
        Ok(identity)
    }

    /// Generate and persist a new identity, replacing any existing one
    pub fn generate(
        &self,
        handle: &str,
        common_name: &str,
        email: Option<&str>,
    ) -> Result<Arc<Identity>> {
        let path = self.path_for(handle)?;
        if path.exists() {
            tracing::warn!(handle, "Overwriting existing identity");
        }

        let identity = Identity::generate(handle, common_name, email, &self.config)?;
        let bytes = seal_identity(&identity, &self.config.passphrase)?;
        write_atomically(&path, &bytes)?;

        tracing::info!(handle, cn = common_name, "Created identity");

        let identity = Arc::new(identity);
        self.cache
            .write()
            .insert(handle.to_string(), Arc::clone(&identity));
        Ok(identity)
    }

    /// Load an identity, generating it first if it does not exist
    ///
    /// Concurrent callers for a missing handle agree on a single identity:
    /// the first one generates it, the rest load what it wrote.
    pub fn load_or_generate(
        &self,
        handle: &str,
        common_name: &str,
        email: Option<&str>,
    ) -> Result<Arc<Identity>> {
        match self.load(handle) {
            Err(Error::IdentityNotFound(_)) => {}
            other => return other,
        }

        let _guard = self.provisioning.lock();
        match self.load(handle) {
            Err(Error::IdentityNotFound(_)) => {
                tracing::info!(handle, "No identity for handle, provisioning one");
                self.generate(handle, common_name, email)
            }
            other => other,
        }
    }

    /// Delete an identity; returns whether a container was removed
    pub fn delete(&self, handle: &str) -> Result<bool> {
        let path = self.path_for(handle)?;
        self.cache.write().remove(handle);

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(handle, "Deleted identity");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::StorageWriteError(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Drop all cached identities; the next load reads from disk
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!("{}.tmp", CONTAINER_EXTENSION));
    fs::write(&tmp, bytes)
        .and_then(|_| fs::rename(&tmp, path))
        .map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::StorageWriteError(format!("Failed to write {}: {}", path.display(), e))
        })
}

// ============================================================================
// TESTS
// ============================================================================
