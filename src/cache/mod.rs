//! Build-output cache collaborator.
//!
//! After an install, the run lockfile is published to the build cache as a
//! content-addressed entry so that other machines can fetch the exact
//! resolution. Provider errors are translated once into the closed
//! [`CacheError`] set at this boundary.

pub mod credentials;

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::core::workspace::Workspace;
use crate::util::diagnostic::Diagnostic;
use crate::util::hash::sha256_bytes;

pub use credentials::CredentialCache;

/// File that, when present in a cache folder, holds the credential writers
/// must present.
pub const WRITE_TOKEN_FILE: &str = ".write-token";

/// Every way a cache operation can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("writing to the build cache is not permitted: {0}")]
    NotPermitted(String),

    #[error("build cache authentication failed: {0}")]
    AuthFailed(String),

    #[error("build cache permissions do not allow this operation: {0}")]
    PermissionMismatch(String),

    #[error("the cache entry already exists")]
    Conflict,

    #[error("build cache error: {0}")]
    Unknown(String),
}

impl CacheError {
    /// Translate an I/O failure.
    pub fn from_io(err: &std::io::Error, path: &Path) -> Self {
        match err.kind() {
            ErrorKind::AlreadyExists => CacheError::Conflict,
            ErrorKind::PermissionDenied => {
                CacheError::PermissionMismatch(format!("{}: {}", path.display(), err))
            }
            _ => CacheError::Unknown(format!("{}: {}", path.display(), err)),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::warning(self.to_string());
        match self {
            CacheError::NotPermitted(_) | CacheError::AuthFailed(_) => diag.with_suggestion(
                "Store a valid credential for the build cache's `credential-id`",
            ),
            CacheError::PermissionMismatch(_) => {
                diag.with_suggestion("Check the permissions of the build cache folder")
            }
            CacheError::Conflict | CacheError::Unknown(_) => diag,
        }
    }
}

/// A store of opaque build artifacts keyed by id.
pub trait BuildCacheProvider: Send + Sync {
    /// Fetch an entry. `Ok(None)` if it does not exist.
    fn try_get(&self, id: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store an entry. Existing entries are never overwritten.
    fn try_set(&self, id: &str, bytes: &[u8]) -> Result<bool, CacheError>;
}

/// Write an entry, treating a conflicting concurrent writer as success.
pub fn write_entry(
    provider: &dyn BuildCacheProvider,
    id: &str,
    bytes: &[u8],
) -> Result<bool, CacheError> {
    match provider.try_set(id, bytes) {
        Err(CacheError::Conflict) => {
            tracing::debug!("Cache entry {} already exists", id);
            Ok(true)
        }
        other => other,
    }
}

/// Cache id of a lockfile's content.
pub fn lockfile_cache_id(contents: &[u8]) -> String {
    format!("pnpm-lock-{}", sha256_bytes(contents))
}

/// A cache backed by a (possibly shared) folder.
#[derive(Debug, Clone)]
pub struct LocalFolderCache {
    folder: PathBuf,
    credential: Option<String>,
}

impl LocalFolderCache {
    pub fn new(folder: impl Into<PathBuf>, credential: Option<String>) -> Self {
        LocalFolderCache {
            folder: folder.into(),
            credential,
        }
    }

    /// The provider configured in `monorail.toml`, if any, with its write
    /// credential looked up in `credentials`.
    pub fn from_workspace(ws: &Workspace, credentials: &CredentialCache) -> Option<Self> {
        let config = &ws.config().build_cache;
        let folder = ws.root().join(config.folder.as_ref()?);
        let credential = config
            .credential_id
            .as_deref()
            .and_then(|id| credentials.get(id))
            .map(str::to_string);
        Some(LocalFolderCache::new(folder, credential))
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn entry_path(&self, id: &str) -> Result<PathBuf, CacheError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(CacheError::Unknown(format!("invalid cache id `{}`", id)));
        }
        Ok(self.folder.join(id))
    }

    fn authorize_write(&self) -> Result<(), CacheError> {
        let Some(credential) = self.credential.as_deref() else {
            return Err(CacheError::NotPermitted(
                "no credential is available for this cache".to_string(),
            ));
        };

        let token_path = self.folder.join(WRITE_TOKEN_FILE);
        match std::fs::read_to_string(&token_path) {
            Ok(expected) if expected.trim() == credential => Ok(()),
            Ok(_) => Err(CacheError::AuthFailed(
                "the stored credential does not match this cache".to_string(),
            )),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::from_io(&e, &token_path)),
        }
    }
}

impl BuildCacheProvider for LocalFolderCache {
    fn try_get(&self, id: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(id)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::from_io(&e, &path)),
        }
    }

    fn try_set(&self, id: &str, bytes: &[u8]) -> Result<bool, CacheError> {
        self.authorize_write()?;
        let path = self.entry_path(id)?;

        std::fs::create_dir_all(&self.folder).map_err(|e| CacheError::from_io(&e, &self.folder))?;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| CacheError::from_io(&e, &path))?;
        file.write_all(bytes)
            .map_err(|e| CacheError::from_io(&e, &path))?;

        Ok(true)
    }
}

/// Publish the run lockfile. Failures are reported as warnings and never
/// fail the install.
pub fn publish_lockfile(provider: &dyn BuildCacheProvider, lockfile_path: &Path) -> Result<()> {
    let contents = std::fs::read(lockfile_path)
        .with_context(|| format!("failed to read {}", lockfile_path.display()))?;
    let id = lockfile_cache_id(&contents);

    match write_entry(provider, &id, &contents) {
        Ok(_) => tracing::info!("Published lockfile to the build cache as {}", id),
        Err(e) => crate::util::diagnostic::emit(&e.to_diagnostic(), false),
    }
    Ok(())
}
