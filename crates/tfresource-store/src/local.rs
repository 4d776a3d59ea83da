use crate::{StateStore, StoreError};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Filesystem-backed store matching Terraform's `local` backend.
///
/// Keys are paths relative to `root`; absolute keys are used as-is.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, rejecting empty keys and `..` components.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(key);
        if key.is_empty() || rel.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(StoreError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(rel))
    }
}

fn not_found(key: &str, e: std::io::Error) -> StoreError {
    if e.kind() == ErrorKind::NotFound {
        StoreError::NotFound(key.to_owned())
    } else {
        StoreError::Io(e)
    }
}

impl StateStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn object_exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn last_modified(&self, key: &str) -> Result<DateTime<Utc>, StoreError> {
        let path = self.path_for(key)?;
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| not_found(key, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        fs::read(&path).map_err(|e| not_found(key, e))
    }

    fn put_object(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::InvalidKey(key.to_owned()))?;
        fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!("wrote {} ({} bytes)", path.display(), data.len());
        Ok(())
    }
}
