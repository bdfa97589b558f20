use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};

/// Minimal key/value port holding whole serialized blobs.
pub trait BlobStore {
    /// # Errors
    /// Returns an error when the backend cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    /// Returns an error when the backend cannot be written.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Removing an absent key succeeds.
    ///
    /// # Errors
    /// Returns an error when the backend cannot be written.
    fn remove(&self, key: &str) -> Result<()>;
}

impl<T: BlobStore + ?Sized> BlobStore for &T {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

impl<T: BlobStore + ?Sized> BlobStore for Box<T> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// In-process blob map. Share it through an `Arc` to model several
/// execution contexts writing the same persisted state.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, String>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_blobs<R>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> R) -> Result<R> {
        let mut guard = self.blobs.lock().map_err(|_| anyhow!("memory blob store lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        self.with_blobs(|blobs| blobs.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.with_blobs(|blobs| {
            blobs.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_blobs(|blobs| {
            blobs.remove(key);
        })
    }
}

/// One `<key>.json` file per blob inside a directory.
#[derive(Debug, Clone)]
pub struct JsonDirBlobStore {
    root: PathBuf,
}

impl JsonDirBlobStore {
    /// Open (and create if needed) a blob directory.
    ///
    /// # Errors
    /// Returns an error when the directory cannot be created.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("failed to create blob directory {}", root.display()))?;
        Ok(Self { root: root.to_path_buf() })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || !key.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(anyhow!("invalid blob key {key:?}; keys MUST match [A-Za-z0-9_-]+"));
    }
    Ok(())
}

impl BlobStore for JsonDirBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.blob_path(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read blob file {}", path.display()))
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.blob_path(key)?;
        let staging = self.root.join(format!("{key}.json.tmp"));
        fs::write(&staging, value)
            .with_context(|| format!("failed to write blob staging file {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("failed to move blob into place at {}", path.display()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.blob_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove blob file {}", path.display()))
            }
        }
    }
}
